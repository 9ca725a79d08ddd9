use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    Config, DatabaseSettings, LogFormat, LoggingSettings, QueryLogSettings, ServerSettings,
};
pub use telemetry::init_tracing;

/// Prefix of environment overrides, e.g. `CFT__DATABASE__PASSWORD=secret`.
pub const ENV_PREFIX: &str = "CFT";

/// Loads the application configuration from `config.toml` plus environment overrides.
///
/// The file is optional: every setting has a default matching a local development
/// MySQL install, so a bare checkout runs with only the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Same as [`load_config`] but with an explicit file path.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Parses configuration from TOML text without consulting the environment.
pub fn config_from_toml(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_local_defaults() {
        let config = config_from_toml("").unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.name, "CF_Tracker");
        assert_eq!(config.database.charset, "utf8mb4");
        assert_eq!(config.server.socket_addr().unwrap().port(), 3000);
        assert!(config.query_log.enabled);
        assert_eq!(config.logging.format, LogFormat::Full);
    }

    #[test]
    fn sections_override_defaults() {
        let config = config_from_toml(
            r#"
            [database]
            host = "db.internal"
            port = 3307
            password = "hunter2"

            [server]
            host = "127.0.0.1"
            port = 8080

            [logging]
            format = "compact"
            directory = "logs"

            [query_log]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 3307);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.server.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(!config.query_log.enabled);
    }

    #[test]
    fn password_never_appears_in_debug_output() {
        let config = config_from_toml("[database]\npassword = \"hunter2\"").unwrap();
        let printed = format!("{:?}", config.database);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = config_from_toml("[database]\nmax_connections = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = config_from_toml("[server]\nhost = \"not-an-ip\"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = config_from_toml("[database]\ncharset = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
