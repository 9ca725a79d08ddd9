use crate::error::{codes, mysql_error_number, ConnectionError, DbError};
use configuration::DatabaseSettings;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::time::Duration;

/// Translates the settings into driver options. Fails on settings the driver would only
/// reject at connect time.
pub fn connect_options(settings: &DatabaseSettings) -> Result<MySqlConnectOptions, ConnectionError> {
    if settings.host.trim().is_empty() {
        return Err(ConnectionError::InvalidConfig("host must not be empty".to_string()));
    }
    if settings.name.trim().is_empty() {
        return Err(ConnectionError::InvalidConfig(
            "database name must not be empty".to_string(),
        ));
    }

    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.username)
        .database(&settings.name)
        .charset(&settings.charset);
    if !settings.password.is_empty() {
        options = options.password(&settings.password);
    }
    Ok(options)
}

fn pool_options(settings: &DatabaseSettings) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
}

/// Establishes the MySQL connection pool.
///
/// The first connection is opened eagerly, so an unreachable server, rejected credentials
/// or a missing schema are reported here rather than on the first request. There is no
/// retry: callers treat the error as fatal.
pub async fn connect(settings: &DatabaseSettings) -> Result<MySqlPool, ConnectionError> {
    let options = connect_options(settings)?;

    tracing::debug!(
        host = %settings.host,
        port = settings.port,
        database = %settings.name,
        max_connections = settings.max_connections,
        "Connecting to MySQL"
    );

    let pool = pool_options(settings)
        .connect_with(options)
        .await
        .map_err(|e| classify_connect_error(settings, e))?;

    tracing::info!(database = %settings.name, "Database connection pool established");
    Ok(pool)
}

/// Builds the pool without touching the network. Connections are opened on first use.
///
/// Used by tests and tooling that need a pool handle but no live server.
pub fn connect_lazy(settings: &DatabaseSettings) -> Result<MySqlPool, ConnectionError> {
    let options = connect_options(settings)?;
    Ok(pool_options(settings).connect_lazy_with(options))
}

pub(crate) fn classify_connect_error(settings: &DatabaseSettings, err: sqlx::Error) -> ConnectionError {
    match mysql_error_number(&err) {
        Some(codes::ACCESS_DENIED) => {
            return ConnectionError::AuthenticationRejected {
                user: settings.username.clone(),
                source: err,
            };
        }
        Some(codes::BAD_DB) => {
            return ConnectionError::UnknownDatabase {
                name: settings.name.clone(),
                source: err,
            };
        }
        _ => {}
    }

    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
            ConnectionError::Unreachable {
                host: settings.host.clone(),
                port: settings.port,
                source: err,
            }
        }
        sqlx::Error::Configuration(e) => ConnectionError::InvalidConfig(e.to_string()),
        other => ConnectionError::Other(other),
    }
}

/// Applies the bundled schema migrations.
pub async fn run_migrations(pool: &MySqlPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_host_is_rejected_before_connecting() {
        let settings = DatabaseSettings {
            host: "  ".to_string(),
            ..DatabaseSettings::default()
        };
        assert!(matches!(
            connect_options(&settings),
            Err(ConnectionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn io_failures_mean_unreachable() {
        let settings = DatabaseSettings::default();
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        match classify_connect_error(&settings, err) {
            ConnectionError::Unreachable { host, port, .. } => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 3306);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    // The schema enums and the CHECK constraints must admit the same literals.
    #[test]
    fn schema_enums_match_the_check_constraints() {
        use core_types::{CampaignStatus, DonationStatus, PaymentMethod, UserRole};

        let schema = include_str!("../migrations/20240101000001_create_schema.sql");
        let allowed = |constraint: &str| -> Vec<String> {
            let line = schema
                .lines()
                .find(|line| line.contains(constraint))
                .unwrap_or_else(|| panic!("{constraint} is missing"));
            let list = &line[line.find("IN (").unwrap() + 4..line.rfind(')').unwrap()];
            let list = list.trim_end_matches(')');
            list.split(',')
                .map(|v| v.trim().trim_matches('\'').to_string())
                .collect()
        };

        assert_eq!(
            allowed("chk_user_role"),
            UserRole::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(
            allowed("chk_campaign_status"),
            CampaignStatus::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(
            allowed("chk_donation_status"),
            DonationStatus::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(
            allowed("chk_payment_method"),
            PaymentMethod::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn lazy_pool_does_not_touch_the_network() {
        let settings = DatabaseSettings {
            host: "db.invalid".to_string(),
            ..DatabaseSettings::default()
        };
        let pool = connect_lazy(&settings).unwrap();
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn unreachable_server_fails_fast() {
        let settings = DatabaseSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            acquire_timeout_secs: 2,
            ..DatabaseSettings::default()
        };
        let err = connect(&settings).await.unwrap_err();
        assert!(
            matches!(err, ConnectionError::Unreachable { .. }),
            "unexpected error: {err:?}"
        );
    }
}
