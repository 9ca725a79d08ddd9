use core_types::CoreError;
use sqlx::mysql::MySqlDatabaseError;
use std::fmt;
use thiserror::Error;

/// MySQL server error numbers this crate reacts to.
pub(crate) mod codes {
    pub const ACCESS_DENIED: u16 = 1045;
    pub const BAD_DB: u16 = 1049;
    pub const PARSE_ERROR: u16 = 1064;
    pub const SYNTAX_ERROR: u16 = 1149;
    pub const BAD_FIELD: u16 = 1054;
    pub const NO_SUCH_TABLE: u16 = 1146;
    pub const SP_DOES_NOT_EXIST: u16 = 1305;
    pub const DUP_ENTRY: u16 = 1062;
    pub const DUP_ENTRY_WITH_KEY_NAME: u16 = 1586;
    pub const BAD_NULL: u16 = 1048;
    pub const NO_DEFAULT_FOR_FIELD: u16 = 1364;
    pub const ROW_IS_REFERENCED: u16 = 1451;
    pub const NO_REFERENCED_ROW: u16 = 1452;
    pub const ROW_IS_REFERENCED_LEGACY: u16 = 1217;
    pub const NO_REFERENCED_ROW_LEGACY: u16 = 1216;
    pub const CHECK_CONSTRAINT_VIOLATED: u16 = 3819;
    pub const LOCK_WAIT_TIMEOUT: u16 = 1205;
    pub const QUERY_TIMEOUT: u16 = 3024;
    pub const SERVER_GONE: u16 = 2006;
    pub const SERVER_LOST: u16 = 2013;
}

/// Returns the MySQL error number carried by a driver error, if any.
pub(crate) fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// Failure to establish the pool. Fatal at startup; never retried.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid connection settings: {0}")]
    InvalidConfig(String),

    #[error("The database server at {host}:{port} is unreachable")]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    #[error("The database rejected the credentials of user '{user}'")]
    AuthenticationRejected {
        user: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("The database '{name}' does not exist")]
    UnknownDatabase {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to connect to the database")]
    Other(#[source] sqlx::Error),
}

/// Which integrity rule a write violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    /// Carries the constraint name when the server reports it (e.g. `chk_account_balance`).
    Check(Option<String>),
    ForeignKey,
    NotNull,
}

/// Coarse classification of a failed statement, safe to show and to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    Constraint(ConstraintKind),
    Timeout,
    Connection,
    /// A placeholder and the supplied parameters do not line up. Raised before the
    /// statement reaches the server.
    Binding,
    /// The server answered but a column could not be converted.
    Decode,
    Unknown,
}

impl QueryErrorKind {
    /// Classifies a server error by its MySQL error number.
    pub fn from_mysql(number: u16, message: &str) -> Self {
        use codes::*;
        match number {
            PARSE_ERROR | SYNTAX_ERROR | BAD_FIELD | NO_SUCH_TABLE | SP_DOES_NOT_EXIST => {
                QueryErrorKind::Syntax
            }
            DUP_ENTRY | DUP_ENTRY_WITH_KEY_NAME => {
                QueryErrorKind::Constraint(ConstraintKind::Unique)
            }
            CHECK_CONSTRAINT_VIOLATED => QueryErrorKind::Constraint(ConstraintKind::Check(
                quoted_name(message),
            )),
            ROW_IS_REFERENCED | NO_REFERENCED_ROW | ROW_IS_REFERENCED_LEGACY
            | NO_REFERENCED_ROW_LEGACY => QueryErrorKind::Constraint(ConstraintKind::ForeignKey),
            BAD_NULL | NO_DEFAULT_FOR_FIELD => {
                QueryErrorKind::Constraint(ConstraintKind::NotNull)
            }
            LOCK_WAIT_TIMEOUT | QUERY_TIMEOUT => QueryErrorKind::Timeout,
            SERVER_GONE | SERVER_LOST => QueryErrorKind::Connection,
            _ => QueryErrorKind::Unknown,
        }
    }

    pub fn from_sqlx(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => match mysql_error_number(err) {
                Some(number) => Self::from_mysql(number, db.message()),
                None => QueryErrorKind::Unknown,
            },
            sqlx::Error::PoolTimedOut => QueryErrorKind::Timeout,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_) => QueryErrorKind::Connection,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. } => QueryErrorKind::Decode,
            _ => QueryErrorKind::Unknown,
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, QueryErrorKind::Constraint(_))
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::Syntax => f.write_str("syntax error"),
            QueryErrorKind::Constraint(ConstraintKind::Unique) => {
                f.write_str("unique constraint violation")
            }
            QueryErrorKind::Constraint(ConstraintKind::Check(Some(name))) => {
                write!(f, "check constraint violation ({name})")
            }
            QueryErrorKind::Constraint(ConstraintKind::Check(None)) => {
                f.write_str("check constraint violation")
            }
            QueryErrorKind::Constraint(ConstraintKind::ForeignKey) => {
                f.write_str("foreign key violation")
            }
            QueryErrorKind::Constraint(ConstraintKind::NotNull) => {
                f.write_str("missing required value")
            }
            QueryErrorKind::Timeout => f.write_str("timeout"),
            QueryErrorKind::Connection => f.write_str("connection failure"),
            QueryErrorKind::Binding => f.write_str("parameter binding error"),
            QueryErrorKind::Decode => f.write_str("result decoding error"),
            QueryErrorKind::Unknown => f.write_str("database error"),
        }
    }
}

/// Extracts the first single-quoted name from a server message.
fn quoted_name(message: &str) -> Option<String> {
    let start = message.find('\'')? + 1;
    let len = message[start..].find('\'')?;
    let name = &message[start..start + len];
    (!name.is_empty()).then(|| name.to_string())
}

/// A failed statement.
///
/// `Display` deliberately carries only the coarse kind: raw server text can leak schema
/// details and stays in `source()` for diagnostic logging.
#[derive(Error, Debug)]
#[error("{kind} while executing statement")]
pub struct QueryError {
    kind: QueryErrorKind,
    template: String,
    detail: Option<String>,
    #[source]
    source: Option<sqlx::Error>,
}

impl QueryError {
    pub fn from_sqlx(template: &str, source: sqlx::Error) -> Self {
        Self {
            kind: QueryErrorKind::from_sqlx(&source),
            template: template.to_string(),
            detail: None,
            source: Some(source),
        }
    }

    pub fn binding(template: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Binding,
            template: template.to_string(),
            detail: Some(detail.into()),
            source: None,
        }
    }

    /// A statement issued on a transaction that has already ended.
    pub fn closed(template: &str) -> Self {
        Self {
            kind: QueryErrorKind::Connection,
            template: template.to_string(),
            detail: Some("transaction already finished".to_string()),
            source: None,
        }
    }

    pub fn kind(&self) -> &QueryErrorKind {
        &self.kind
    }

    /// The statement template (never the bound values).
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Diagnostic text: the client-side detail or the server's message. Not for end users.
    pub fn diagnostic(&self) -> String {
        match (&self.detail, &self.source) {
            (Some(detail), _) => detail.clone(),
            (None, Some(source)) => source.to_string(),
            (None, None) => self.kind.to_string(),
        }
    }
}

/// Failure to append to the query log. Only ever observed inside the logger.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to write the query log entry: {0}")]
    Write(#[from] sqlx::Error),

    #[error("Query log sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown report: {0}")]
    UnknownReport(String),

    /// A business rule refused the operation; the message is safe to show.
    #[error("{0}")]
    Rejected(String),

    #[error("The requested {0} was not found in the database.")]
    NotFound(&'static str),

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error("Unexpected result shape: {0}")]
    ResultShape(#[from] CoreError),
}

impl DbError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        DbError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// The query error kind, when this error came from a statement.
    pub fn query_kind(&self) -> Option<&QueryErrorKind> {
        match self {
            DbError::Query(err) => Some(err.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_are_distinguishable() {
        assert_eq!(
            QueryErrorKind::from_mysql(1062, "Duplicate entry 'alice' for key 'Users.username'"),
            QueryErrorKind::Constraint(ConstraintKind::Unique)
        );
        assert_eq!(
            QueryErrorKind::from_mysql(3819, "Check constraint 'chk_account_balance' is violated."),
            QueryErrorKind::Constraint(ConstraintKind::Check(Some(
                "chk_account_balance".to_string()
            )))
        );
        assert_eq!(
            QueryErrorKind::from_mysql(1452, "Cannot add or update a child row"),
            QueryErrorKind::Constraint(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            QueryErrorKind::from_mysql(1048, "Column 'email' cannot be null"),
            QueryErrorKind::Constraint(ConstraintKind::NotNull)
        );
    }

    #[test]
    fn other_server_errors_map_to_coarse_kinds() {
        assert_eq!(QueryErrorKind::from_mysql(1064, "You have an error"), QueryErrorKind::Syntax);
        assert_eq!(QueryErrorKind::from_mysql(1146, "Table doesn't exist"), QueryErrorKind::Syntax);
        assert_eq!(QueryErrorKind::from_mysql(1205, "Lock wait timeout"), QueryErrorKind::Timeout);
        assert_eq!(QueryErrorKind::from_mysql(2013, "Lost connection"), QueryErrorKind::Connection);
        assert_eq!(QueryErrorKind::from_mysql(9999, "???"), QueryErrorKind::Unknown);
    }

    #[test]
    fn check_without_quoted_name_keeps_kind() {
        assert_eq!(
            QueryErrorKind::from_mysql(3819, "Check constraint violated"),
            QueryErrorKind::Constraint(ConstraintKind::Check(None))
        );
    }

    #[test]
    fn driver_level_failures_are_classified() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(QueryErrorKind::from_sqlx(&io), QueryErrorKind::Connection);
        assert_eq!(QueryErrorKind::from_sqlx(&sqlx::Error::PoolTimedOut), QueryErrorKind::Timeout);
        assert_eq!(
            QueryErrorKind::from_sqlx(&sqlx::Error::ColumnNotFound("x".into())),
            QueryErrorKind::Decode
        );
    }

    #[test]
    fn display_hides_engine_text_but_diagnostic_keeps_it() {
        let source = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "secret table layout",
        ));
        let err = QueryError::from_sqlx("SELECT * FROM Users", source);
        assert_eq!(err.to_string(), "connection failure while executing statement");
        assert!(err.diagnostic().contains("secret table layout"));
        assert_eq!(err.template(), "SELECT * FROM Users");
    }
}
