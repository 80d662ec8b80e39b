use std::fmt::Display;
use std::fmt::Formatter;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE-style diagnostic code attached to function registration
/// errors, stable across releases so callers can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlState {
    /// The function is declared to return a table but the body output
    /// shape does not convert to the declared record shape.
    InvalidFunctionDefinitionTable,
    /// The function is declared to return a scalar but the body output
    /// is not a single implicitly-convertible column.
    InvalidFunctionDefinitionScalar,
}

impl SqlState {
    pub fn code(&self) -> &'static str {
        match self {
            SqlState::InvalidFunctionDefinitionTable => "42P13-table",
            SqlState::InvalidFunctionDefinitionScalar => "42P13-scalar",
        }
    }
}

impl Display for SqlState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug)]
pub enum Error {
    /// Statement or expression does not parse or bind.
    Parse(String),
    /// Invalid data or argument value.
    Value(String),
    /// A statement kind, plan shape or feature the engine does not support.
    NotSupported(String),
    /// A function body parsed to a number of statements other than one.
    StatementCount { count: usize },
    /// Declared function return type is incompatible with the compiled
    /// body output shape.
    ReturnTypeMismatch { message: String, state: SqlState },
    /// Invariant violation, aka a bug.
    Internal(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Error {
        Error::Parse(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Error {
        Error::Value(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Error {
        Error::NotSupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Error {
        Error::Internal(msg.into())
    }

    pub fn statement_count(count: usize) -> Error {
        Error::StatementCount { count }
    }

    pub fn return_type_mismatch(msg: impl Into<String>, state: SqlState) -> Error {
        Error::ReturnTypeMismatch { message: msg.into(), state }
    }

    /// The stable diagnostic code carried by this error, if any.
    pub fn sql_state(&self) -> Option<SqlState> {
        match self {
            Error::ReturnTypeMismatch { state, .. } => Some(*state),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(s) | Error::Value(s) | Error::NotSupported(s) | Error::Internal(s) => {
                write!(f, "{}", s)
            }
            Error::StatementCount { count } => {
                write!(f, "Expected 1 statement in function, got {}", count)
            }
            Error::ReturnTypeMismatch { message, state } => {
                write!(f, "{} ({})", message, state)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Construct a [`Error::Parse`] with a formatted message.
#[macro_export]
macro_rules! parse_err {
    ($($arg:tt)*) => { $crate::error::Error::Parse(format!($($arg)*)) };
}

/// Construct a [`Error::Value`] with a formatted message.
#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => { $crate::error::Error::Value(format!($($arg)*)) };
}

/// Construct a [`Error::NotSupported`] with a formatted message.
#[macro_export]
macro_rules! unsupported_err {
    ($($arg:tt)*) => { $crate::error::Error::NotSupported(format!($($arg)*)) };
}

/// Construct a [`Error::Internal`] with a formatted message.
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => { $crate::error::Error::Internal(format!($($arg)*)) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_state_codes_are_distinct() {
        let table = SqlState::InvalidFunctionDefinitionTable;
        let scalar = SqlState::InvalidFunctionDefinitionScalar;
        assert_ne!(table.code(), scalar.code());
        assert!(table.code().starts_with("42P13"));
        assert!(scalar.code().starts_with("42P13"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::statement_count(3);
        assert_eq!(err.to_string(), "Expected 1 statement in function, got 3");

        let err = Error::return_type_mismatch(
            "return type mismatch in function declared to return record",
            SqlState::InvalidFunctionDefinitionTable,
        );
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionTable));
        assert!(err.to_string().contains("42P13-table"));

        let err = parse_err!("Expected: {}, found: {}", "SELECT", "INSERT");
        assert_eq!(err.to_string(), "Expected: SELECT, found: INSERT");
    }
}
