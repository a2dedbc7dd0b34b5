//! Error types for query evaluation and the service around it.

use tokio::task::JoinError;

use crate::partition::WindowError;
use crate::storage;

/// Error type for graphite operations.
///
/// `Parse`, `UnsupportedFunction` and `Argument` are faults in the request
/// itself; everything else is a server-side failure. See
/// [`Error::is_client_error`].
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed target expression, with the text it failed on.
    Parse { reason: String, fragment: String },

    /// A function name with no entry in the registry.
    UnsupportedFunction(String),

    /// Wrong argument count or type for a function, or an unusable
    /// request parameter.
    Argument(String),

    /// Backend I/O or decode failure.
    Fetch(String),

    /// Invalid service configuration.
    Config(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl Error {
    pub fn parse(reason: impl Into<String>, fragment: impl Into<String>) -> Self {
        Error::Parse {
            reason: reason.into(),
            fragment: fragment.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::UnsupportedFunction(_) | Error::Argument(_)
        )
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse { reason, fragment } => {
                write!(f, "Parse error: {} at '{}'", reason, fragment)
            }
            Error::UnsupportedFunction(name) => write!(f, "Unsupported function: {}", name),
            Error::Argument(msg) => write!(f, "Argument error: {}", msg),
            Error::Fetch(msg) => write!(f, "Fetch error: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::InvalidRange(msg) => Error::Argument(msg),
            other => Error::Fetch(other.to_string()),
        }
    }
}

impl From<WindowError> for Error {
    fn from(err: WindowError) -> Self {
        Error::Argument(err.to_string())
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::Internal(format!("evaluation task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Error::parse("unexpected token", ")"), true)]
    #[case(Error::UnsupportedFunction("nope".to_string()), true)]
    #[case(Error::Argument("alias expects 2 arguments".to_string()), true)]
    #[case(Error::Fetch("timeout".to_string()), false)]
    #[case(Error::Config("batch_limit".to_string()), false)]
    #[case(Error::Internal("bug".to_string()), false)]
    fn should_classify_client_errors(#[case] err: Error, #[case] client: bool) {
        assert_eq!(err.is_client_error(), client);
    }

    #[test]
    fn should_map_storage_errors_to_fetch() {
        // when
        let err = Error::from(storage::Error::Storage("disk full".to_string()));

        // then
        assert_eq!(err, Error::Fetch("Storage error: disk full".to_string()));
    }

    #[test]
    fn should_map_invalid_range_to_argument_error() {
        // when
        let err = Error::from(storage::Error::from(WindowError::OutOfRange));

        // then
        assert_eq!(err, Error::Argument("time range is out of bounds".to_string()));
        assert!(err.is_client_error());
    }
}
