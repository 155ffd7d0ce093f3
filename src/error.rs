//! Error type shared by the statistics pipeline, the counter stores and the recorder.

use std::io::Error as IoError;

/// Errors produced while building a distribution report or recording counters
#[derive(Debug)]
pub enum StatError {
    /// A fetched counter field does not follow `tag:reason:index:item:token`,
    /// or its value is not a non-negative integer
    MalformedKey { key: String, reason: String },
    /// The counter store could not be reached or rejected the request
    StoreUnavailable(String),
    /// Configuration was rejected before any work started
    InvalidConfig(String),
    /// I/O error while writing a report
    Io(IoError),
    /// CSV encoding error that is not an I/O failure
    Sink(String),
}

impl StatError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StatError::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        StatError::InvalidConfig(msg.into())
    }

    /// Whether the failure came from the counter store rather than the data in it
    pub fn is_store_error(&self) -> bool {
        matches!(self, StatError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for StatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatError::MalformedKey { key, reason } => {
                write!(f, "Malformed counter key '{}': {}", key, reason)
            }
            StatError::StoreUnavailable(msg) => write!(f, "Counter store unavailable: {}", msg),
            StatError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            StatError::Io(e) => write!(f, "I/O error: {}", e),
            StatError::Sink(msg) => write!(f, "Report sink error: {}", msg),
        }
    }
}

impl std::error::Error for StatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for StatError {
    fn from(e: IoError) -> Self {
        StatError::Io(e)
    }
}

impl From<csv::Error> for StatError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => StatError::Io(io),
                other => StatError::Sink(format!("{:?}", other)),
            }
        } else {
            StatError::Sink(e.to_string())
        }
    }
}

impl From<redis::RedisError> for StatError {
    fn from(e: redis::RedisError) -> Self {
        StatError::StoreUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_malformed_key() {
        let err = StatError::malformed("a:b", "expected 5 components, found 2");
        assert_eq!(
            err.to_string(),
            "Malformed counter key 'a:b': expected 5 components, found 2"
        );
        assert!(!err.is_store_error());
    }

    #[test]
    fn test_io_error_converts() {
        let err: StatError = IoError::new(std::io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, StatError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_store_error_flag() {
        let err = StatError::StoreUnavailable("connection refused".to_string());
        assert!(err.is_store_error());
        assert!(err.to_string().contains("connection refused"));
    }
}
