//! Error types for the soundshift crate.

use thiserror::Error;

/// Errors that can occur while configuring or running a processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// A channel count, buffer length, control value or setting value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Unknown settings key.
    #[error("unknown setting id {0}")]
    InvalidSetting(i32),
    /// An internal buffer could not grow.
    #[error("could not allocate {requested} samples for an internal buffer")]
    ResourceExhausted { requested: usize },
    /// A settings profile could not be parsed or serialized.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        ProcessError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessError::InvalidArgument("channels must be 1 or 2, got 3".to_string());
        assert!(err.to_string().contains("got 3"));

        let err = ProcessError::InvalidSetting(42);
        assert!(err.to_string().contains("42"));

        let err = ProcessError::ResourceExhausted { requested: 1024 };
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing profile");
        let err: ProcessError = io.into();
        assert!(matches!(err, ProcessError::Io(ref msg) if msg.contains("missing profile")));
    }
}
