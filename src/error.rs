//! Error types for stream flow control.
//!
//! Every error carries a stable code string so callers can match on it the
//! same way regardless of which side of a stream raised it.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    PushAfterEof,
    UnshiftAfterEndEvent,
    WriteAfterEnd,
    Destroyed,
    AlreadyFinished,
    InvalidArgType,
    OutOfRange,
    Io,
    Custom,
    Unhandled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PushAfterEof => "ERR_STREAM_PUSH_AFTER_EOF",
            ErrorCode::UnshiftAfterEndEvent => "ERR_STREAM_UNSHIFT_AFTER_END_EVENT",
            ErrorCode::WriteAfterEnd => "ERR_STREAM_WRITE_AFTER_END",
            ErrorCode::Destroyed => "ERR_STREAM_DESTROYED",
            ErrorCode::AlreadyFinished => "ERR_STREAM_ALREADY_FINISHED",
            ErrorCode::InvalidArgType => "ERR_INVALID_ARG_TYPE",
            ErrorCode::OutOfRange => "ERR_OUT_OF_RANGE",
            ErrorCode::Io => "ERR_STREAM_IO",
            ErrorCode::Custom => "ERR_STREAM_CUSTOM",
            ErrorCode::Unhandled => "ERR_UNHANDLED_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("stream.push() after EOF")]
    PushAfterEof,

    #[error("stream.unshift() after end event")]
    UnshiftAfterEndEvent,

    #[error("write after end")]
    WriteAfterEnd,

    #[error("Cannot call {op} after a stream was destroyed")]
    Destroyed { op: &'static str },

    #[error("Cannot call {op} after a stream was finished")]
    AlreadyFinished { op: &'static str },

    #[error("The \"chunk\" argument must be {expected}")]
    InvalidChunk { expected: &'static str },

    #[error("The value of \"size\" is out of range. It must be <= 1GiB. Received {size}")]
    OutOfRange { size: usize },

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("{0}")]
    Custom(String),

    #[error("Unhandled error. ({0})")]
    Unhandled(Box<StreamError>),
}

impl StreamError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StreamError::PushAfterEof => ErrorCode::PushAfterEof,
            StreamError::UnshiftAfterEndEvent => ErrorCode::UnshiftAfterEndEvent,
            StreamError::WriteAfterEnd => ErrorCode::WriteAfterEnd,
            StreamError::Destroyed { .. } => ErrorCode::Destroyed,
            StreamError::AlreadyFinished { .. } => ErrorCode::AlreadyFinished,
            StreamError::InvalidChunk { .. } => ErrorCode::InvalidArgType,
            StreamError::OutOfRange { .. } => ErrorCode::OutOfRange,
            StreamError::Io(_) => ErrorCode::Io,
            StreamError::Custom(_) => ErrorCode::Custom,
            StreamError::Unhandled(_) => ErrorCode::Unhandled,
        }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        StreamError::Custom(message.into())
    }

    /// The error that was originally raised, looking through `Unhandled`.
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::Unhandled(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            StreamError::PushAfterEof.code().as_str(),
            "ERR_STREAM_PUSH_AFTER_EOF"
        );
        assert_eq!(
            StreamError::Destroyed { op: "write" }.code().to_string(),
            "ERR_STREAM_DESTROYED"
        );
        assert_eq!(
            StreamError::WriteAfterEnd.code(),
            ErrorCode::WriteAfterEnd
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: StreamError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_unhandled_root() {
        let err = StreamError::Unhandled(Box::new(StreamError::custom("boom")));
        assert_eq!(err.code(), ErrorCode::Unhandled);
        assert_eq!(err.root().code(), ErrorCode::Custom);
        assert_eq!(err.to_string(), "Unhandled error. (boom)");
    }
}
