//! Error types for zenheif

use crate::engine::{EngineError, ErrorCode};
use whereat::{At, at};

/// Error type for container, conversion and codec operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Source unreadable or destination unwritable
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input is not a recognized container (missing `ftyp`, unknown brand, corrupt boxes)
    #[error("Format error: {0}")]
    Format(String),

    /// Brand recognized but no codec is available for it
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Native decode failure
    #[error("Decode error {code}.{subcode}: {message}")]
    Decode {
        /// Native error code
        code: i32,
        /// Native subcode
        subcode: i32,
        /// Error description
        message: String,
    },

    /// No encoder for the requested compression format, or native encode failure
    #[error("Encode error {code}.{subcode}: {message}")]
    Encode {
        /// Native error code
        code: i32,
        /// Native subcode
        subcode: i32,
        /// Error description
        message: String,
    },

    /// Memory allocation failed inside the engine
    #[error("Out of memory")]
    OutOfMemory,

    /// Invalid argument or call sequence
    #[error("Usage error: {0}")]
    Usage(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Format,
    Decode,
    Encode,
    Memory,
    Usage,
}

impl Error {
    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) => ErrorCategory::Io,
            Error::Format(_) | Error::UnsupportedFormat(_) => ErrorCategory::Format,
            Error::Decode { .. } => ErrorCategory::Decode,
            Error::Encode { .. } => ErrorCategory::Encode,
            Error::OutOfMemory => ErrorCategory::Memory,
            Error::Usage(_) => ErrorCategory::Usage,
        }
    }

    /// Native error code, when the error came from the engine
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Decode { code, .. } | Error::Encode { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        let EngineError {
            code,
            subcode,
            message,
        } = e;
        match code {
            ErrorCode::Io => Error::Io(std::io::Error::other(message)),
            ErrorCode::InvalidInput | ErrorCode::UnsupportedFiletype => Error::Format(message),
            ErrorCode::UnsupportedFeature => Error::UnsupportedFormat(message),
            ErrorCode::Usage => Error::Usage(message),
            ErrorCode::MemoryAllocation => Error::OutOfMemory,
            ErrorCode::Decoder => Error::Decode {
                code: code as i32,
                subcode,
                message,
            },
            ErrorCode::Encoder => Error::Encode {
                code: code as i32,
                subcode,
                message,
            },
        }
    }
}

/// Translate a native error at the call site that produced it
#[track_caller]
pub(crate) fn native(e: EngineError) -> At<Error> {
    at(Error::from(e))
}

#[track_caller]
pub(crate) fn io(e: std::io::Error) -> At<Error> {
    at(Error::Io(e))
}

/// Result type for zenheif operations with location tracking
pub type Result<T, E = whereat::At<Error>> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_codes_map_to_categories() {
        let cases = [
            (ErrorCode::Io, ErrorCategory::Io),
            (ErrorCode::InvalidInput, ErrorCategory::Format),
            (ErrorCode::UnsupportedFeature, ErrorCategory::Format),
            (ErrorCode::Usage, ErrorCategory::Usage),
            (ErrorCode::MemoryAllocation, ErrorCategory::Memory),
            (ErrorCode::Decoder, ErrorCategory::Decode),
            (ErrorCode::Encoder, ErrorCategory::Encode),
        ];
        for (code, category) in cases {
            let err = Error::from(EngineError::new(code, 0, "x"));
            assert_eq!(err.category(), category, "{code:?}");
        }
    }

    #[test]
    fn decode_error_keeps_native_subcode() {
        let err = Error::from(EngineError::new(ErrorCode::Decoder, 42, "bad slice"));
        match err {
            Error::Decode { code, subcode, .. } => {
                assert_eq!(code, ErrorCode::Decoder as i32);
                assert_eq!(subcode, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
