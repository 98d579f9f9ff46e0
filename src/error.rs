//! Streaming error types.

use std::fmt;

/// Errors that can occur in the streaming subsystem.
///
/// These are the recoverable failures: they propagate to the caller
/// instead of panicking. Contract violations (double-pending a layer,
/// zero-size reservations, misaligned offsets) panic instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Failed to create a device resource.
    ResourceCreationFailed(String),
    /// A batched command submission failed to execute.
    SubmissionFailed(String),
    /// A view or layer index was out of bounds.
    OutOfBounds(String),
    /// A vertex attribute arrived in an encoding with no conversion path.
    UnsupportedFormat(String),
    /// An invalid parameter or malformed descriptor was provided.
    InvalidParameter(String),
    /// The requested operation is not supported by this texture.
    Unsupported(String),
    /// A staging region was too small for the requested copy.
    InsufficientCapacity(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "submission failed: {msg}"),
            Self::OutOfBounds(msg) => write!(f, "index out of bounds: {msg}"),
            Self::UnsupportedFormat(msg) => write!(f, "unsupported format: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported operation: {msg}"),
            Self::InsufficientCapacity(msg) => write!(f, "insufficient capacity: {msg}"),
        }
    }
}

impl std::error::Error for StreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::SubmissionFailed("device lost".to_string());
        assert_eq!(err.to_string(), "submission failed: device lost");

        let err = StreamError::OutOfBounds("view 7 of 4".to_string());
        assert_eq!(err.to_string(), "index out of bounds: view 7 of 4");
    }
}
