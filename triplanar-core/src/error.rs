//! Error types for triplanar

use thiserror::Error;

/// Main error type for triplanar operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shape mismatch in {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        operation: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl Error {
    /// Build a [`Error::ShapeMismatch`] from anything printable
    pub fn shape_mismatch(
        operation: &'static str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Error::ShapeMismatch {
            operation,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type alias for triplanar operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::shape_mismatch("reshape", "a compatible shape", e)
    }
}

#[cfg(feature = "gpu")]
impl From<wgpu::BufferAsyncError> for Error {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        Error::Gpu(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = Error::shape_mismatch("render", "[N, 3]", "[4, 2]");
        assert_eq!(
            err.to_string(),
            "Shape mismatch in render: expected [N, 3], got [4, 2]"
        );
    }
}
