//! Error types for the vector facade.

use thiserror::Error;

/// Result type alias using the vector error type.
pub type Result<T> = std::result::Result<T, VectorError>;

/// Error type for vector store operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Embedding the text failed.
    #[error("Embedding error: {0}")]
    Embedding(#[from] switchboard_llm::LlmError),

    /// A vector's dimensionality does not match the store's.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the store was configured with.
        expected: usize,
        /// Dimensions of the offending vector.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VectorError::DimensionMismatch {
            expected: 384,
            actual: 1536,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("1536"));
    }
}
