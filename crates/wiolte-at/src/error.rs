//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur when parsing module output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtError {
    /// A line did not carry the expected prefix.
    #[error("expected a line starting with {expected:?}, got {line:?}")]
    UnexpectedLine {
        /// The prefix that was expected.
        expected: &'static str,
        /// The line that was received (lossy UTF-8).
        line: String,
    },

    /// A field could not be parsed.
    #[error("invalid {field} in {line:?}")]
    InvalidField {
        /// Name of the field being parsed.
        field: &'static str,
        /// The line that was received (lossy UTF-8).
        line: String,
    },

    /// A field was missing from a comma-separated response.
    #[error("missing {field} in {line:?}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// The line that was received (lossy UTF-8).
        line: String,
    },
}

/// Result type alias for AT parsing operations.
pub type AtResult<T> = Result<T, AtError>;
