//! Error types for the word index.
//!
//! Follows the same hand-rolled style as `scm_mem::error`: a plain enum, a
//! prose `Display` impl, and a `Result` alias.

use std::fmt;

use scm_mem::ArenaError;

/// Errors that can occur while opening, querying, or mutating an
/// [`Index`](crate::Index).
#[derive(Debug)]
pub enum IndexError {
    /// `delete` was called for a word that is not present.
    NotFound,

    /// A word was empty or contained an embedded NUL byte.
    InvalidArgument(String),

    /// The underlying arena failed (allocation, mapping, or footer I/O).
    Arena(ArenaError),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::NotFound => write!(f, "word not found"),
            IndexError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            IndexError::Arena(e) => write!(f, "arena error: {e}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for IndexError {
    fn from(e: ArenaError) -> Self {
        IndexError::Arena(e)
    }
}

/// Result type for word index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
