//! Error types for the SCM arena.
//!
//! Mirrors the hand-rolled error style used throughout this workspace: a
//! plain enum, a `Display` impl that spells out the failure in prose, and a
//! `Result` alias. No `?`-incompatible panics on caller-reachable failure.

use std::fmt;

/// Errors that can occur while opening, allocating from, or closing an
/// [`Arena`](crate::arena::Arena).
#[derive(Debug)]
pub enum ArenaError {
    /// The backing file could not be opened, is missing, or is not a
    /// regular file of nonzero size.
    Open(String),

    /// The fixed-address mapping could not be established, including the
    /// case where another `Arena` already holds the fixed address in this
    /// process.
    Map(String),

    /// Reading the utilization footer from the backing file failed.
    Read(String),

    /// Writing the utilization footer to the backing file failed, or
    /// flushing the mapping to stable storage failed.
    Write(String),

    /// The requested allocation exceeds the Arena's remaining capacity.
    OutOfArena {
        /// The requested allocation size, in bytes.
        requested: usize,
        /// The remaining usable capacity, in bytes.
        available: usize,
    },

    /// A zero-byte allocation was requested, or an alignment that is not a
    /// power of two was supplied to [`Arena::alloc_aligned`](crate::arena::Arena::alloc_aligned).
    InvalidArgument(String),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::Open(msg) => write!(f, "failed to open arena file: {msg}"),
            ArenaError::Map(msg) => write!(f, "failed to map arena file: {msg}"),
            ArenaError::Read(msg) => write!(f, "failed to read arena footer: {msg}"),
            ArenaError::Write(msg) => write!(f, "failed to write arena footer: {msg}"),
            ArenaError::OutOfArena {
                requested,
                available,
            } => write!(
                f,
                "arena out of space: requested {requested} bytes, {available} bytes available"
            ),
            ArenaError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for ArenaError {}

/// Result type for SCM arena operations.
pub type Result<T> = std::result::Result<T, ArenaError>;
