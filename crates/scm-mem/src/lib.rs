//! SCM (storage-class-memory) arena: a persistent, file-backed heap.
//!
//! This crate provides the Arena: a single regular file, mapped in full at a
//! fixed virtual address, that is bump-allocated from like a never-shrinking
//! heap. Pointers handed out by
//! [`Arena::alloc`] remain valid for the lifetime of the `Arena` handle; the
//! utilization high-water mark is the only state persisted across
//! close/reopen, so reconstituting any structure built on top of the arena
//! (see the `scm-index` crate) is a matter of re-deriving it from the bytes
//! already on disk, not replaying a log.
//!
//! # Design Goals
//!
//! 1. **Reproducibility**: the same sequence of allocations against the same
//!    file yields the same offsets, session after session.
//! 2. **Simplicity**: append-only bump allocation, no coalescing, no free
//!    list (see [`Arena::free`]).
//! 3. **Small unsafe surface**: the only unsafe code lives in this crate; the
//!    fixed-address mapping and footer access are the sole places pointer
//!    arithmetic happens directly against OS memory.

pub mod arena;
pub mod error;

pub use arena::{Arena, FIXED_BASE_ADDR};
pub use error::{ArenaError, Result};
