//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `tinyredis-rs`.
pub type TredResult<T> = Result<T, TredError>;

/// High-level error categories shared by the store, facade, and server crates.
///
/// Command-level failures that a client should see as a RESP error reply (bad SET options,
/// wrong arity, unknown command) are plain reply strings produced by the dispatcher and never
/// appear here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TredError {
    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Runtime state does not allow this operation.
    #[error("invalid runtime state: {0}")]
    InvalidState(&'static str),

    /// Client wire payload is malformed or semantically invalid.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Binlog contents cannot be replayed into a keyspace.
    #[error("corrupt binlog: {0}")]
    Corrupt(String),

    /// Filesystem or socket I/O failed.
    #[error("io error: {0}")]
    Io(String),
}
