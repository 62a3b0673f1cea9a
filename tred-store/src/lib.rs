//! Durable keyspace: binlog codec, append-only binlog, and the in-memory store.
//!
//! Every accepted mutation is serialized into the binlog before the call returns, and the
//! keyspace is rebuilt by replaying that log at startup. The store is the only writer of the
//! binlog; replay and append never run concurrently.

pub mod binlog;
pub mod codec;
pub mod store;

pub use store::{SetCondition, Store, ValueEntry};
