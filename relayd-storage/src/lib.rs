//! # relayd-storage
//!
//! Storage layer for relayd.
//!
//! This crate provides:
//! - On-disk schema management (directory layout + schema version file)
//! - A durable append-only message log (JSON lines)

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{MessageStore, StoredMessage, SCHEMA_VERSION};
