//! feedstore-storage - SQLite primary record store for feeds and entries
//!
//! This crate owns the feeds/entries schema and every mutation of it. The
//! companion `feedstore-search` crate installs maintenance triggers on these
//! tables; all mutations here go through plain SQL statements so those
//! triggers observe every change.

pub mod connection;
pub mod entries;
pub mod feeds;
pub mod schema;

pub use connection::{Storage, StorageError, DEFAULT_CHUNK_SIZE};
pub use schema::init_schema;
