//! feedstore-core - Core types for the feedstore record store and search index
//!
//! This crate defines the domain records (feeds, entries, content items), the
//! filter options accepted by search queries, and the highlighted-result types
//! produced by the search index. It has no database access of its own.

pub mod filter;
pub mod highlight;
pub mod types;

pub use filter::*;
pub use highlight::*;
pub use types::*;
