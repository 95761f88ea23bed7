//! Conversation store implementations for DeepSearch.

pub mod sqlite;

pub use sqlite::SqliteStore;
