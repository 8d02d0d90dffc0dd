//! Session Relay Shared Types and Utilities
//!
//! This crate contains the chat store boundary shared by the relay server:
//! the `ChatStore` trait, its Postgres and in-memory implementations, and
//! database pool setup.

pub mod db;
pub mod error;
pub mod notes;

pub use db::*;
pub use error::*;
pub use notes::{ChatStore, MemoryChatStore, PgChatStore};
