//! # haven-store
//!
//! Persistent storage for Haven, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed, user-scoped helpers for every
//! record kind, the chat transcripts, and user accounts. Every helper takes
//! the owner's `UserId`; there is no unscoped data access.

pub mod chat;
pub mod database;
pub mod migrations;
pub mod models;
pub mod records;
pub mod singletons;
pub mod snapshot;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
