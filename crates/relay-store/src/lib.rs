//! # relay-store
//!
//! SQLite persistence for the relay. A synchronous [`Database`] handle wraps a
//! `rusqlite::Connection` and provides typed helpers per table;
//! [`SqliteStore`] exposes it through the core `Store` port.

pub mod database;
pub mod migrations;
pub mod sqlite_store;

mod convert;
mod error;
mod ignores;
mod messages;
mod participants;
mod sales;
mod settings;
mod stats;
mod warnings;

pub use database::Database;
pub use error::{Result, StoreError};
pub use sqlite_store::SqliteStore;
