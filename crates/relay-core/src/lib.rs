//! Core domain + application logic for the anonymous relay bot.
//!
//! This crate is framework-agnostic. Telegram and SQLite live behind ports
//! (traits) implemented in adapter crates.

pub mod admission;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fanout;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod preferences;
pub mod presentation;
pub mod propagate;
pub mod relay;
pub mod similarity;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
