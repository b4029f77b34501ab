//! Transport implementations
//!
//! This module contains concrete implementations of the Transport trait.

pub mod scripted;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use scripted::{Call, ScriptedColumn, ScriptedResult, ScriptedTransport};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTransport;
