//! # Rust SQL Bridge
//!
//! A MySQL-style client API implemented on top of a generic, handle-based database access
//! layer. Application code written against the familiar connect / query / store-or-use /
//! fetch-row call pattern runs unchanged while the actual work is done by any driver that
//! implements the [`Transport`] trait, modeled on an ODBC driver manager.
//!
//! ## Features
//!
//! - **Familiar surface**: connection, query, buffered and streaming results, row and
//!   field cursors, `errno`/`error` diagnostics
//! - **Pluggable transports**: a SQLite driver built on `rusqlite` and a scripted in-memory
//!   driver for tests
//! - **Normalized errors**: transport diagnostics collapse into four error kinds with stable
//!   numeric codes
//! - **Borrow-checked rows**: a streamed row cannot outlive the next fetch
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rust_sql_bridge = { version = "0.1", features = ["sqlite"] }
//! ```
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use rust_sql_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let mut conn = Connection::init(Arc::new(SqliteTransport::new()));
//!     conn.connect(Some("localhost"), Some("app"), None, Some("test"), 0, None, 0)?;
//!
//!     conn.query("CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(40))")?;
//!     conn.query("INSERT INTO users (name) VALUES ('Alice')")?;
//!     conn.query("SELECT id, name FROM users")?;
//!
//!     if let Some(mut result) = conn.store_result()? {
//!         while let Some(row) = result.fetch_row() {
//!             println!("User: {:?}", row.get_str(1));
//!         }
//!     }
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```
//!
//! ### Checking Errors
//!
//! ```rust,no_run
//! use rust_sql_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! let mut conn = Connection::init(Arc::new(SqliteTransport::new()));
//! conn.connect(None, None, None, None, 0, None, 0).ok();
//!
//! if conn.query("SELEC 1").is_err() {
//!     eprintln!("error {}: {}", conn.errno(), conn.error());
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! rust_sql_bridge/
//! ├── src/
//! │   ├── core/              # Transport API and the bridge between it and the client
//! │   │   ├── transport.rs   # Transport trait, handles, return codes
//! │   │   ├── diagnostics.rs # Diagnostic normalization
//! │   │   ├── handles.rs     # Handle lifecycle
//! │   │   ├── executor.rs    # Query execution
//! │   │   ├── fields.rs      # Field descriptors
//! │   │   ├── result.rs      # Buffered and streaming results
//! │   │   └── ...
//! │   ├── client/            # Connection façade
//! │   ├── backends/          # Transport implementations
//! │   └── lib.rs
//! ├── demos/                 # Example programs
//! ├── tests/                 # Integration tests
//! └── Cargo.toml
//! ```

/// Transport API and bridge core
pub mod core;

/// Client-facing connection API
pub mod client;

/// Transport implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_sql_bridge::prelude::*;
/// use std::sync::Arc;
///
/// let conn = Connection::init(Arc::new(ScriptedTransport::new()));
/// assert_eq!(conn.errno(), 0);
/// ```
pub mod prelude {
    pub use crate::backends::ScriptedTransport;
    pub use crate::client::{Connection, ConnectionBuilder};
    pub use crate::core::{
        BridgeConfig, BridgeError, FieldDescriptor, FieldType, Result, ResultSet, Row,
        RowOffset, Transport,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteTransport;
}

// Re-export at root level for convenience
pub use client::{Connection, ConnectionBuilder};
pub use core::{
    BridgeConfig, BridgeError, FieldDescriptor, FieldType, Result, ResultSet, Row, RowOffset,
    Transport,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let field = FieldDescriptor::default();
        assert_eq!(field.field_type, FieldType::String);
        assert_eq!(BridgeError::ServerLost.code(), 2013);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(BridgeError::OutOfMemory.to_string(), "MySQL client run out of memory");
        assert_eq!(BridgeError::bridge("no such table: t").to_string(), "no such table: t");
    }
}
