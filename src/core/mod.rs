//! Core bridge types
//!
//! This module provides the transport API the bridge runs on and everything between it
//! and the client façade: error classification, handle lifecycle, query execution, field
//! discovery and result materialization.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod fields;
pub mod handles;
pub mod result;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorSlot, Result};
pub use fields::{FieldDescriptor, FieldFlags, FieldType};
pub use handles::ConnectionHandle;
pub use result::{ResultSet, Row, RowOffset};
pub use session::{Session, SharedSession, UNKNOWN_ROW_COUNT};
pub use transport::{
    AttributeValue, ColumnAttribute, ColumnBuffer, DbcHandle, DiagRecord, EnvHandle,
    FreeStmtOption, SqlReturn, StmtHandle, Transport,
};
