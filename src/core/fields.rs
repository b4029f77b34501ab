//! Field descriptors and their discovery
//!
//! After a statement executes, its result schema is rebuilt from scratch by asking the
//! transport about every column. Declared types are not discovered: every column is
//! reported as a string and values arrive as character data.

use super::config::BridgeConfig;
use super::diagnostics;
use super::error::{BridgeError, ErrorSlot, Result};
use super::handles::ConnectionHandle;
use super::transport::{ColumnAttribute, StmtHandle, Transport};
use serde::{Deserialize, Serialize};

/// Column types of the client API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    #[default]
    String = 254,
}

impl FieldType {
    /// Numeric type code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Integer-like and year columns
    pub fn is_numeric(&self) -> bool {
        self.code() <= FieldType::Int24.code() || *self == FieldType::Year
    }
}

/// Column flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFlags(u32);

impl FieldFlags {
    pub const NOT_NULL: FieldFlags = FieldFlags(1);
    pub const PRI_KEY: FieldFlags = FieldFlags(2);
    pub const UNIQUE_KEY: FieldFlags = FieldFlags(4);
    pub const MULTIPLE_KEY: FieldFlags = FieldFlags(8);
    pub const BLOB: FieldFlags = FieldFlags(16);
    pub const UNSIGNED: FieldFlags = FieldFlags(32);
    pub const ZEROFILL: FieldFlags = FieldFlags(64);
    pub const BINARY: FieldFlags = FieldFlags(128);
    pub const ENUM: FieldFlags = FieldFlags(256);
    pub const AUTO_INCREMENT: FieldFlags = FieldFlags(512);
    pub const TIMESTAMP: FieldFlags = FieldFlags(1024);
    pub const SET: FieldFlags = FieldFlags(2048);
    pub const NUM: FieldFlags = FieldFlags(32768);

    pub fn empty() -> Self {
        FieldFlags(0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FieldFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

/// Description of one result column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column label
    pub name: String,
    /// Owning table, empty for expressions
    pub table: String,
    /// Default value; never discovered from a query
    pub default: Option<String>,
    pub field_type: FieldType,
    /// Declared display width
    pub length: u32,
    /// Size of the buffer a row value of this column is read into
    pub max_length: u32,
    pub flags: FieldFlags,
    pub decimals: u32,
}

impl FieldDescriptor {
    /// Buffer size for a column of display width `length`
    pub fn buffer_len(&self) -> usize {
        self.max_length as usize
    }
}

/// Describe the `column_count` columns of the statement's current result
///
/// Zero columns yield an empty schema. Table name, label and display size are queried in
/// that order per column; a negative display size becomes `large_column_width`. Any failed
/// call aborts discovery and nothing partial is returned.
pub fn discover_fields(
    transport: &dyn Transport,
    handles: &mut ConnectionHandle,
    slot: &mut ErrorSlot,
    config: &BridgeConfig,
    stmt: StmtHandle,
    column_count: u16,
) -> Result<Vec<FieldDescriptor>> {
    let mut fields = Vec::new();
    if fields.try_reserve_exact(column_count as usize).is_err() {
        let err = BridgeError::out_of_memory();
        slot.record(&err);
        return Err(err);
    }

    for column in 1..=column_count {
        let (rc, table) = transport.col_attribute(stmt, column, ColumnAttribute::TableName);
        diagnostics::check(transport, handles, slot, rc, "SQLColAttribute")?;

        let (rc, label) = transport.col_attribute(stmt, column, ColumnAttribute::Label);
        diagnostics::check(transport, handles, slot, rc, "SQLColAttribute")?;

        let (rc, size) = transport.col_attribute(stmt, column, ColumnAttribute::DisplaySize);
        diagnostics::check(transport, handles, slot, rc, "SQLColAttribute")?;

        let length = display_length(size.as_numeric(), config.large_column_width);
        fields.push(FieldDescriptor {
            name: label.into_text(),
            table: table.into_text(),
            default: None,
            field_type: FieldType::String,
            length,
            max_length: length.saturating_add(config.buffer_slack),
            flags: FieldFlags::empty(),
            decimals: 0,
        });
    }

    Ok(fields)
}

fn display_length(size: i64, large_column_width: u32) -> u32 {
    if size < 0 {
        return large_column_width;
    }
    u32::try_from(size).unwrap_or(large_column_width)
}
