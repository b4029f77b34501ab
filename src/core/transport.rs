//! Transport API
//!
//! The generic, handle-based database access layer the bridge runs on. It follows the shape
//! of an ODBC driver manager: environment, connection and statement handles, numeric return
//! codes, column binding into caller-owned character buffers, and a per-handle chain of
//! diagnostic records. Drivers implement [`Transport`]; the bridge never sees a wire protocol.

use std::fmt;

/// Indicator value meaning "this column is SQL NULL"
pub const NULL_DATA: i64 = -1;

/// Return code of a transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlReturn {
    Success,
    SuccessWithInfo,
    NoData,
    Error,
    InvalidHandle,
    StillExecuting,
    NeedData,
    /// Any code outside the known set
    Other(i16),
}

impl SqlReturn {
    /// Map a raw ODBC return code
    pub fn from_raw(code: i16) -> Self {
        match code {
            0 => SqlReturn::Success,
            1 => SqlReturn::SuccessWithInfo,
            100 => SqlReturn::NoData,
            -1 => SqlReturn::Error,
            -2 => SqlReturn::InvalidHandle,
            2 => SqlReturn::StillExecuting,
            99 => SqlReturn::NeedData,
            other => SqlReturn::Other(other),
        }
    }

    /// Raw ODBC return code
    pub fn raw(&self) -> i16 {
        match self {
            SqlReturn::Success => 0,
            SqlReturn::SuccessWithInfo => 1,
            SqlReturn::NoData => 100,
            SqlReturn::Error => -1,
            SqlReturn::InvalidHandle => -2,
            SqlReturn::StillExecuting => 2,
            SqlReturn::NeedData => 99,
            SqlReturn::Other(code) => *code,
        }
    }

    /// `Success` or `SuccessWithInfo`
    pub fn is_success(&self) -> bool {
        matches!(self, SqlReturn::Success | SqlReturn::SuccessWithInfo)
    }
}

impl fmt::Display for SqlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.raw())
    }
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a driver-assigned handle value
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Driver-assigned handle value
            pub fn raw(&self) -> u64 {
                self.0
            }
        }
    };
}

handle_type!(
    /// Environment handle
    EnvHandle
);
handle_type!(
    /// Connection handle
    DbcHandle
);
handle_type!(
    /// Statement handle
    StmtHandle
);

/// Column attributes the bridge asks for during field discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAttribute {
    /// Name of the table the column belongs to
    TableName,
    /// Display label (alias or column name)
    Label,
    /// Maximum number of characters needed to display the column
    DisplaySize,
}

/// Value of a column attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Numeric(i64),
    /// Nothing was returned (failed calls)
    Empty,
}

impl AttributeValue {
    /// Character value, empty for non-text attributes
    pub fn into_text(self) -> String {
        match self {
            AttributeValue::Text(text) => text,
            _ => String::new(),
        }
    }

    /// Numeric value, 0 for non-numeric attributes
    pub fn as_numeric(&self) -> i64 {
        match self {
            AttributeValue::Numeric(value) => *value,
            _ => 0,
        }
    }
}

/// Options for `free_stmt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmtOption {
    /// Close the open cursor, keep the handle
    Close,
    /// Release all column bindings
    Unbind,
    /// Release all parameter bindings
    ResetParams,
    /// Release the handle
    Drop,
}

/// One diagnostic record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub sqlstate: String,
    pub native_error: i32,
    pub message: String,
}

impl DiagRecord {
    pub fn new(sqlstate: impl Into<String>, native_error: i32, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            native_error,
            message: message.into(),
        }
    }
}

/// A bound character buffer for one result column
///
/// The driver writes at most `capacity - 1` bytes into `data` (the last byte is reserved for
/// the terminator a C client would expect) and sets `indicator` to the full length of the
/// value, or to [`NULL_DATA`] for SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBuffer {
    pub data: Vec<u8>,
    pub capacity: usize,
    pub indicator: i64,
}

impl ColumnBuffer {
    /// Create an empty buffer able to hold `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            indicator: NULL_DATA,
        }
    }

    /// Overwrite the buffer with `value`, truncating to fit
    pub fn store(&mut self, value: Option<&[u8]>) {
        self.data.clear();
        match value {
            Some(bytes) => {
                let n = bytes.len().min(self.capacity.saturating_sub(1));
                self.data.extend_from_slice(&bytes[..n]);
                self.indicator = bytes.len() as i64;
            }
            None => self.indicator = NULL_DATA,
        }
    }

    /// True when the last stored value did not fit and was cut short
    pub fn is_truncated(&self) -> bool {
        self.indicator > self.data.len() as i64
    }

    /// True when the last stored value was SQL NULL
    pub fn is_null(&self) -> bool {
        self.indicator == NULL_DATA
    }

    /// Current contents, `None` for SQL NULL
    pub fn value(&self) -> Option<&[u8]> {
        if self.is_null() {
            None
        } else {
            Some(&self.data)
        }
    }
}

/// Handle-based database access API
///
/// Every call reports its outcome as a [`SqlReturn`]; values come back alongside it.
/// Diagnostics left by a call are read with [`Transport::error`].
pub trait Transport: Send + Sync {
    /// Human-readable driver name
    fn name(&self) -> &str;

    /// Allocate an environment handle
    fn alloc_env(&self) -> (SqlReturn, Option<EnvHandle>);

    /// Allocate a connection handle within `env`
    fn alloc_connect(&self, env: EnvHandle) -> (SqlReturn, Option<DbcHandle>);

    /// Connect `dbc` using a `KEY=VALUE;...` connection string, without prompting
    fn driver_connect(&self, dbc: DbcHandle, connection_string: &str) -> SqlReturn;

    /// Allocate a statement handle on a connected `dbc`
    fn alloc_stmt(&self, dbc: DbcHandle) -> (SqlReturn, Option<StmtHandle>);

    /// Execute `sql` directly, without a prepare phase
    fn exec_direct(&self, stmt: StmtHandle, sql: &str) -> SqlReturn;

    /// Number of columns in the current result
    fn num_result_cols(&self, stmt: StmtHandle) -> (SqlReturn, i16);

    /// Describe one column (1-based)
    fn col_attribute(
        &self,
        stmt: StmtHandle,
        column: u16,
        attribute: ColumnAttribute,
    ) -> (SqlReturn, AttributeValue);

    /// Rows affected by the last executed statement, -1 when unknown
    fn row_count(&self, stmt: StmtHandle) -> (SqlReturn, i64);

    /// Bind column `column` (1-based) as character data into a buffer of `buffer_len` bytes
    fn bind_col(&self, stmt: StmtHandle, column: u16, buffer_len: usize) -> SqlReturn;

    /// Fetch the next row into `buffers`, one per bound column in column order
    fn fetch(&self, stmt: StmtHandle, buffers: &mut [ColumnBuffer]) -> SqlReturn;

    /// Close, unbind, reset or drop a statement
    fn free_stmt(&self, stmt: StmtHandle, option: FreeStmtOption) -> SqlReturn;

    /// Disconnect `dbc`
    fn disconnect(&self, dbc: DbcHandle) -> SqlReturn;

    /// Release a connection handle
    fn free_connect(&self, dbc: DbcHandle) -> SqlReturn;

    /// Release an environment handle
    fn free_env(&self, env: EnvHandle) -> SqlReturn;

    /// Take the next diagnostic record of the most specific handle given
    ///
    /// Returns `NoData` once the chain of that handle is exhausted.
    fn error(
        &self,
        env: Option<EnvHandle>,
        dbc: Option<DbcHandle>,
        stmt: Option<StmtHandle>,
    ) -> (SqlReturn, Option<DiagRecord>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_mapping() {
        for code in [0i16, 1, 100, -1, -2, 2, 99, 42] {
            assert_eq!(SqlReturn::from_raw(code).raw(), code);
        }
        assert_eq!(SqlReturn::from_raw(42), SqlReturn::Other(42));
        assert!(SqlReturn::SuccessWithInfo.is_success());
        assert!(!SqlReturn::NoData.is_success());
    }

    #[test]
    fn test_column_buffer_truncates_and_reports_full_length() {
        let mut buffer = ColumnBuffer::with_capacity(4);
        buffer.store(Some(b"abcdef"));
        assert_eq!(buffer.value(), Some(&b"abc"[..]));
        assert_eq!(buffer.indicator, 6);

        buffer.store(None);
        assert!(buffer.is_null());
        assert_eq!(buffer.value(), None);
    }

    #[test]
    fn test_attribute_value_accessors() {
        assert_eq!(AttributeValue::Text("t".into()).into_text(), "t");
        assert_eq!(AttributeValue::Numeric(12).as_numeric(), 12);
        assert_eq!(AttributeValue::Empty.into_text(), "");
        assert_eq!(AttributeValue::Empty.as_numeric(), 0);
    }
}
