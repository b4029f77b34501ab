//! SQLite transport
//!
//! This module provides a SQLite implementation of the [`Transport`] trait on top of
//! `rusqlite`. Statements run when they are executed and their rows are read into a
//! driver-side cursor, which `fetch` then walks one row at a time.

use crate::core::transport::{
    AttributeValue, ColumnAttribute, ColumnBuffer, DbcHandle, DiagRecord, EnvHandle,
    FreeStmtOption, SqlReturn, StmtHandle, Transport,
};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;

const DIAG_PREFIX: &str = "[rust_sql_bridge][SQLite]";

/// Display size for declared types without a width
const UNKNOWN_DISPLAY_SIZE: i64 = -1;

/// Display size of integer columns
const INTEGER_DISPLAY_SIZE: i64 = 20;

/// Display size of floating-point columns; longer renderings switch to exponent form
const REAL_DISPLAY_SIZE: i64 = 24;

#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    decl_type: Option<String>,
}

#[derive(Debug, Default)]
struct Cursor {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Option<Vec<u8>>>>,
    position: usize,
    row_count: i64,
}

struct StmtState {
    dbc: u64,
    cursor: Option<Cursor>,
}

#[derive(Default)]
struct DbcState {
    connection: Option<Connection>,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    envs: HashSet<u64>,
    dbcs: HashMap<u64, DbcState>,
    stmts: HashMap<u64, StmtState>,
    diags: HashMap<u64, VecDeque<DiagRecord>>,
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Start a call on `handle`: its previous diagnostics are discarded
    fn enter(&mut self, handle: u64) {
        self.diags.remove(&handle);
    }

    fn fail(&mut self, handle: u64, sqlstate: &str, native_error: i32, message: &str) -> SqlReturn {
        debug!(handle, sqlstate, message, "sqlite diagnostic");
        self.diags.entry(handle).or_default().push_back(DiagRecord::new(
            sqlstate,
            native_error,
            format!("{}{}", DIAG_PREFIX, message),
        ));
        SqlReturn::Error
    }

    /// Leave an informational record on `handle`
    fn inform(&mut self, handle: u64, sqlstate: &str, message: &str) -> SqlReturn {
        debug!(handle, sqlstate, message, "sqlite informational diagnostic");
        self.diags.entry(handle).or_default().push_back(DiagRecord::new(
            sqlstate,
            0,
            format!("{}{}", DIAG_PREFIX, message),
        ));
        SqlReturn::SuccessWithInfo
    }

    fn fail_sqlite(&mut self, handle: u64, err: &rusqlite::Error) -> SqlReturn {
        let native = match err {
            rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
            _ => 0,
        };
        let message = err.to_string();
        let sqlstate = if message.contains("syntax error") {
            "42000"
        } else {
            "HY000"
        };
        self.fail(handle, sqlstate, native, &message)
    }

    fn cursor_mut(&mut self, stmt: u64) -> Option<&mut Cursor> {
        self.stmts.get_mut(&stmt).and_then(|s| s.cursor.as_mut())
    }
}

/// SQLite driver for the bridge
pub struct SqliteTransport {
    data_sources: HashMap<String, PathBuf>,
    state: Mutex<State>,
}

impl SqliteTransport {
    /// Create a driver without registered data sources
    pub fn new() -> Self {
        Self {
            data_sources: HashMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Map the data source name `name` to the database file at `path`
    ///
    /// Names are matched case-insensitively. Unregistered names open a private in-memory
    /// database.
    pub fn with_data_source(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.data_sources
            .insert(name.into().to_ascii_lowercase(), path.into());
        self
    }

    fn resolve(&self, connection_string: &str) -> Option<PathBuf> {
        let attributes = parse_connection_string(connection_string);
        if let Some(database) = attributes.get("database") {
            return Some(PathBuf::from(database));
        }
        attributes
            .get("dsn")
            .and_then(|dsn| self.data_sources.get(&dsn.to_ascii_lowercase()))
            .cloned()
    }
}

impl Default for SqliteTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SqliteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransport")
            .field("data_sources", &self.data_sources)
            .finish()
    }
}

/// Split `KEY=VALUE;...` into lower-cased keys and raw values
pub fn parse_connection_string(connection_string: &str) -> HashMap<String, String> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.to_string()))
        .collect()
}

/// Display size implied by a declared column type
pub fn display_size(decl_type: Option<&str>) -> i64 {
    let decl = match decl_type {
        Some(decl) => decl.to_ascii_uppercase(),
        None => return UNKNOWN_DISPLAY_SIZE,
    };

    if decl.contains("CHAR") {
        return declared_width(&decl).unwrap_or(UNKNOWN_DISPLAY_SIZE);
    }
    if decl.contains("INT") {
        INTEGER_DISPLAY_SIZE
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        REAL_DISPLAY_SIZE
    } else if decl.contains("BOOL") {
        1
    } else {
        UNKNOWN_DISPLAY_SIZE
    }
}

fn declared_width(decl: &str) -> Option<i64> {
    let open = decl.find('(')?;
    let close = decl[open..].find(')')? + open;
    decl[open + 1..close].trim().parse().ok()
}

/// Character form of a SQLite value; blobs become upper-case hex
fn to_text(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string().into_bytes()),
        ValueRef::Real(v) => Some(real_text(v).into_bytes()),
        ValueRef::Text(v) => Some(v.to_vec()),
        ValueRef::Blob(v) => {
            let mut hex = String::with_capacity(v.len() * 2);
            for byte in v {
                let _ = write!(hex, "{:02X}", byte);
            }
            Some(hex.into_bytes())
        }
    }
}

fn real_text(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() as i64 > REAL_DISPLAY_SIZE {
        format!("{:e}", value)
    } else {
        plain
    }
}

/// Statements for which zero affected rows means "no data"
fn is_searched(sql: &str) -> bool {
    first_keyword(sql).is_some_and(|k| k == "UPDATE" || k == "DELETE")
}

fn changes_rows(sql: &str) -> bool {
    first_keyword(sql)
        .is_some_and(|k| matches!(k.as_str(), "INSERT" | "UPDATE" | "DELETE" | "REPLACE"))
}

fn first_keyword(sql: &str) -> Option<String> {
    sql.split_whitespace().next().map(|w| w.to_ascii_uppercase())
}

fn run(connection: &Connection, sql: &str) -> rusqlite::Result<Cursor> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<ColumnInfo> = statement
        .columns()
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            decl_type: c.decl_type().map(str::to_string),
        })
        .collect();

    if columns.is_empty() {
        let changed = statement.execute([])?;
        let row_count = if changes_rows(sql) { changed as i64 } else { 0 };
        return Ok(Cursor {
            row_count,
            ..Cursor::default()
        });
    }

    let mut rows = Vec::new();
    let mut query = statement.query([])?;
    while let Some(row) = query.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(to_text(row.get_ref(index)?));
        }
        rows.push(values);
    }

    Ok(Cursor {
        columns,
        rows,
        position: 0,
        row_count: -1,
    })
}

impl Transport for SqliteTransport {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn alloc_env(&self) -> (SqlReturn, Option<EnvHandle>) {
        let mut state = self.state.lock();
        let raw = state.allocate();
        state.envs.insert(raw);
        (SqlReturn::Success, Some(EnvHandle::from_raw(raw)))
    }

    fn alloc_connect(&self, env: EnvHandle) -> (SqlReturn, Option<DbcHandle>) {
        let mut state = self.state.lock();
        if !state.envs.contains(&env.raw()) {
            return (SqlReturn::InvalidHandle, None);
        }
        state.enter(env.raw());
        let raw = state.allocate();
        state.dbcs.insert(raw, DbcState::default());
        (SqlReturn::Success, Some(DbcHandle::from_raw(raw)))
    }

    fn driver_connect(&self, dbc: DbcHandle, connection_string: &str) -> SqlReturn {
        let mut state = self.state.lock();
        if !state.dbcs.contains_key(&dbc.raw()) {
            return SqlReturn::InvalidHandle;
        }
        state.enter(dbc.raw());

        let path = self.resolve(connection_string);
        let opened = match &path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        };
        let connection = match opened.and_then(|c| c.execute("PRAGMA foreign_keys = ON", []).map(|_| c)) {
            Ok(connection) => connection,
            Err(err) => return state.fail_sqlite(dbc.raw(), &err),
        };

        debug!(path = ?path, "sqlite connection opened");
        if let Some(slot) = state.dbcs.get_mut(&dbc.raw()) {
            slot.connection = Some(connection);
        }
        SqlReturn::Success
    }

    fn alloc_stmt(&self, dbc: DbcHandle) -> (SqlReturn, Option<StmtHandle>) {
        let mut state = self.state.lock();
        let connected = match state.dbcs.get(&dbc.raw()) {
            Some(slot) => slot.connection.is_some(),
            None => return (SqlReturn::InvalidHandle, None),
        };
        state.enter(dbc.raw());
        if !connected {
            return (state.fail(dbc.raw(), "08003", 0, "connection not open"), None);
        }

        let raw = state.allocate();
        state.stmts.insert(
            raw,
            StmtState {
                dbc: dbc.raw(),
                cursor: None,
            },
        );
        (SqlReturn::Success, Some(StmtHandle::from_raw(raw)))
    }

    fn exec_direct(&self, stmt: StmtHandle, sql: &str) -> SqlReturn {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let dbc = match state.stmts.get(&stmt.raw()) {
            Some(statement) => statement.dbc,
            None => return SqlReturn::InvalidHandle,
        };
        state.enter(stmt.raw());

        let outcome = match state.dbcs.get(&dbc).and_then(|d| d.connection.as_ref()) {
            Some(connection) => run(connection, sql),
            None => return state.fail(stmt.raw(), "08003", 0, "connection not open"),
        };
        let cursor = match outcome {
            Ok(cursor) => cursor,
            Err(err) => return state.fail_sqlite(stmt.raw(), &err),
        };

        let rc = if cursor.columns.is_empty() && cursor.row_count == 0 && is_searched(sql) {
            SqlReturn::NoData
        } else {
            SqlReturn::Success
        };
        if let Some(statement) = state.stmts.get_mut(&stmt.raw()) {
            statement.cursor = Some(cursor);
        }
        rc
    }

    fn num_result_cols(&self, stmt: StmtHandle) -> (SqlReturn, i16) {
        let mut state = self.state.lock();
        let count = match state.stmts.get(&stmt.raw()) {
            Some(statement) => statement.cursor.as_ref().map_or(0, |c| c.columns.len()),
            None => return (SqlReturn::InvalidHandle, 0),
        };
        state.enter(stmt.raw());
        (SqlReturn::Success, i16::try_from(count).unwrap_or(i16::MAX))
    }

    fn col_attribute(
        &self,
        stmt: StmtHandle,
        column: u16,
        attribute: ColumnAttribute,
    ) -> (SqlReturn, AttributeValue) {
        let mut state = self.state.lock();
        if !state.stmts.contains_key(&stmt.raw()) {
            return (SqlReturn::InvalidHandle, AttributeValue::Empty);
        }
        state.enter(stmt.raw());

        let info = state
            .cursor_mut(stmt.raw())
            .and_then(|c| c.columns.get(usize::from(column).wrapping_sub(1)))
            .cloned();
        let info = match info {
            Some(info) => info,
            None => {
                return (
                    state.fail(stmt.raw(), "07009", 0, "invalid descriptor index"),
                    AttributeValue::Empty,
                )
            }
        };

        let value = match attribute {
            ColumnAttribute::TableName => AttributeValue::Text(String::new()),
            ColumnAttribute::Label => AttributeValue::Text(info.name),
            ColumnAttribute::DisplaySize => {
                AttributeValue::Numeric(display_size(info.decl_type.as_deref()))
            }
        };
        (SqlReturn::Success, value)
    }

    fn row_count(&self, stmt: StmtHandle) -> (SqlReturn, i64) {
        let mut state = self.state.lock();
        let count = match state.stmts.get(&stmt.raw()) {
            Some(statement) => statement.cursor.as_ref().map_or(-1, |c| c.row_count),
            None => return (SqlReturn::InvalidHandle, 0),
        };
        state.enter(stmt.raw());
        (SqlReturn::Success, count)
    }

    fn bind_col(&self, stmt: StmtHandle, column: u16, _buffer_len: usize) -> SqlReturn {
        let mut state = self.state.lock();
        if !state.stmts.contains_key(&stmt.raw()) {
            return SqlReturn::InvalidHandle;
        }
        state.enter(stmt.raw());

        let columns = state.cursor_mut(stmt.raw()).map_or(0, |c| c.columns.len());
        if column == 0 || usize::from(column) > columns {
            return state.fail(stmt.raw(), "07009", 0, "invalid descriptor index");
        }
        SqlReturn::Success
    }

    fn fetch(&self, stmt: StmtHandle, buffers: &mut [ColumnBuffer]) -> SqlReturn {
        let mut state = self.state.lock();
        if !state.stmts.contains_key(&stmt.raw()) {
            return SqlReturn::InvalidHandle;
        }
        state.enter(stmt.raw());

        let cursor = match state.cursor_mut(stmt.raw()) {
            Some(cursor) if !cursor.columns.is_empty() => cursor,
            _ => return state.fail(stmt.raw(), "24000", 0, "invalid cursor state"),
        };
        let row = match cursor.rows.get(cursor.position) {
            Some(row) => row,
            None => return SqlReturn::NoData,
        };
        let mut truncated = false;
        for (buffer, value) in buffers.iter_mut().zip(row) {
            buffer.store(value.as_deref());
            truncated |= buffer.is_truncated();
        }
        cursor.position += 1;

        if truncated {
            state.inform(stmt.raw(), "01004", "string data, right truncated")
        } else {
            SqlReturn::Success
        }
    }

    fn free_stmt(&self, stmt: StmtHandle, option: FreeStmtOption) -> SqlReturn {
        let mut state = self.state.lock();
        if !state.stmts.contains_key(&stmt.raw()) {
            return SqlReturn::InvalidHandle;
        }
        state.enter(stmt.raw());

        match option {
            FreeStmtOption::Drop => {
                state.stmts.remove(&stmt.raw());
            }
            FreeStmtOption::Close => {
                if let Some(statement) = state.stmts.get_mut(&stmt.raw()) {
                    statement.cursor = None;
                }
            }
            FreeStmtOption::Unbind | FreeStmtOption::ResetParams => {}
        }
        SqlReturn::Success
    }

    fn disconnect(&self, dbc: DbcHandle) -> SqlReturn {
        let mut state = self.state.lock();
        let connection = match state.dbcs.get_mut(&dbc.raw()) {
            Some(slot) => slot.connection.take(),
            None => return SqlReturn::InvalidHandle,
        };
        state.enter(dbc.raw());

        match connection {
            Some(connection) => match connection.close() {
                Ok(()) => SqlReturn::Success,
                Err((_, err)) => state.fail_sqlite(dbc.raw(), &err),
            },
            None => state.fail(dbc.raw(), "08003", 0, "connection not open"),
        }
    }

    fn free_connect(&self, dbc: DbcHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if state.dbcs.remove(&dbc.raw()).is_none() {
            return SqlReturn::InvalidHandle;
        }
        state.stmts.retain(|_, s| s.dbc != dbc.raw());
        state.diags.remove(&dbc.raw());
        SqlReturn::Success
    }

    fn free_env(&self, env: EnvHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !state.envs.remove(&env.raw()) {
            return SqlReturn::InvalidHandle;
        }
        state.diags.remove(&env.raw());
        SqlReturn::Success
    }

    fn error(
        &self,
        env: Option<EnvHandle>,
        dbc: Option<DbcHandle>,
        stmt: Option<StmtHandle>,
    ) -> (SqlReturn, Option<DiagRecord>) {
        let mut state = self.state.lock();
        let handle = match (env, dbc, stmt) {
            (_, _, Some(stmt)) if state.stmts.contains_key(&stmt.raw()) => stmt.raw(),
            (_, Some(dbc), None) if state.dbcs.contains_key(&dbc.raw()) => dbc.raw(),
            (Some(env), None, None) if state.envs.contains(&env.raw()) => env.raw(),
            _ => return (SqlReturn::InvalidHandle, None),
        };

        match state.diags.get_mut(&handle).and_then(VecDeque::pop_front) {
            Some(record) => (SqlReturn::Success, Some(record)),
            None => (SqlReturn::NoData, None),
        }
    }
}
