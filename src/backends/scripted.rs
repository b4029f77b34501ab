//! Scripted transport
//!
//! An in-memory [`Transport`] whose results are registered up front per statement text.
//! Every call is journaled, failures can be injected for specific calls, and diagnostic
//! records can be queued directly, which makes the normalization rules observable
//! without a real driver.

use crate::core::transport::{
    AttributeValue, ColumnAttribute, ColumnBuffer, DbcHandle, DiagRecord, EnvHandle,
    FreeStmtOption, SqlReturn, StmtHandle, Transport,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

const DIAG_PREFIX: &str = "[rust_sql_bridge][Scripted]";

/// A journaled transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AllocEnv,
    AllocConnect,
    DriverConnect,
    AllocStmt,
    ExecDirect,
    NumResultCols,
    ColAttribute(u16, ColumnAttribute),
    RowCount,
    BindCol(u16, usize),
    Fetch,
    FreeStmt(FreeStmtOption),
    Disconnect,
    FreeConnect,
    FreeEnv,
    Error,
}

/// Column of a scripted result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedColumn {
    name: String,
    table: String,
    display_size: i64,
}

impl ScriptedColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            display_size: 255,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Reported display size; negative means "unknown or very large"
    pub fn display_size(mut self, size: i64) -> Self {
        self.display_size = size;
        self
    }
}

/// Outcome of executing one scripted statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResult {
    exec_rc: SqlReturn,
    columns: Vec<ScriptedColumn>,
    rows: Vec<Vec<Option<Vec<u8>>>>,
    row_count: i64,
}

impl ScriptedResult {
    /// A row-returning statement with the given columns and no rows yet
    pub fn new(columns: Vec<ScriptedColumn>) -> Self {
        Self {
            exec_rc: SqlReturn::Success,
            columns,
            rows: Vec::new(),
            row_count: -1,
        }
    }

    /// Append a row; `None` is SQL NULL
    pub fn row(mut self, values: Vec<Option<&str>>) -> Self {
        self.rows
            .push(values.into_iter().map(|v| v.map(|s| s.as_bytes().to_vec())).collect());
        self
    }

    /// A statement that executes with "no data" and touches nothing
    pub fn no_data() -> Self {
        Self {
            exec_rc: SqlReturn::NoData,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
        }
    }

    /// A statement without columns that affects `rows` rows
    pub fn update(rows: i64) -> Self {
        Self {
            exec_rc: SqlReturn::Success,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Environment,
    Connection,
    Statement,
}

#[derive(Debug)]
struct Injection {
    call: Call,
    rc: SqlReturn,
    diag: Option<DiagRecord>,
    persistent: bool,
}

#[derive(Debug, Default)]
struct Cursor {
    result: Option<ScriptedResult>,
    position: usize,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    envs: HashSet<u64>,
    dbcs: HashMap<u64, bool>,
    stmts: HashMap<u64, Cursor>,
    calls: Vec<Call>,
    executed: Vec<String>,
    injections: Vec<Injection>,
    env_diags: VecDeque<DiagRecord>,
    dbc_diags: VecDeque<DiagRecord>,
    stmt_diags: VecDeque<DiagRecord>,
    /// An injected `SuccessWithInfo` is waiting for its call to complete
    informational: bool,
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn diags(&mut self, scope: Scope) -> &mut VecDeque<DiagRecord> {
        match scope {
            Scope::Environment => &mut self.env_diags,
            Scope::Connection => &mut self.dbc_diags,
            Scope::Statement => &mut self.stmt_diags,
        }
    }

    /// Journal `call`, reset the diagnostics of its scope and apply any injected failure
    fn enter(&mut self, call: Call, scope: Scope) -> Option<SqlReturn> {
        self.informational = false;
        self.diags(scope).clear();
        let injected = self.injections.iter().position(|i| i.call == call);
        self.calls.push(call);

        let index = injected?;
        let (rc, diag) = if self.injections[index].persistent {
            let injection = &self.injections[index];
            (injection.rc, injection.diag.clone())
        } else {
            let injection = self.injections.remove(index);
            (injection.rc, injection.diag)
        };
        if let Some(diag) = diag {
            self.diags(scope).push_back(diag);
        }
        if rc == SqlReturn::SuccessWithInfo {
            self.informational = true;
            return None;
        }
        Some(rc)
    }

    /// Report a completed call, downgraded to informational when one was injected
    fn finish(&mut self, rc: SqlReturn) -> SqlReturn {
        if std::mem::take(&mut self.informational) && rc == SqlReturn::Success {
            SqlReturn::SuccessWithInfo
        } else {
            rc
        }
    }

    fn fail(&mut self, scope: Scope, sqlstate: &str, message: &str) -> SqlReturn {
        self.diags(scope)
            .push_back(DiagRecord::new(sqlstate, 0, format!("{}{}", DIAG_PREFIX, message)));
        SqlReturn::Error
    }
}

/// In-memory transport driven by registered results
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    results: HashMap<String, ScriptedResult>,
    state: Mutex<State>,
}

impl ScriptedTransport {
    /// A transport on which every statement succeeds without columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outcome of executing exactly `sql`
    pub fn with_result(mut self, sql: impl Into<String>, result: ScriptedResult) -> Self {
        self.results.insert(sql.into(), result);
        self
    }

    /// Fail the next call equal to `call` with `rc`, leaving `diag` on its handle
    ///
    /// `SuccessWithInfo` does not stop the call: it takes effect and then reports the
    /// informational code.
    pub fn fail_next(&self, call: Call, rc: SqlReturn, diag: Option<DiagRecord>) {
        self.inject(call, rc, diag, false);
    }

    /// Fail every call equal to `call` from now on
    pub fn fail_at(&self, call: Call, rc: SqlReturn, diag: Option<DiagRecord>) {
        self.inject(call, rc, diag, true);
    }

    fn inject(&self, call: Call, rc: SqlReturn, diag: Option<DiagRecord>, persistent: bool) {
        self.state.lock().injections.push(Injection {
            call,
            rc,
            diag,
            persistent,
        });
    }

    /// Queue a diagnostic on the statement handle
    pub fn push_statement_diag(&self, diag: DiagRecord) {
        self.state.lock().stmt_diags.push_back(diag);
    }

    /// Queue a diagnostic on the connection handle
    pub fn push_connection_diag(&self, diag: DiagRecord) {
        self.state.lock().dbc_diags.push_back(diag);
    }

    /// Queue a diagnostic on the environment handle
    pub fn push_environment_diag(&self, diag: DiagRecord) {
        self.state.lock().env_diags.push_back(diag);
    }

    /// Diagnostic records not yet read
    pub fn pending_diagnostics(&self) -> usize {
        let state = self.state.lock();
        state.env_diags.len() + state.dbc_diags.len() + state.stmt_diags.len()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Statement texts passed to `exec_direct`, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Handles allocated and not yet freed
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.envs.len() + state.dbcs.len() + state.stmts.len()
    }
}

impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn alloc_env(&self) -> (SqlReturn, Option<EnvHandle>) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::AllocEnv, Scope::Environment) {
            return (rc, None);
        }
        let raw = state.allocate();
        state.envs.insert(raw);
        (state.finish(SqlReturn::Success), Some(EnvHandle::from_raw(raw)))
    }

    fn alloc_connect(&self, env: EnvHandle) -> (SqlReturn, Option<DbcHandle>) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::AllocConnect, Scope::Environment) {
            return (rc, None);
        }
        if !state.envs.contains(&env.raw()) {
            return (SqlReturn::InvalidHandle, None);
        }
        let raw = state.allocate();
        state.dbcs.insert(raw, false);
        (state.finish(SqlReturn::Success), Some(DbcHandle::from_raw(raw)))
    }

    fn driver_connect(&self, dbc: DbcHandle, _connection_string: &str) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::DriverConnect, Scope::Connection) {
            return rc;
        }
        match state.dbcs.get_mut(&dbc.raw()) {
            Some(connected) => {
                *connected = true;
                state.finish(SqlReturn::Success)
            }
            None => SqlReturn::InvalidHandle,
        }
    }

    fn alloc_stmt(&self, dbc: DbcHandle) -> (SqlReturn, Option<StmtHandle>) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::AllocStmt, Scope::Connection) {
            return (rc, None);
        }
        match state.dbcs.get(&dbc.raw()).copied() {
            Some(true) => {}
            Some(false) => {
                return (
                    state.fail(Scope::Connection, "08003", "connection not open"),
                    None,
                )
            }
            None => return (SqlReturn::InvalidHandle, None),
        }
        let raw = state.allocate();
        state.stmts.insert(raw, Cursor::default());
        (state.finish(SqlReturn::Success), Some(StmtHandle::from_raw(raw)))
    }

    fn exec_direct(&self, stmt: StmtHandle, sql: &str) -> SqlReturn {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());
        if let Some(rc) = state.enter(Call::ExecDirect, Scope::Statement) {
            return rc;
        }
        let result = self
            .results
            .get(sql)
            .cloned()
            .unwrap_or_else(|| ScriptedResult::update(0));
        let rc = result.exec_rc;
        match state.stmts.get_mut(&stmt.raw()) {
            Some(cursor) => {
                *cursor = Cursor {
                    result: Some(result),
                    position: 0,
                };
                state.finish(rc)
            }
            None => SqlReturn::InvalidHandle,
        }
    }

    fn num_result_cols(&self, stmt: StmtHandle) -> (SqlReturn, i16) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::NumResultCols, Scope::Statement) {
            return (rc, 0);
        }
        match state.stmts.get(&stmt.raw()) {
            Some(cursor) => {
                let count = cursor.result.as_ref().map_or(0, |r| r.columns.len());
                (state.finish(SqlReturn::Success), count as i16)
            }
            None => (SqlReturn::InvalidHandle, 0),
        }
    }

    fn col_attribute(
        &self,
        stmt: StmtHandle,
        column: u16,
        attribute: ColumnAttribute,
    ) -> (SqlReturn, AttributeValue) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::ColAttribute(column, attribute), Scope::Statement) {
            return (rc, AttributeValue::Empty);
        }
        let described = match state.stmts.get(&stmt.raw()) {
            Some(cursor) => cursor
                .result
                .as_ref()
                .and_then(|r| r.columns.get(usize::from(column).wrapping_sub(1)))
                .cloned(),
            None => return (SqlReturn::InvalidHandle, AttributeValue::Empty),
        };
        let column = match described {
            Some(column) => column,
            None => {
                return (
                    state.fail(Scope::Statement, "07009", "invalid descriptor index"),
                    AttributeValue::Empty,
                )
            }
        };
        let value = match attribute {
            ColumnAttribute::TableName => AttributeValue::Text(column.table),
            ColumnAttribute::Label => AttributeValue::Text(column.name),
            ColumnAttribute::DisplaySize => AttributeValue::Numeric(column.display_size),
        };
        (state.finish(SqlReturn::Success), value)
    }

    fn row_count(&self, stmt: StmtHandle) -> (SqlReturn, i64) {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::RowCount, Scope::Statement) {
            return (rc, 0);
        }
        let count = match state.stmts.get(&stmt.raw()) {
            Some(cursor) => cursor.result.as_ref().map_or(-1, |r| r.row_count),
            None => return (SqlReturn::InvalidHandle, 0),
        };
        (state.finish(SqlReturn::Success), count)
    }

    fn bind_col(&self, stmt: StmtHandle, column: u16, buffer_len: usize) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::BindCol(column, buffer_len), Scope::Statement) {
            return rc;
        }
        if state.stmts.contains_key(&stmt.raw()) {
            state.finish(SqlReturn::Success)
        } else {
            SqlReturn::InvalidHandle
        }
    }

    fn fetch(&self, stmt: StmtHandle, buffers: &mut [ColumnBuffer]) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::Fetch, Scope::Statement) {
            return rc;
        }
        let cursor = match state.stmts.get_mut(&stmt.raw()) {
            Some(cursor) => cursor,
            None => return SqlReturn::InvalidHandle,
        };
        let row = match cursor.result.as_ref().and_then(|r| r.rows.get(cursor.position)) {
            Some(row) => row,
            None => return SqlReturn::NoData,
        };
        for (buffer, value) in buffers.iter_mut().zip(row) {
            buffer.store(value.as_deref());
        }
        cursor.position += 1;
        state.finish(SqlReturn::Success)
    }

    fn free_stmt(&self, stmt: StmtHandle, option: FreeStmtOption) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::FreeStmt(option), Scope::Statement) {
            return rc;
        }
        let exists = state.stmts.contains_key(&stmt.raw());
        match option {
            _ if !exists => SqlReturn::InvalidHandle,
            FreeStmtOption::Drop => {
                state.stmts.remove(&stmt.raw());
                state.finish(SqlReturn::Success)
            }
            FreeStmtOption::Close => {
                if let Some(cursor) = state.stmts.get_mut(&stmt.raw()) {
                    *cursor = Cursor::default();
                }
                state.finish(SqlReturn::Success)
            }
            FreeStmtOption::Unbind | FreeStmtOption::ResetParams => state.finish(SqlReturn::Success),
        }
    }

    fn disconnect(&self, dbc: DbcHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::Disconnect, Scope::Connection) {
            return rc;
        }
        match state.dbcs.get_mut(&dbc.raw()) {
            Some(connected) => {
                *connected = false;
                state.finish(SqlReturn::Success)
            }
            None => SqlReturn::InvalidHandle,
        }
    }

    fn free_connect(&self, dbc: DbcHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::FreeConnect, Scope::Connection) {
            return rc;
        }
        match state.dbcs.remove(&dbc.raw()) {
            Some(_) => state.finish(SqlReturn::Success),
            None => SqlReturn::InvalidHandle,
        }
    }

    fn free_env(&self, env: EnvHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if let Some(rc) = state.enter(Call::FreeEnv, Scope::Environment) {
            return rc;
        }
        if state.envs.remove(&env.raw()) {
            state.finish(SqlReturn::Success)
        } else {
            SqlReturn::InvalidHandle
        }
    }

    fn error(
        &self,
        env: Option<EnvHandle>,
        dbc: Option<DbcHandle>,
        stmt: Option<StmtHandle>,
    ) -> (SqlReturn, Option<DiagRecord>) {
        let mut state = self.state.lock();
        state.calls.push(Call::Error);
        let scope = match (env, dbc, stmt) {
            (_, _, Some(_)) => Scope::Statement,
            (_, Some(_), None) => Scope::Connection,
            (Some(_), None, None) => Scope::Environment,
            (None, None, None) => return (SqlReturn::InvalidHandle, None),
        };
        match state.diags(scope).pop_front() {
            Some(record) => (SqlReturn::Success, Some(record)),
            None => (SqlReturn::NoData, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(transport: &ScriptedTransport) -> (EnvHandle, DbcHandle, StmtHandle) {
        let env = transport.alloc_env().1.expect("env");
        let dbc = transport.alloc_connect(env).1.expect("dbc");
        assert_eq!(transport.driver_connect(dbc, "DSN=x"), SqlReturn::Success);
        let stmt = transport.alloc_stmt(dbc).1.expect("stmt");
        (env, dbc, stmt)
    }

    #[test]
    fn test_registered_result_is_fetched() {
        let transport = ScriptedTransport::new().with_result(
            "SELECT 1",
            ScriptedResult::new(vec![ScriptedColumn::new("one")]).row(vec![Some("1")]),
        );
        let (_, _, stmt) = connected(&transport);

        assert_eq!(transport.exec_direct(stmt, "SELECT 1"), SqlReturn::Success);
        assert_eq!(transport.num_result_cols(stmt), (SqlReturn::Success, 1));
        let mut buffers = vec![ColumnBuffer::with_capacity(8)];
        assert_eq!(transport.fetch(stmt, &mut buffers), SqlReturn::Success);
        assert_eq!(buffers[0].value(), Some(&b"1"[..]));
        assert_eq!(transport.fetch(stmt, &mut buffers), SqlReturn::NoData);
        assert_eq!(transport.executed(), vec!["SELECT 1".to_string()]);
    }

    #[test]
    fn test_one_shot_and_persistent_failures() {
        let transport = ScriptedTransport::new();
        let (_, _, stmt) = connected(&transport);
        transport.fail_next(Call::RowCount, SqlReturn::Error, None);
        transport.fail_at(Call::NumResultCols, SqlReturn::Error, None);

        assert_eq!(transport.row_count(stmt).0, SqlReturn::Error);
        assert_eq!(transport.row_count(stmt).0, SqlReturn::Success);
        assert_eq!(transport.num_result_cols(stmt).0, SqlReturn::Error);
        assert_eq!(transport.num_result_cols(stmt).0, SqlReturn::Error);
    }

    #[test]
    fn test_injected_diag_lands_on_call_scope() {
        let transport = ScriptedTransport::new();
        let (env, dbc, stmt) = connected(&transport);
        transport.fail_next(
            Call::ExecDirect,
            SqlReturn::Error,
            Some(DiagRecord::new("42000", 1, "bad")),
        );
        assert_eq!(transport.exec_direct(stmt, "x"), SqlReturn::Error);

        assert_eq!(transport.error(Some(env), Some(dbc), None), (SqlReturn::NoData, None));
        let (rc, record) = transport.error(Some(env), Some(dbc), Some(stmt));
        assert_eq!(rc, SqlReturn::Success);
        assert_eq!(record.map(|r| r.message), Some("bad".to_string()));
        assert_eq!(transport.pending_diagnostics(), 0);
    }

    #[test]
    fn test_next_call_resets_statement_diagnostics() {
        let transport = ScriptedTransport::new();
        let (_, _, stmt) = connected(&transport);
        transport.push_statement_diag(DiagRecord::new("01000", 0, "stale"));
        transport.exec_direct(stmt, "SELECT 1");
        assert_eq!(transport.pending_diagnostics(), 0);
    }

    #[test]
    fn test_freed_handles_are_invalid() {
        let transport = ScriptedTransport::new();
        let (env, dbc, stmt) = connected(&transport);
        assert_eq!(transport.free_stmt(stmt, FreeStmtOption::Drop), SqlReturn::Success);
        assert_eq!(transport.exec_direct(stmt, "SELECT 1"), SqlReturn::InvalidHandle);
        assert_eq!(transport.disconnect(dbc), SqlReturn::Success);
        assert_eq!(transport.free_connect(dbc), SqlReturn::Success);
        assert_eq!(transport.free_env(env), SqlReturn::Success);
        assert_eq!(transport.live_handles(), 0);
        assert_eq!(transport.free_env(env), SqlReturn::InvalidHandle);
    }

    #[test]
    fn test_statement_needs_connected_dbc() {
        let transport = ScriptedTransport::new();
        let env = transport.alloc_env().1.expect("env");
        let dbc = transport.alloc_connect(env).1.expect("dbc");
        let (rc, stmt) = transport.alloc_stmt(dbc);
        assert_eq!(rc, SqlReturn::Error);
        assert!(stmt.is_none());
        assert_eq!(transport.pending_diagnostics(), 1);
    }
}
