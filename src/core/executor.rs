//! Query execution
//!
//! Runs one statement text on the connection's single statement handle and records the
//! resulting schema and affected-row count on the session.

use super::fields::discover_fields;
use super::error::Result;
use super::session::{Session, UNKNOWN_ROW_COUNT};
use super::transport::{FreeStmtOption, SqlReturn};
use tracing::debug;

impl Session {
    /// Execute `sql` directly
    ///
    /// A statement left open by the previous execution is closed first, which invalidates
    /// any streaming result still reading from it. Parameters must already be part of the
    /// text. Failures of execution or column discovery are returned; a failure to read the
    /// affected-row count is not, the count becomes [`UNKNOWN_ROW_COUNT`] instead.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        let stmt = self.ready()?;
        let transport = self.transport();

        if self.handles.is_prepared() {
            let rc = transport.free_stmt(stmt, FreeStmtOption::Close);
            if !rc.is_success() {
                debug!(rc = %rc, "closing previous statement failed");
            }
            self.handles.set_prepared(false);
        }
        self.handles.set_pending_result(false);
        self.generation += 1;

        let rc = transport.exec_direct(stmt, sql);
        self.check(rc, "SQLExecDirect")?;
        self.handles.set_prepared(true);
        let has_data = rc != SqlReturn::NoData;

        let mut column_count = 0u16;
        if has_data {
            let (rc, columns) = transport.num_result_cols(stmt);
            self.check(rc, "SQLNumResultCols")?;
            column_count = u16::try_from(columns).unwrap_or(0);
        }

        self.schema = None;
        self.field_count = 0;
        if column_count > 0 {
            let fields = discover_fields(
                transport.as_ref(),
                &mut self.handles,
                &mut self.errors,
                &self.config,
                stmt,
                column_count,
            )?;
            self.field_count = fields.len() as u32;
            self.schema = Some(fields);
            self.handles.set_pending_result(true);
        }

        let (rc, count) = transport.row_count(stmt);
        self.affected_rows = match self.check(rc, "SQLRowCount") {
            Ok(_) => count as u64,
            Err(_) => UNKNOWN_ROW_COUNT,
        };

        debug!(
            columns = self.field_count,
            affected_rows = self.affected_rows,
            "statement executed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::{Call, ScriptedColumn, ScriptedResult, ScriptedTransport};
    use crate::core::config::BridgeConfig;
    use crate::core::error::{BridgeError, CR_BRIDGE_ERROR};
    use crate::core::transport::DiagRecord;
    use std::sync::Arc;

    fn session(transport: &Arc<ScriptedTransport>) -> Session {
        let mut session = Session::new(transport.clone(), BridgeConfig::default());
        session.connect("DSN=test").expect("connect");
        session
    }

    #[test]
    fn test_execute_requires_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut session = Session::new(transport.clone(), BridgeConfig::default());
        assert_eq!(session.execute("SELECT 1"), Err(BridgeError::ServerLost));
        assert!(!transport.calls().contains(&Call::ExecDirect));
    }

    #[test]
    fn test_row_returning_statement() {
        let transport = Arc::new(ScriptedTransport::new().with_result(
            "SELECT a FROM t",
            ScriptedResult::new(vec![ScriptedColumn::new("a")]).row(vec![Some("1")]),
        ));
        let mut session = session(&transport);

        session.execute("SELECT a FROM t").expect("execute");
        assert_eq!(session.field_count(), 1);
        assert!(session.handles().has_pending_result());
        assert!(session.handles().is_prepared());
        assert_eq!(session.take_schema().map(|s| s.len()), Some(1));
        assert!(session.take_schema().is_none());
    }

    #[test]
    fn test_previous_statement_closed_before_next() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut session = session(&transport);
        session.execute("UPDATE t SET a = 1").expect("first");
        session.execute("UPDATE t SET a = 2").expect("second");

        let closes = transport
            .calls()
            .iter()
            .filter(|c| **c == Call::FreeStmt(FreeStmtOption::Close))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_no_data_skips_discovery() {
        let transport = Arc::new(
            ScriptedTransport::new().with_result("DELETE FROM t WHERE 0=1", ScriptedResult::no_data()),
        );
        let mut session = session(&transport);
        session.execute("DELETE FROM t WHERE 0=1").expect("execute");

        assert_eq!(session.field_count(), 0);
        assert_eq!(session.affected_rows(), 0);
        assert!(!session.handles().has_pending_result());
        assert!(!transport.calls().contains(&Call::NumResultCols));
    }

    #[test]
    fn test_failed_execute_keeps_previous_schema() {
        let transport = Arc::new(ScriptedTransport::new().with_result(
            "SELECT a FROM t",
            ScriptedResult::new(vec![ScriptedColumn::new("a")]),
        ));
        let mut session = session(&transport);
        session.execute("SELECT a FROM t").expect("execute");

        transport.fail_next(
            Call::ExecDirect,
            SqlReturn::Error,
            Some(DiagRecord::new("42000", 1064, "[V][D] syntax error")),
        );
        let err = session.execute("SELEC").expect_err("fails");
        assert_eq!(err.code(), CR_BRIDGE_ERROR);
        assert_eq!(session.errors().message(), "syntax error");
        assert_eq!(session.field_count(), 1);
        assert!(session.schema.is_some());
    }

    #[test]
    fn test_row_count_failure_is_soft() {
        let transport = Arc::new(ScriptedTransport::new().with_result(
            "UPDATE t SET a = 1",
            ScriptedResult::update(3),
        ));
        let mut session = session(&transport);
        transport.fail_next(
            Call::RowCount,
            SqlReturn::Error,
            Some(DiagRecord::new("HY010", 0, "[V][D] function sequence error")),
        );

        assert!(session.execute("UPDATE t SET a = 1").is_ok());
        assert_eq!(session.affected_rows(), UNKNOWN_ROW_COUNT);
        // the diagnostic of the failed count read stays visible
        assert_eq!(session.errors().code(), CR_BRIDGE_ERROR);
    }

    #[test]
    fn test_affected_rows_reported() {
        let transport = Arc::new(ScriptedTransport::new().with_result(
            "UPDATE t SET a = 1",
            ScriptedResult::update(3),
        ));
        let mut session = session(&transport);
        session.execute("UPDATE t SET a = 1").expect("execute");
        assert_eq!(session.affected_rows(), 3);
        assert_eq!(session.errors().code(), 0);
    }
}
