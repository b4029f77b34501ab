//! Handle lifecycle management
//!
//! A connection owns exactly one environment, one connection and one statement handle.
//! They are acquired in that order and released in the reverse order, and a query may
//! only run once all three exist and the connection is established.

use super::diagnostics;
use super::error::{BridgeError, ErrorSlot, Result};
use super::transport::{DbcHandle, EnvHandle, FreeStmtOption, SqlReturn, StmtHandle, Transport};
use tracing::warn;

/// Transport handles and state flags of one connection
#[derive(Debug, Default)]
pub struct ConnectionHandle {
    env: Option<EnvHandle>,
    dbc: Option<DbcHandle>,
    stmt: Option<StmtHandle>,
    connected: bool,
    has_pending_result: bool,
    prepared: bool,
}

impl ConnectionHandle {
    /// Create an empty handle set; nothing is allocated yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the environment and connection handles
    ///
    /// On failure everything allocated so far is released again and an out-of-memory
    /// condition is recorded.
    pub fn open(&mut self, transport: &dyn Transport, slot: &mut ErrorSlot) -> Result<()> {
        if self.env.is_some() {
            return Ok(());
        }

        let env = match transport.alloc_env() {
            (rc, Some(env)) if rc.is_success() => env,
            _ => return Err(out_of_memory(slot)),
        };

        let dbc = match transport.alloc_connect(env) {
            (rc, Some(dbc)) if rc.is_success() => dbc,
            _ => {
                release(transport, transport.free_env(env), "free_env");
                return Err(out_of_memory(slot));
            }
        };

        self.env = Some(env);
        self.dbc = Some(dbc);
        slot.clear();
        Ok(())
    }

    /// Connect with `connection_string` and allocate the statement handle
    ///
    /// Nothing is released on failure; the caller tears the whole set down with
    /// [`ConnectionHandle::close`].
    pub fn connect(
        &mut self,
        transport: &dyn Transport,
        slot: &mut ErrorSlot,
        connection_string: &str,
    ) -> Result<()> {
        let dbc = match self.dbc {
            Some(dbc) => dbc,
            None => {
                let err = BridgeError::server_lost();
                slot.record(&err);
                return Err(err);
            }
        };

        let rc = transport.driver_connect(dbc, connection_string);
        diagnostics::check(transport, self, slot, rc, "SQLDriverConnect")?;
        self.connected = true;

        let (rc, stmt) = transport.alloc_stmt(dbc);
        diagnostics::check(transport, self, slot, rc, "SQLAllocStmt")?;
        match stmt {
            Some(stmt) => {
                self.stmt = Some(stmt);
                Ok(())
            }
            None => Err(out_of_memory(slot)),
        }
    }

    /// Release everything in reverse acquisition order
    ///
    /// Idempotent. Transport failures during teardown are logged and dropped.
    pub fn close(&mut self, transport: &dyn Transport) {
        if let Some(stmt) = self.stmt.take() {
            release(transport, transport.free_stmt(stmt, FreeStmtOption::Drop), "free_stmt");
        }
        if self.connected {
            if let Some(dbc) = self.dbc {
                release(transport, transport.disconnect(dbc), "disconnect");
            }
        }
        if let Some(dbc) = self.dbc.take() {
            release(transport, transport.free_connect(dbc), "free_connect");
        }
        if let Some(env) = self.env.take() {
            release(transport, transport.free_env(env), "free_env");
        }

        self.connected = false;
        self.has_pending_result = false;
        self.prepared = false;
    }

    /// Statement handle of a connected session
    ///
    /// Clears `slot` on success; records a server-lost condition otherwise.
    pub fn ready(&self, slot: &mut ErrorSlot) -> Result<StmtHandle> {
        match self.stmt {
            Some(stmt) if self.connected => {
                slot.clear();
                Ok(stmt)
            }
            _ => {
                let err = BridgeError::server_lost();
                slot.record(&err);
                Err(err)
            }
        }
    }

    pub fn env(&self) -> Option<EnvHandle> {
        self.env
    }

    pub fn dbc(&self) -> Option<DbcHandle> {
        self.dbc
    }

    pub fn statement(&self) -> Option<StmtHandle> {
        self.stmt
    }

    /// True once at least the environment handle exists
    pub fn is_open(&self) -> bool {
        self.env.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The last execution produced a result that has not been retrieved yet
    pub fn has_pending_result(&self) -> bool {
        self.has_pending_result
    }

    /// The statement was executed and not closed since
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub(crate) fn set_pending_result(&mut self, pending: bool) {
        self.has_pending_result = pending;
    }

    pub(crate) fn set_prepared(&mut self, prepared: bool) {
        self.prepared = prepared;
    }
}

fn out_of_memory(slot: &mut ErrorSlot) -> BridgeError {
    let err = BridgeError::out_of_memory();
    slot.record(&err);
    err
}

fn release(transport: &dyn Transport, rc: SqlReturn, call: &str) {
    if !rc.is_success() {
        warn!(driver = transport.name(), call, rc = %rc, "ignoring teardown failure");
    }
}
