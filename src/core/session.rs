//! Per-connection private state
//!
//! Everything a connection needs behind the client-facing object: the transport, the
//! handle set, the last-error slot and the results of the most recent execution. It is
//! shared with streaming result sets, which fetch through the connection's statement.

use super::config::BridgeConfig;
use super::diagnostics;
use super::error::{ErrorSlot, Result};
use super::fields::FieldDescriptor;
use super::handles::ConnectionHandle;
use super::transport::{SqlReturn, StmtHandle, Transport};
use parking_lot::Mutex;
use std::sync::Arc;

/// Session shared between a connection and its streaming results
pub type SharedSession = Arc<Mutex<Session>>;

/// Affected-row count reported when the transport cannot tell
pub const UNKNOWN_ROW_COUNT: u64 = u64::MAX;

/// Private state of one connection
pub struct Session {
    transport: Arc<dyn Transport>,
    pub(crate) config: BridgeConfig,
    pub(crate) handles: ConnectionHandle,
    pub(crate) errors: ErrorSlot,
    /// Schema of the last execution; written by the executor, taken by result creation
    pub(crate) schema: Option<Vec<FieldDescriptor>>,
    pub(crate) field_count: u32,
    pub(crate) affected_rows: u64,
    /// Bumped whenever the statement is closed or re-executed
    pub(crate) generation: u64,
}

impl Session {
    /// Create a session that has not allocated anything yet
    pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        let errors = ErrorSlot::new(config.max_error_length);
        Self {
            transport,
            config,
            handles: ConnectionHandle::new(),
            errors,
            schema: None,
            field_count: 0,
            affected_rows: 0,
            generation: 0,
        }
    }

    /// Wrap the session for sharing
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn handles(&self) -> &ConnectionHandle {
        &self.handles
    }

    pub fn errors(&self) -> &ErrorSlot {
        &self.errors
    }

    pub fn field_count(&self) -> u32 {
        self.field_count
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Allocate handles and connect with `connection_string`
    ///
    /// A failure leaves partially allocated handles in place for [`Session::close`].
    pub fn connect(&mut self, connection_string: &str) -> Result<()> {
        self.handles.open(self.transport.as_ref(), &mut self.errors)?;
        self.handles
            .connect(self.transport.as_ref(), &mut self.errors, connection_string)?;
        self.affected_rows = UNKNOWN_ROW_COUNT;
        Ok(())
    }

    /// Release all handles and forget the last schema
    pub fn close(&mut self) {
        self.handles.close(self.transport.as_ref());
        self.schema = None;
        self.field_count = 0;
        self.generation += 1;
    }

    /// Statement handle, or a recorded server-lost condition
    pub fn ready(&mut self) -> Result<StmtHandle> {
        self.handles.ready(&mut self.errors)
    }

    /// Classify the return code of a transport call made through this session
    pub fn check(&mut self, rc: SqlReturn, site: &str) -> Result<SqlReturn> {
        diagnostics::check(
            self.transport.as_ref(),
            &mut self.handles,
            &mut self.errors,
            rc,
            site,
        )
    }

    /// Move the last schema out; the session keeps none afterwards
    pub(crate) fn take_schema(&mut self) -> Option<Vec<FieldDescriptor>> {
        self.schema.take()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.handles.close(self.transport.as_ref());
    }
}
