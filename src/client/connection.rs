//! Client-facing connection object
//!
//! [`Connection`] is the entry point application code is written against. It owns the
//! per-connection session, translates connect parameters into a transport connection
//! string, and forwards queries and result retrieval to the core. Every operation that can
//! fail returns a `Result` and also leaves its outcome in the connection's error slot, so
//! callers may use either `?` or the `errno`/`error` accessors.

use super::builder::ConnectionBuilder;
use crate::core::config::BridgeConfig;
use crate::core::error::Result;
use crate::core::result::ResultSet;
use crate::core::session::{Session, SharedSession};
use crate::core::transport::Transport;
use std::sync::Arc;
use tracing::{debug, trace};

/// One client connection
pub struct Connection {
    session: SharedSession,
    params: Option<ConnectionBuilder>,
}

impl Connection {
    /// Create an unconnected connection on `transport` with the default configuration
    pub fn init(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, BridgeConfig::default())
    }

    /// Create an unconnected connection on `transport`
    pub fn with_config(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        trace!(driver = transport.name(), "init");
        Self {
            session: Session::new(transport, config).shared(),
            params: None,
        }
    }

    /// Connect with the full parameter set
    ///
    /// Only `db`, `user` and `password` are used to reach the server; the rest is recorded
    /// for the metadata accessors.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &mut self,
        host: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
        db: Option<&str>,
        port: u32,
        unix_socket: Option<&str>,
        flags: u32,
    ) -> Result<()> {
        trace!("real_connect");
        let mut params = ConnectionBuilder::new().port(port).flags(flags);
        if let Some(host) = host {
            params = params.host(host);
        }
        if let Some(user) = user {
            params = params.username(user);
        }
        if let Some(password) = password {
            params = params.password(password);
        }
        if let Some(db) = db {
            params = params.database(db);
        }
        if let Some(path) = unix_socket {
            params = params.unix_socket(path);
        }
        self.connect_with(params)
    }

    /// Connect without selecting a database
    pub fn connect_simple(
        &mut self,
        host: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        trace!("connect");
        self.connect(host, user, password, None, 0, None, 0)
    }

    /// Connect with a prepared parameter set
    ///
    /// An existing session is torn down first. On failure everything allocated on the
    /// way is released and the error stays readable through [`Connection::errno`].
    pub fn connect_with(&mut self, params: ConnectionBuilder) -> Result<()> {
        let mut session = self.session.lock();
        if session.handles().is_open() {
            debug!("reconnecting, closing previous session");
            session.close();
        }
        self.params = None;

        let connection_string = params.build_connection_string(session.config());
        match session.connect(&connection_string) {
            Ok(()) => {
                debug!(database = ?params.database_name(), "connected");
                self.params = Some(params);
                Ok(())
            }
            Err(err) => {
                session.close();
                Err(err)
            }
        }
    }

    /// Release all transport resources; calling it again does nothing
    pub fn close(&mut self) {
        trace!("close");
        self.session.lock().close();
        self.params = None;
    }

    /// Execute `sql`
    pub fn query(&mut self, sql: &str) -> Result<()> {
        trace!("query");
        self.session.lock().execute(sql)
    }

    /// Execute the first `length` bytes of `sql`
    ///
    /// A length past the end of the text uses all of it; a cut inside a multi-byte
    /// character moves back to the preceding character boundary.
    pub fn real_query(&mut self, sql: &str, length: usize) -> Result<()> {
        trace!(length, "real_query");
        let mut end = length.min(sql.len());
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        self.session.lock().execute(&sql[..end])
    }

    /// Accepted for compatibility; does nothing and reports success
    pub fn send_query(&mut self, _sql: &str, _length: usize) -> i32 {
        trace!("send_query");
        0
    }

    /// Accepted for compatibility; does nothing and reports success
    pub fn read_query_result(&mut self) -> i32 {
        trace!("read_query_result");
        0
    }

    /// Stream the rows of the last statement
    ///
    /// `Ok(None)` when the statement produced no columns. The result reads through this
    /// connection's statement: the next query ends it.
    pub fn use_result(&self) -> Result<Option<ResultSet>> {
        trace!("use_result");
        ResultSet::streaming(&self.session)
    }

    /// Read all rows of the last statement into memory
    ///
    /// `Ok(None)` when the statement produced no columns.
    pub fn store_result(&self) -> Result<Option<ResultSet>> {
        trace!("store_result");
        ResultSet::buffered(&self.session)
    }

    /// Code of the last operation's outcome, 0 for success
    pub fn errno(&self) -> u32 {
        self.session.lock().errors().code()
    }

    /// Message of the last operation's outcome, empty for success
    pub fn error(&self) -> String {
        self.session.lock().errors().message().to_string()
    }

    /// Rows affected by the last statement; `u64::MAX` when unknown
    pub fn affected_rows(&self) -> u64 {
        trace!("affected_rows");
        self.session.lock().affected_rows()
    }

    /// Columns produced by the last statement
    pub fn field_count(&self) -> u32 {
        trace!("field_count");
        self.session.lock().field_count()
    }

    /// Generated keys are not tracked
    pub fn insert_id(&self) -> u64 {
        trace!("insert_id");
        0
    }

    /// Statement summaries are not produced
    pub fn info(&self) -> Option<&str> {
        None
    }

    pub fn server_info(&self) -> Option<String> {
        self.connected_config(|config| config.server_version.clone())
    }

    pub fn host_info(&self) -> Option<String> {
        self.connected_config(|config| config.host_info.clone())
    }

    pub fn proto_info(&self) -> Option<u32> {
        self.connected_config(|config| config.protocol_version)
    }

    pub fn thread_id(&self) -> Option<u64> {
        self.connected_config(|config| config.thread_id)
    }

    pub fn character_set_name(&self) -> String {
        self.session.lock().config().character_set.clone()
    }

    /// Version of the client library being emulated
    pub fn client_info(&self) -> String {
        self.session.lock().config().client_version.clone()
    }

    /// The client library may be used from several threads
    pub fn thread_safe() -> u32 {
        1
    }

    pub fn host(&self) -> Option<&str> {
        self.params.as_ref().and_then(ConnectionBuilder::host_name)
    }

    pub fn user(&self) -> Option<&str> {
        self.params.as_ref().and_then(ConnectionBuilder::user_name)
    }

    pub fn db(&self) -> Option<&str> {
        self.params.as_ref().and_then(ConnectionBuilder::database_name)
    }

    pub fn port(&self) -> Option<u32> {
        self.params.as_ref().map(ConnectionBuilder::port_number)
    }

    pub fn unix_socket(&self) -> Option<&str> {
        self.params.as_ref().and_then(ConnectionBuilder::socket_path)
    }

    pub fn client_flags(&self) -> Option<u32> {
        self.params.as_ref().map(ConnectionBuilder::client_flags)
    }

    /// True while the session holds a live connection
    pub fn is_connected(&self) -> bool {
        self.session.lock().handles().is_connected()
    }

    fn connected_config<T>(&self, read: impl FnOnce(&BridgeConfig) -> T) -> Option<T> {
        self.params.as_ref()?;
        Some(read(self.session.lock().config()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.session.lock().close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::{Call, ScriptedColumn, ScriptedResult, ScriptedTransport};
    use crate::core::error::{BridgeError, CR_BRIDGE_ERROR, CR_SERVER_LOST};
    use crate::core::transport::{DiagRecord, SqlReturn};

    fn transport() -> Arc<ScriptedTransport> {
        Arc::new(
            ScriptedTransport::new()
                .with_result(
                    "SELECT 1 AS one",
                    ScriptedResult::new(vec![ScriptedColumn::new("one").display_size(20)])
                        .row(vec![Some("1")]),
                )
                .with_result("DELETE FROM t WHERE 0=1", ScriptedResult::no_data()),
        )
    }

    fn connected(transport: &Arc<ScriptedTransport>) -> Connection {
        let mut conn = Connection::init(transport.clone());
        conn.connect(Some("localhost"), Some("user"), Some("pw"), Some("test"), 3306, None, 0)
            .expect("connect");
        conn
    }

    #[test]
    fn test_connect_records_parameters() {
        let transport = transport();
        let conn = connected(&transport);

        assert!(conn.is_connected());
        assert_eq!(conn.host(), Some("localhost"));
        assert_eq!(conn.user(), Some("user"));
        assert_eq!(conn.db(), Some("test"));
        assert_eq!(conn.port(), Some(3306));
        assert_eq!(conn.server_info().as_deref(), Some("3.23.49-iodbc"));
        assert_eq!(conn.host_info().as_deref(), Some("localhost via TCP/IP"));
        assert_eq!(conn.proto_info(), Some(10));
        assert_eq!(conn.thread_id(), Some(100));
        assert_eq!(conn.affected_rows(), u64::MAX);
        assert_eq!(conn.errno(), 0);
    }

    #[test]
    fn test_metadata_before_connect() {
        let conn = Connection::init(transport());
        assert!(conn.server_info().is_none());
        assert!(conn.thread_id().is_none());
        assert_eq!(conn.character_set_name(), "latin1");
        assert_eq!(conn.client_info(), "3.23.49");
        assert_eq!(Connection::thread_safe(), 1);
    }

    #[test]
    fn test_query_before_connect_is_server_lost() {
        let mut conn = Connection::init(transport());
        assert_eq!(conn.query("SELECT 1 AS one"), Err(BridgeError::ServerLost));
        assert_eq!(conn.errno(), CR_SERVER_LOST);
        assert_eq!(conn.error(), "MySQL server has gone away");
        assert!(conn.store_result().is_err());
    }

    #[test]
    fn test_failed_connect_releases_everything() {
        let transport = transport();
        transport.fail_next(
            Call::DriverConnect,
            SqlReturn::Error,
            Some(DiagRecord::new("IM002", 0, "[Manager][Driver] Data source not found")),
        );
        let mut conn = Connection::init(transport.clone());

        let err = conn
            .connect(None, None, None, Some("missing"), 0, None, 0)
            .expect_err("connect fails");
        assert_eq!(err.code(), CR_BRIDGE_ERROR);
        assert_eq!(conn.error(), "Data source not found");
        assert_eq!(transport.live_handles(), 0);
        assert!(!conn.is_connected());
        assert!(conn.db().is_none());
    }

    #[test]
    fn test_reconnect_tears_down_previous_session() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.connect_simple(Some("localhost"), Some("other"), None)
            .expect("reconnect");

        assert_eq!(transport.live_handles(), 3);
        assert_eq!(conn.user(), Some("other"));
        assert!(conn.db().is_none());
    }

    #[test]
    fn test_close_twice_and_drop() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.close();
        let calls = transport.calls().len();
        conn.close();
        assert_eq!(transport.calls().len(), calls);
        assert_eq!(transport.live_handles(), 0);
        drop(conn);
        assert_eq!(transport.calls().len(), calls);
    }

    #[test]
    fn test_drop_releases_handles() {
        let transport = transport();
        {
            let _conn = connected(&transport);
            assert_eq!(transport.live_handles(), 3);
        }
        assert_eq!(transport.live_handles(), 0);
    }

    #[test]
    fn test_store_select_one() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.query("SELECT 1 AS one").expect("query");
        assert_eq!(conn.field_count(), 1);

        let mut result = conn.store_result().expect("store").expect("rows");
        assert_eq!(result.fetch_fields()[0].name, "one");
        assert_eq!(result.num_rows(), 1);
        assert_eq!(result.fetch_row().map(|r| r.to_strings()), Some(vec![Some("1".to_string())]));
        assert!(result.fetch_row().is_none());
        result.free_result();
    }

    #[test]
    fn test_no_data_statement() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.query("DELETE FROM t WHERE 0=1").expect("query");
        assert!(conn.use_result().expect("use").is_none());
        assert_eq!(conn.field_count(), 0);
        assert_eq!(conn.affected_rows(), 0);
        assert_eq!(conn.errno(), 0);
    }

    #[test]
    fn test_real_query_uses_prefix() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.real_query("SELECT 1 AS one; DROP TABLE t", 15).expect("query");
        assert_eq!(transport.executed(), vec!["SELECT 1 AS one".to_string()]);

        conn.real_query("SELECT 'é'", 9).expect("query");
        assert_eq!(transport.executed().last().map(String::as_str), Some("SELECT '"));
        conn.real_query("SELECT 2", 100).expect("query");
        assert_eq!(transport.executed().last().map(String::as_str), Some("SELECT 2"));
    }

    #[test]
    fn test_deferred_query_calls_are_noops() {
        let transport = transport();
        let mut conn = connected(&transport);
        let calls = transport.calls().len();
        assert_eq!(conn.send_query("SELECT 1 AS one", 15), 0);
        assert_eq!(conn.read_query_result(), 0);
        assert_eq!(transport.calls().len(), calls);
        assert_eq!(conn.insert_id(), 0);
        assert!(conn.info().is_none());
    }

    #[test]
    fn test_result_outlives_connection_close() {
        let transport = transport();
        let mut conn = connected(&transport);
        conn.query("SELECT 1 AS one").expect("query");
        let mut stored = conn.store_result().expect("store").expect("rows");
        conn.query("SELECT 1 AS one").expect("query");
        let mut streamed = conn.use_result().expect("use").expect("rows");
        conn.close();

        assert!(stored.fetch_row().is_some());
        assert!(streamed.fetch_row().is_none());
        assert_eq!(conn.errno(), CR_SERVER_LOST);
    }
}
