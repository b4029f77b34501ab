//! Connection parameters and connection-string construction

use crate::core::config::BridgeConfig;

/// Parameters of one connect call
///
/// Only the database name, user and password reach the transport; host, port, socket and
/// flags are kept for the metadata accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionBuilder {
    host: Option<String>,
    port: u32,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    unix_socket: Option<String>,
    flags: u32,
}

impl ConnectionBuilder {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u32) -> Self {
        self.port = port;
        self
    }

    /// Set the database name; it becomes the data source name
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the local socket path
    pub fn unix_socket<S: Into<String>>(mut self, path: S) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    /// Set the client flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port_number(&self) -> u32 {
        self.port
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn socket_path(&self) -> Option<&str> {
        self.unix_socket.as_deref()
    }

    pub fn client_flags(&self) -> u32 {
        self.flags
    }

    /// Build the transport connection string
    ///
    /// `DSN=<database>;UID=<user>;PWD=<password>`, where an absent or empty database falls
    /// back to the configured default data source. Values are inserted verbatim: a `;` in
    /// any of them changes the meaning of the string.
    pub fn build_connection_string(&self, config: &BridgeConfig) -> String {
        let dsn = match self.database.as_deref() {
            Some(db) if !db.is_empty() => db,
            _ => config.default_data_source.as_str(),
        };
        format!(
            "DSN={};UID={};PWD={}",
            dsn,
            self.username.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_full() {
        let builder = ConnectionBuilder::new()
            .host("db.example.com")
            .port(3306)
            .database("test")
            .username("user")
            .password("pass");

        assert_eq!(
            builder.build_connection_string(&BridgeConfig::default()),
            "DSN=test;UID=user;PWD=pass"
        );
        assert_eq!(builder.host_name(), Some("db.example.com"));
        assert_eq!(builder.port_number(), 3306);
    }

    #[test]
    fn test_connection_string_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(
            ConnectionBuilder::new().build_connection_string(&config),
            "DSN=mysql;UID=;PWD="
        );
        assert_eq!(
            ConnectionBuilder::new()
                .database("")
                .build_connection_string(&config.with_default_data_source("warehouse")),
            "DSN=warehouse;UID=;PWD="
        );
    }

    #[test]
    fn test_connection_string_is_not_escaped() {
        let builder = ConnectionBuilder::new().password("a;DSN=other");
        assert_eq!(
            builder.build_connection_string(&BridgeConfig::default()),
            "DSN=mysql;UID=;PWD=a;DSN=other"
        );
    }
}
