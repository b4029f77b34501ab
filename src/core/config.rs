//! Bridge configuration
//!
//! Identity strings reported to client code and the sizing constants used when building
//! result buffers. Loadable from JSON so deployments can override what the bridge claims
//! to be without recompiling.

use serde::{Deserialize, Serialize};

/// Configuration for a bridged connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Data source used when the caller does not name a database
    pub default_data_source: String,
    /// Reported by `server_info()`
    pub server_version: String,
    /// Reported by `Connection::client_info()`
    pub client_version: String,
    /// Reported by `host_info()`
    pub host_info: String,
    /// Reported by `proto_info()`
    pub protocol_version: u32,
    /// Reported by `thread_id()`
    pub thread_id: u64,
    /// Reported by `character_set_name()`
    pub character_set: String,
    /// Extra bytes added to each column's display length when sizing row buffers
    pub buffer_slack: u32,
    /// Width substituted for columns whose display size is negative or unavailable
    pub large_column_width: u32,
    /// Size of the error message buffer, terminator included
    pub max_error_length: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_data_source: "mysql".to_string(),
            server_version: "3.23.49-iodbc".to_string(),
            client_version: "3.23.49".to_string(),
            host_info: "localhost via TCP/IP".to_string(),
            protocol_version: 10,
            thread_id: 100,
            character_set: "latin1".to_string(),
            buffer_slack: 32,
            large_column_width: 65500,
            max_error_length: super::error::ERRMSG_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Set the data source used when no database is given
    pub fn with_default_data_source(mut self, dsn: impl Into<String>) -> Self {
        self.default_data_source = dsn.into();
        self
    }

    /// Set the reported server version
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// Set the reported host description
    pub fn with_host_info(mut self, info: impl Into<String>) -> Self {
        self.host_info = info.into();
        self
    }

    /// Set the per-column buffer slack
    pub fn with_buffer_slack(mut self, slack: u32) -> Self {
        self.buffer_slack = slack;
        self
    }

    /// Set the width used for columns of unknown display size
    pub fn with_large_column_width(mut self, width: u32) -> Self {
        self.large_column_width = width;
        self
    }

    /// Set the error message buffer size
    pub fn with_max_error_length(mut self, len: usize) -> Self {
        self.max_error_length = len;
        self
    }
}
