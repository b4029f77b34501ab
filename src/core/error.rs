//! Error types for the bridge
//!
//! Every failure the bridge can report collapses into one of four taxonomy members, each
//! carrying the numeric code the client API exposes through `errno()`.

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Client error code: unknown error
pub const CR_UNKNOWN_ERROR: u32 = 2000;
/// Client error code: out of memory
pub const CR_OUT_OF_MEMORY: u32 = 2008;
/// Client error code: server has gone away
pub const CR_SERVER_LOST: u32 = 2013;
/// Client error code: the transport reported a structured error
pub const CR_BRIDGE_ERROR: u32 = 9999;

/// Size of the client API's error message buffer, terminator included
pub const ERRMSG_SIZE: usize = 200;

/// Message used when the transport fails without leaving a diagnostic record
pub const MISSING_DIAGNOSTICS: &str = "transport reported an error without diagnostics";

/// Error types for bridge operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// An allocation failed at some layer
    #[error("MySQL client run out of memory")]
    OutOfMemory,

    /// The handle is invalid or the connection was never established
    #[error("MySQL server has gone away")]
    ServerLost,

    /// The transport reported an error; the message is the cleaned diagnostic text
    #[error("{message}")]
    Bridge { message: String },

    /// The transport returned a code the bridge does not recognize
    #[error("Unknown MySQL error")]
    Unknown,
}

impl BridgeError {
    /// Create an out-of-memory error
    pub fn out_of_memory() -> Self {
        BridgeError::OutOfMemory
    }

    /// Create a server-lost error
    pub fn server_lost() -> Self {
        BridgeError::ServerLost
    }

    /// Create a bridge error from a harvested diagnostic message
    pub fn bridge<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        if message.is_empty() {
            return BridgeError::Bridge {
                message: MISSING_DIAGNOSTICS.to_string(),
            };
        }
        BridgeError::Bridge { message }
    }

    /// Create an unknown error
    pub fn unknown() -> Self {
        BridgeError::Unknown
    }

    /// Numeric code reported by `errno()`
    pub fn code(&self) -> u32 {
        match self {
            BridgeError::OutOfMemory => CR_OUT_OF_MEMORY,
            BridgeError::ServerLost => CR_SERVER_LOST,
            BridgeError::Bridge { .. } => CR_BRIDGE_ERROR,
            BridgeError::Unknown => CR_UNKNOWN_ERROR,
        }
    }
}

/// The connection's single last-error slot
///
/// There is no history: every recorded error replaces the previous one.
#[derive(Debug, Clone)]
pub struct ErrorSlot {
    code: u32,
    message: String,
    capacity: usize,
}

impl ErrorSlot {
    /// Create an empty slot whose messages fit a buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            code: 0,
            message: String::new(),
            capacity: capacity.max(1),
        }
    }

    /// Last error code, 0 when the last operation succeeded
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Last error message, empty when the last operation succeeded
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Overwrite the slot with `err`
    pub fn record(&mut self, err: &BridgeError) {
        self.code = err.code();
        self.message = truncate_message(&err.to_string(), self.capacity - 1);
    }

    /// Reset the slot to "no error"
    pub fn clear(&mut self) {
        self.code = 0;
        self.message.clear();
    }
}

impl Default for ErrorSlot {
    fn default() -> Self {
        Self::new(ERRMSG_SIZE)
    }
}

fn truncate_message(message: &str, max: usize) -> String {
    if message.len() <= max {
        return message.to_string();
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BridgeError::out_of_memory().code(), 2008);
        assert_eq!(BridgeError::server_lost().code(), 2013);
        assert_eq!(BridgeError::bridge("boom").code(), 9999);
        assert_eq!(BridgeError::unknown().code(), 2000);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::server_lost().to_string(),
            "MySQL server has gone away"
        );
        assert_eq!(
            BridgeError::bridge("no such table: t").to_string(),
            "no such table: t"
        );
        assert_eq!(BridgeError::bridge("").to_string(), MISSING_DIAGNOSTICS);
    }

    #[test]
    fn test_slot_overwrites() {
        let mut slot = ErrorSlot::default();
        assert_eq!(slot.code(), 0);
        assert!(slot.message().is_empty());

        slot.record(&BridgeError::server_lost());
        slot.record(&BridgeError::bridge("second"));
        assert_eq!(slot.code(), CR_BRIDGE_ERROR);
        assert_eq!(slot.message(), "second");

        slot.clear();
        assert_eq!(slot.code(), 0);
        assert!(slot.message().is_empty());
    }

    #[test]
    fn test_slot_truncates_on_char_boundary() {
        let mut slot = ErrorSlot::new(6);
        slot.record(&BridgeError::bridge("abcé-long"));
        // five bytes available, 'é' spans bytes 3..5
        assert_eq!(slot.message(), "abcé");

        let mut slot = ErrorSlot::new(5);
        slot.record(&BridgeError::bridge("abcé-long"));
        assert_eq!(slot.message(), "abc");
    }
}
