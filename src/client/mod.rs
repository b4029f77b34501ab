//! Client API façade
//!
//! The connection object application code talks to, the connect parameters it is built
//! from, and the compatibility entry points that are present but not provided.

pub mod builder;
pub mod connection;
pub mod unsupported;

pub use builder::ConnectionBuilder;
pub use connection::Connection;
