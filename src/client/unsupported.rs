//! Client calls that are accepted but not provided
//!
//! Each returns a fixed "not supported" value and leaves the connection untouched: no
//! transport call is made and the error slot keeps its previous contents.

use super::connection::Connection;
use crate::core::result::ResultSet;
use tracing::trace;

impl Connection {
    pub fn list_dbs(&self, _wild: Option<&str>) -> Option<ResultSet> {
        trace!("list_dbs unsupported");
        None
    }

    pub fn list_tables(&self, _wild: Option<&str>) -> Option<ResultSet> {
        trace!("list_tables unsupported");
        None
    }

    pub fn list_fields(&self, _table: &str, _wild: Option<&str>) -> Option<ResultSet> {
        trace!("list_fields unsupported");
        None
    }

    pub fn list_processes(&self) -> Option<ResultSet> {
        trace!("list_processes unsupported");
        None
    }

    /// Always fails with -1
    pub fn select_db(&mut self, _db: &str) -> i32 {
        trace!("select_db unsupported");
        -1
    }

    /// Always fails with -1
    pub fn create_db(&mut self, _db: &str) -> i32 {
        trace!("create_db unsupported");
        -1
    }

    /// Always fails with -1
    pub fn drop_db(&mut self, _db: &str) -> i32 {
        trace!("drop_db unsupported");
        -1
    }

    pub fn shutdown(&mut self) -> i32 {
        trace!("shutdown unsupported");
        0
    }

    pub fn refresh(&mut self, _options: u32) -> i32 {
        trace!("refresh unsupported");
        0
    }

    pub fn kill(&mut self, _pid: u64) -> i32 {
        trace!("kill unsupported");
        0
    }

    /// Does not contact the server
    pub fn ping(&mut self) -> i32 {
        trace!("ping unsupported");
        0
    }

    pub fn dump_debug_info(&mut self) -> i32 {
        trace!("dump_debug_info unsupported");
        0
    }

    pub fn options(&mut self, _option: u32, _arg: Option<&str>) -> i32 {
        trace!("options unsupported");
        0
    }

    pub fn stat(&self) -> Option<String> {
        trace!("stat unsupported");
        None
    }

    /// Always refuses
    pub fn change_user(&mut self, _user: &str, _password: &str, _db: Option<&str>) -> bool {
        trace!("change_user unsupported");
        false
    }

    /// Writes nothing into `to` and returns 0
    pub fn escape_string(_to: &mut Vec<u8>, _from: &[u8]) -> u64 {
        trace!("escape_string unsupported");
        0
    }

    /// Writes nothing into `to` and returns 0
    pub fn real_escape_string(&self, _to: &mut Vec<u8>, _from: &[u8]) -> u64 {
        trace!("real_escape_string unsupported");
        0
    }

    pub fn debug(_options: &str) {
        trace!("debug unsupported");
    }
}
