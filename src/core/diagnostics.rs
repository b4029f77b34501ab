//! Diagnostic normalization
//!
//! Reduces a transport return code and the diagnostic chain behind it to the single
//! error code and message pair the client API exposes.

use super::error::{BridgeError, ErrorSlot, Result};
use super::handles::ConnectionHandle;
use super::transport::{DbcHandle, EnvHandle, SqlReturn, StmtHandle, Transport};
use tracing::debug;

/// Number of leading `[...]` tags removed from diagnostic text
const MAX_STRIPPED_TAGS: usize = 2;

/// Classify `rc` returned by the call made at `site`
///
/// Success codes pass through (informational diagnostics are drained, not surfaced).
/// Every failure overwrites `slot` before it is returned. An invalid handle also marks
/// the connection as no longer connected.
pub fn check(
    transport: &dyn Transport,
    handles: &mut ConnectionHandle,
    slot: &mut ErrorSlot,
    rc: SqlReturn,
    site: &str,
) -> Result<SqlReturn> {
    let err = match rc {
        SqlReturn::Success | SqlReturn::NoData => return Ok(rc),
        SqlReturn::SuccessWithInfo => {
            harvest(transport, handles, site);
            return Ok(rc);
        }
        SqlReturn::InvalidHandle => {
            handles.mark_disconnected();
            BridgeError::server_lost()
        }
        SqlReturn::Error => {
            let first = harvest(transport, handles, site);
            BridgeError::bridge(first.as_deref().map(clean_message).unwrap_or_default())
        }
        other => {
            debug!(site, rc = %other, "unrecognized transport return code");
            BridgeError::unknown()
        }
    };

    slot.record(&err);
    Err(err)
}

/// Drain the whole diagnostic chain, statement scope first, then connection, then
/// environment, and return the text of the first record found
pub fn harvest(transport: &dyn Transport, handles: &ConnectionHandle, site: &str) -> Option<String> {
    let env = handles.env();
    let dbc = handles.dbc();
    let mut first = None;

    if let Some(stmt) = handles.statement() {
        drain_scope(transport, env, dbc, Some(stmt), site, &mut first);
    }
    if dbc.is_some() {
        drain_scope(transport, env, dbc, None, site, &mut first);
    }
    if env.is_some() {
        drain_scope(transport, env, None, None, site, &mut first);
    }

    first
}

fn drain_scope(
    transport: &dyn Transport,
    env: Option<EnvHandle>,
    dbc: Option<DbcHandle>,
    stmt: Option<StmtHandle>,
    site: &str,
    first: &mut Option<String>,
) {
    loop {
        let (rc, record) = transport.error(env, dbc, stmt);
        let record = match (rc, record) {
            (SqlReturn::Success, Some(record)) => record,
            _ => break,
        };
        debug!(
            site,
            sqlstate = %record.sqlstate,
            native = record.native_error,
            message = %record.message,
            "transport diagnostic"
        );
        if first.is_none() {
            *first = Some(record.message);
        }
    }
}

/// Strip up to two leading `[vendor][driver]` tags and cut at the first newline
///
/// Text that does not start with a tag is returned unchanged apart from the newline cut.
/// The tags are kept when stripping them would leave fewer than two characters.
pub fn clean_message(raw: &str) -> String {
    let mut rest = raw;
    for _ in 0..MAX_STRIPPED_TAGS {
        if !rest.starts_with('[') {
            break;
        }
        match rest.find(']') {
            Some(close) => rest = &rest[close + 1..],
            None => break,
        }
    }

    let mut cleaned = raw;
    if rest.len() < raw.len() {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        if rest.chars().nth(1).is_some() {
            cleaned = rest;
        }
    }

    match cleaned.find('\n') {
        Some(newline) => cleaned[..newline].to_string(),
        None => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::{Call, ScriptedTransport};
    use crate::core::error::{CR_BRIDGE_ERROR, CR_SERVER_LOST, CR_UNKNOWN_ERROR};
    use crate::core::transport::DiagRecord;

    #[test]
    fn test_clean_message_strips_two_tags() {
        assert_eq!(
            clean_message("[OpenLink][SQLite] no such table: t\n"),
            "no such table: t"
        );
        assert_eq!(clean_message("[A][B][C]rest"), "[C]rest");
        assert_eq!(clean_message("[vendor]message"), "message");
    }

    #[test]
    fn test_clean_message_passthrough() {
        assert_eq!(clean_message("plain text"), "plain text");
        assert_eq!(clean_message("[unterminated tag"), "[unterminated tag");
        assert_eq!(clean_message("line one\nline two"), "line one");
    }

    #[test]
    fn test_clean_message_keeps_tags_when_nothing_would_remain() {
        assert_eq!(clean_message("[A][B]"), "[A][B]");
        assert_eq!(clean_message("[A][B] x"), "[A][B] x");
        assert_eq!(clean_message("[A][B] xy"), "xy");
    }

    fn connected(transport: &ScriptedTransport) -> (ConnectionHandle, ErrorSlot) {
        let mut handles = ConnectionHandle::new();
        let mut slot = ErrorSlot::default();
        handles.open(transport, &mut slot).expect("open");
        handles
            .connect(transport, &mut slot, "DSN=test")
            .expect("connect");
        (handles, slot)
    }

    #[test]
    fn test_error_harvests_first_record_across_scopes() {
        let transport = ScriptedTransport::new();
        let (mut handles, mut slot) = connected(&transport);
        transport.push_statement_diag(DiagRecord::new("42000", 1, "[X][Y] first\n"));
        transport.push_statement_diag(DiagRecord::new("42000", 2, "[X][Y] second"));
        transport.push_connection_diag(DiagRecord::new("08S01", 3, "[X] third"));

        let err = check(&transport, &mut handles, &mut slot, SqlReturn::Error, "test")
            .expect_err("error code");
        assert_eq!(err, BridgeError::bridge("first"));
        assert_eq!(slot.code(), CR_BRIDGE_ERROR);
        assert_eq!(slot.message(), "first");
        // the whole chain was consumed
        assert_eq!(transport.pending_diagnostics(), 0);
    }

    #[test]
    fn test_error_without_records_still_has_message() {
        let transport = ScriptedTransport::new();
        let (mut handles, mut slot) = connected(&transport);
        let err = check(&transport, &mut handles, &mut slot, SqlReturn::Error, "test")
            .expect_err("error code");
        assert_eq!(err.code(), CR_BRIDGE_ERROR);
        assert!(!slot.message().is_empty());
    }

    #[test]
    fn test_invalid_handle_marks_disconnected() {
        let transport = ScriptedTransport::new();
        let (mut handles, mut slot) = connected(&transport);
        assert!(handles.is_connected());

        let err = check(
            &transport,
            &mut handles,
            &mut slot,
            SqlReturn::InvalidHandle,
            "test",
        )
        .expect_err("invalid handle");
        assert_eq!(err, BridgeError::ServerLost);
        assert_eq!(slot.code(), CR_SERVER_LOST);
        assert!(!handles.is_connected());
        assert!(handles.ready(&mut slot).is_err());
    }

    #[test]
    fn test_success_with_info_is_not_a_failure() {
        let transport = ScriptedTransport::new();
        let (mut handles, mut slot) = connected(&transport);
        transport.push_statement_diag(DiagRecord::new("01004", 0, "[X] truncated"));

        let rc = check(
            &transport,
            &mut handles,
            &mut slot,
            SqlReturn::SuccessWithInfo,
            "test",
        )
        .expect("informational");
        assert_eq!(rc, SqlReturn::SuccessWithInfo);
        assert_eq!(slot.code(), 0);
        assert_eq!(transport.pending_diagnostics(), 0);
    }

    #[test]
    fn test_unknown_code() {
        let transport = ScriptedTransport::new();
        let (mut handles, mut slot) = connected(&transport);
        for rc in [SqlReturn::StillExecuting, SqlReturn::NeedData, SqlReturn::Other(7)] {
            let err = check(&transport, &mut handles, &mut slot, rc, "test").expect_err("unknown");
            assert_eq!(err.code(), CR_UNKNOWN_ERROR);
            assert_eq!(slot.message(), "Unknown MySQL error");
        }
        assert!(handles.is_connected());
        assert!(!transport.calls().contains(&Call::Error));
    }
}
