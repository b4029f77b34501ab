//! Result sets and row materialization
//!
//! A result set is created from the schema of the last execution in one of two modes:
//!
//! - **streaming** (`use_result`): one reusable buffer per column is bound to the statement
//!   and every fetch overwrites it in place. The row count grows as rows are read and no
//!   repositioning is possible.
//! - **buffered** (`store_result`): every row is pulled up front into owned storage. The
//!   row count is exact immediately and the read cursor can be saved and restored.

use super::error::{BridgeError, Result};
use super::fields::FieldDescriptor;
use super::session::{Session, SharedSession};
use super::transport::{ColumnBuffer, FreeStmtOption, SqlReturn, StmtHandle, NULL_DATA};
use tracing::{debug, warn};

/// Saved read position of a buffered result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowOffset(usize);

impl RowOffset {
    /// Position before the row at `index`
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// One row as returned by `fetch_row`
///
/// Borrows the result set: for streaming results the values live in buffers that the next
/// fetch overwrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    cells: Vec<Option<&'a [u8]>>,
}

impl<'a> Row<'a> {
    fn new(cells: Vec<Option<&'a [u8]>>) -> Self {
        Self { cells }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Raw value of column `index`; `None` for SQL NULL or an out-of-range index
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.cells.get(index).copied().flatten()
    }

    /// Value of column `index` as UTF-8 text
    pub fn get_str(&self, index: usize) -> Option<&'a str> {
        self.get(index).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// True when column `index` exists and is SQL NULL
    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.cells.get(index), Some(None))
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        self.cells.iter().copied()
    }

    /// Owned copy of the row, lossily decoded as UTF-8
    pub fn to_strings(&self) -> Vec<Option<String>> {
        self.cells
            .iter()
            .map(|cell| cell.map(|v| String::from_utf8_lossy(v).into_owned()))
            .collect()
    }
}

#[derive(Debug)]
struct StoredRow {
    cells: Vec<Option<Vec<u8>>>,
}

struct StreamingRows {
    session: SharedSession,
    generation: u64,
    buffers: Vec<ColumnBuffer>,
    eof: bool,
}

struct BufferedRows {
    rows: Vec<StoredRow>,
    cursor: usize,
}

enum Payload {
    Streaming(StreamingRows),
    Buffered(BufferedRows),
}

/// Rows and schema of one executed statement
pub struct ResultSet {
    fields: Vec<FieldDescriptor>,
    current_field: usize,
    row_count: u64,
    lengths: Vec<u64>,
    has_current_row: bool,
    payload: Payload,
}

impl ResultSet {
    /// Start a streaming result over the statement's current rows
    ///
    /// Returns `Ok(None)` when the last execution produced no columns.
    pub fn streaming(shared: &SharedSession) -> Result<Option<Self>> {
        let mut guard = shared.lock();
        let session = &mut *guard;

        let stmt = session.ready()?;
        let fields = match session.take_schema() {
            Some(fields) => fields,
            None => return Ok(None),
        };
        session.handles.set_pending_result(false);

        let buffers = allocate_buffers(session, &fields)?;
        bind_columns(session, stmt, &fields)?;

        Ok(Some(Self::new(
            fields,
            0,
            Payload::Streaming(StreamingRows {
                session: SharedSession::clone(shared),
                generation: session.generation,
                buffers,
                eof: false,
            }),
        )))
    }

    /// Pull every row of the statement's current result into owned storage
    ///
    /// Returns `Ok(None)` when the last execution produced no columns. A fetch failure
    /// discards everything; running out of memory for a row stops early, keeps what was
    /// gathered and leaves an out-of-memory condition in the error slot.
    pub fn buffered(shared: &SharedSession) -> Result<Option<Self>> {
        let mut guard = shared.lock();
        let session = &mut *guard;

        let stmt = session.ready()?;
        let fields = match session.take_schema() {
            Some(fields) => fields,
            None => return Ok(None),
        };
        session.handles.set_pending_result(false);

        let mut buffers = allocate_buffers(session, &fields)?;
        bind_columns(session, stmt, &fields)?;

        let transport = session.transport();
        let mut rows: Vec<StoredRow> = Vec::new();
        loop {
            let rc = transport.fetch(stmt, &mut buffers);
            if session.check(rc, "SQLFetch")? == SqlReturn::NoData {
                break;
            }
            let row = copy_row(&buffers).filter(|_| reserve_row(&mut rows));
            match row {
                Some(row) => rows.push(row),
                None => {
                    warn!(rows = rows.len(), "out of memory, keeping rows gathered so far");
                    session.errors.record(&BridgeError::out_of_memory());
                    break;
                }
            }
        }

        debug!(rows = rows.len(), "result stored");
        let row_count = rows.len() as u64;
        Ok(Some(Self::new(
            fields,
            row_count,
            Payload::Buffered(BufferedRows { rows, cursor: 0 }),
        )))
    }

    fn new(fields: Vec<FieldDescriptor>, row_count: u64, payload: Payload) -> Self {
        let lengths = vec![0; fields.len()];
        Self {
            fields,
            current_field: 0,
            row_count,
            lengths,
            has_current_row: false,
            payload,
        }
    }

    /// True for results created by `store_result`
    pub fn is_buffered(&self) -> bool {
        matches!(self.payload, Payload::Buffered(_))
    }

    /// Rows in the result
    ///
    /// Exact for buffered results. For streaming results this is the number of rows read
    /// so far, only final once `fetch_row` has returned `None`.
    pub fn num_rows(&self) -> u64 {
        self.row_count
    }

    pub fn num_fields(&self) -> u32 {
        self.fields.len() as u32
    }

    /// True once a streaming result has been read to the end
    ///
    /// Buffered results never report end of data; their rows are already complete.
    pub fn eof(&self) -> bool {
        match &self.payload {
            Payload::Streaming(streaming) => streaming.eof,
            Payload::Buffered(_) => false,
        }
    }

    pub fn fetch_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn fetch_field_direct(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Next descriptor of the sequential field walk
    pub fn fetch_field(&mut self) -> Option<&FieldDescriptor> {
        let field = self.fields.get(self.current_field)?;
        self.current_field += 1;
        Some(field)
    }

    /// Move the field walk to `offset`, returning the previous position
    pub fn field_seek(&mut self, offset: usize) -> usize {
        std::mem::replace(&mut self.current_field, offset)
    }

    pub fn field_tell(&self) -> usize {
        self.current_field
    }

    /// Next row, or `None` at the end of the result or on failure
    ///
    /// Failures are reported through the owning connection's error slot.
    pub fn fetch_row(&mut self) -> Option<Row<'_>> {
        self.has_current_row = false;
        match &mut self.payload {
            Payload::Buffered(buffered) => {
                let row = buffered.rows.get(buffered.cursor)?;
                buffered.cursor += 1;
                for (length, cell) in self.lengths.iter_mut().zip(&row.cells) {
                    *length = cell.as_ref().map_or(0, |v| v.len() as u64);
                }
                self.has_current_row = true;
                Some(Row::new(row.cells.iter().map(|c| c.as_deref()).collect()))
            }
            Payload::Streaming(streaming) => {
                if !streaming.fetch() {
                    return None;
                }
                self.row_count += 1;
                for (length, buffer) in self.lengths.iter_mut().zip(&streaming.buffers) {
                    *length = buffer.value().map_or(0, |v| v.len() as u64);
                }
                self.has_current_row = true;
                Some(Row::new(streaming.buffers.iter().map(ColumnBuffer::value).collect()))
            }
        }
    }

    /// Byte lengths of the values of the row last returned by `fetch_row`
    ///
    /// `None` before the first fetch and after the end of the result. NULL columns have
    /// length 0.
    pub fn fetch_lengths(&self) -> Option<&[u64]> {
        if self.has_current_row {
            Some(&self.lengths)
        } else {
            None
        }
    }

    /// Current read position of a buffered result; `None` for streaming results
    pub fn row_tell(&self) -> Option<RowOffset> {
        match &self.payload {
            Payload::Buffered(buffered) => Some(RowOffset(buffered.cursor)),
            Payload::Streaming(_) => None,
        }
    }

    /// Reposition a buffered result, returning the previous position
    ///
    /// Offsets past the end leave the result exhausted. Streaming results cannot seek:
    /// the call does nothing and returns `None`.
    pub fn row_seek(&mut self, offset: RowOffset) -> Option<RowOffset> {
        match &mut self.payload {
            Payload::Buffered(buffered) => {
                let previous = RowOffset(buffered.cursor);
                buffered.cursor = offset.0.min(buffered.rows.len());
                self.has_current_row = false;
                Some(previous)
            }
            Payload::Streaming(_) => None,
        }
    }

    /// Absolute row positioning is not provided; this does nothing
    pub fn data_seek(&mut self, offset: u64) {
        tracing::trace!(offset, "data_seek ignored");
    }

    /// Release the result set
    pub fn free_result(self) {}
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("buffered", &self.is_buffered())
            .field("fields", &self.fields.len())
            .field("row_count", &self.row_count)
            .finish()
    }
}

impl StreamingRows {
    /// Fetch into the bound buffers; false at the end or on failure
    fn fetch(&mut self) -> bool {
        if self.eof {
            return false;
        }

        let mut guard = self.session.lock();
        let session = &mut *guard;
        let stmt = match session.ready() {
            Ok(stmt) => stmt,
            Err(_) => return false,
        };
        if session.generation != self.generation {
            warn!("statement was re-executed, streaming result is no longer readable");
            self.eof = true;
            return false;
        }

        let rc = session.transport().fetch(stmt, &mut self.buffers);
        match session.check(rc, "SQLFetch") {
            Ok(SqlReturn::NoData) => {
                self.eof = true;
                false
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

fn allocate_buffers(session: &mut Session, fields: &[FieldDescriptor]) -> Result<Vec<ColumnBuffer>> {
    let mut buffers = Vec::new();
    let mut ok = buffers.try_reserve_exact(fields.len()).is_ok();
    for field in fields {
        if !ok {
            break;
        }
        let mut data = Vec::new();
        ok = data.try_reserve_exact(field.buffer_len()).is_ok();
        buffers.push(ColumnBuffer {
            data,
            capacity: field.buffer_len(),
            indicator: NULL_DATA,
        });
    }

    if ok {
        Ok(buffers)
    } else {
        let err = BridgeError::out_of_memory();
        session.errors.record(&err);
        Err(err)
    }
}

fn bind_columns(session: &mut Session, stmt: StmtHandle, fields: &[FieldDescriptor]) -> Result<()> {
    let transport = session.transport();
    transport.free_stmt(stmt, FreeStmtOption::Unbind);
    for (index, field) in fields.iter().enumerate() {
        let rc = transport.bind_col(stmt, (index + 1) as u16, field.buffer_len());
        session.check(rc, "SQLBindCol")?;
    }
    Ok(())
}

#[cfg(test)]
thread_local! {
    static ROW_LIMIT: std::cell::Cell<Option<usize>> = const { std::cell::Cell::new(None) };
}

/// Make room for one more stored row
fn reserve_row(rows: &mut Vec<StoredRow>) -> bool {
    #[cfg(test)]
    {
        if ROW_LIMIT.with(|limit| limit.get()).is_some_and(|limit| rows.len() >= limit) {
            return false;
        }
    }
    rows.try_reserve(1).is_ok()
}

fn copy_row(buffers: &[ColumnBuffer]) -> Option<StoredRow> {
    let mut cells = Vec::new();
    cells.try_reserve_exact(buffers.len()).ok()?;
    for buffer in buffers {
        let cell = match buffer.value() {
            Some(value) => {
                let mut owned = Vec::new();
                owned.try_reserve_exact(value.len()).ok()?;
                owned.extend_from_slice(value);
                Some(owned)
            }
            None => None,
        };
        cells.push(cell);
    }
    Some(StoredRow { cells })
}
