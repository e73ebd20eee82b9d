//! Per-execution append-only output buffers.
//!
//! Each execution gets one [`BufferCell`] keyed by its correlation id. The
//! cell has its own lock, so concurrent writers to one id are serialized at
//! chunk granularity while different ids never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Largest char boundary at or below `offset`. Offsets past the end are
/// returned unchanged.
pub fn char_floor(text: &str, offset: usize) -> usize {
    if offset >= text.len() {
        return offset;
    }
    let mut start = offset;
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    start
}

/// Text accumulator for one execution.
#[derive(Debug, Default)]
pub struct BufferCell {
    text: Mutex<String>,
    closed: AtomicBool,
    outcome: Mutex<Option<bool>>,
}

impl BufferCell {
    /// Append `chunk` with line-boundary normalization. Returns `false` once
    /// the cell is closed.
    pub fn append(&self, chunk: &str) -> bool {
        let mut text = lock(&self.text);
        // Checked under the text lock so nothing lands after `close`.
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if chunk.trim().is_empty() {
            text.push_str(chunk);
            return true;
        }
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(chunk);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        true
    }

    pub fn read(&self) -> String {
        lock(&self.text).clone()
    }

    /// Text after byte `offset`, plus the new watermark.
    ///
    /// An offset inside a multi-byte character is moved back to the start of
    /// that character, so the chunk may repeat a partial character the caller
    /// already holds. An offset past the end yields nothing.
    pub fn read_from(&self, offset: usize) -> (String, usize) {
        let text = lock(&self.text);
        let start = char_floor(&text, offset);
        let chunk = text.get(start..).unwrap_or_default().to_string();
        (chunk, text.len().max(start))
    }

    pub fn len(&self) -> usize {
        lock(&self.text).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `Some(success)` once the owning execution finished.
    pub fn outcome(&self) -> Option<bool> {
        *lock(&self.outcome)
    }

    fn close(&self) {
        let _text = lock(&self.text);
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn finish(&self, success: bool) {
        lock(&self.outcome).get_or_insert(success);
        self.close();
    }
}

/// Registry of live buffers.
#[derive(Debug, Default)]
pub struct OutputBuffers {
    cells: Mutex<HashMap<Uuid, Arc<BufferCell>>>,
}

impl OutputBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the buffer for `id` and return the capture guard that owns
    /// writing to it. Dropping the guard closes the buffer.
    pub fn open(&self, id: Uuid) -> OutputCapture {
        let cell = Arc::new(BufferCell::default());
        lock(&self.cells).insert(id, Arc::clone(&cell));
        OutputCapture { id, cell }
    }

    /// Append to a live buffer. `false` when the id is unknown or closed.
    pub fn append(&self, id: Uuid, chunk: &str) -> bool {
        match self.subscribe(id) {
            Some(cell) => cell.append(chunk),
            None => false,
        }
    }

    pub fn read(&self, id: Uuid) -> Option<String> {
        self.subscribe(id).map(|cell| cell.read())
    }

    pub fn read_from(&self, id: Uuid, offset: usize) -> Option<(String, usize)> {
        self.subscribe(id).map(|cell| cell.read_from(offset))
    }

    /// Handle on the cell that stays readable after [`discard`](Self::discard).
    pub fn subscribe(&self, id: Uuid) -> Option<Arc<BufferCell>> {
        lock(&self.cells).get(&id).cloned()
    }

    pub fn discard(&self, id: Uuid) {
        lock(&self.cells).remove(&id);
    }

    pub fn live_count(&self) -> usize {
        lock(&self.cells).len()
    }
}

/// Scoped ownership of one execution's output.
///
/// The buffer is closed when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct OutputCapture {
    id: Uuid,
    cell: Arc<BufferCell>,
}

impl OutputCapture {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn write(&self, chunk: &str) {
        self.cell.append(chunk);
    }

    pub fn snapshot(&self) -> String {
        self.cell.read()
    }

    pub fn cell(&self) -> Arc<BufferCell> {
        Arc::clone(&self.cell)
    }

    /// Record the outcome and close the buffer.
    pub fn finish(self, success: bool) {
        self.cell.finish(success);
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        self.cell.close();
    }
}
