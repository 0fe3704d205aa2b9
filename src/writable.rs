//! A per-descriptor buffered writer that publishes its contents to a
//! [`MemVolume`] atomically on close (SPEC_FULL.md §4.3).

use std::sync::Arc;

use crate::volume::{MemVolume, VolumeError};

/// Raised by a [`WritableStream`] call made after the stream has already
/// been closed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("writable stream is closed")]
pub struct StreamClosed;

pub struct WritableStream {
    volume: Arc<MemVolume>,
    components: Vec<String>,
    buf: Vec<u8>,
    cursor: usize,
    closed: bool,
}

impl WritableStream {
    pub fn new(volume: Arc<MemVolume>, components: Vec<String>, initial: Vec<u8>) -> Self {
        let cursor = initial.len();
        Self {
            volume,
            components,
            buf: initial,
            cursor,
            closed: false,
        }
    }

    /// Writes `bytes` at `at` (or at the cursor, if `None`), zero-filling any
    /// gap between the current buffer end and `at`. Advances the cursor past
    /// the written range.
    pub fn write(&mut self, bytes: &[u8], at: Option<u64>) -> Result<usize, StreamClosed> {
        if self.closed {
            return Err(StreamClosed);
        }
        let pos = at.unwrap_or(self.cursor as u64) as usize;
        let end = pos + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[pos..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(bytes.len())
    }

    /// Legal even past the current size: the gap is filled with zeros on the
    /// next write rather than eagerly here.
    pub fn seek(&mut self, pos: u64) -> Result<(), StreamClosed> {
        if self.closed {
            return Err(StreamClosed);
        }
        self.cursor = pos as usize;
        Ok(())
    }

    pub fn truncate(&mut self, size: u64) -> Result<(), StreamClosed> {
        if self.closed {
            return Err(StreamClosed);
        }
        self.buf.resize(size as usize, 0);
        self.cursor = self.cursor.min(self.buf.len());
        Ok(())
    }

    /// Reads up to `len` bytes starting at `pos` from the buffered (not yet
    /// published) content, so a writer fd can read back its own pending
    /// writes (SPEC_FULL.md §8, property 3).
    pub fn read_at(&self, pos: u64, len: usize) -> Vec<u8> {
        let pos = pos as usize;
        if pos >= self.buf.len() {
            return Vec::new();
        }
        let end = (pos + len).min(self.buf.len());
        self.buf[pos..end].to_vec()
    }

    pub fn tell(&self) -> u64 {
        self.cursor as u64
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Publishes the buffered bytes to the volume. A second call is a no-op
    /// so callers (including `fd_close`, which may race an explicit guest
    /// close) never observe a double-publish error.
    pub fn close(&mut self) -> Result<(), VolumeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let components: Vec<&str> = self.components.iter().map(|s| s.as_str()).collect();
        self.volume
            .write_file(&components, std::mem::take(&mut self.buf), true)
    }
}

impl Drop for WritableStream {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
