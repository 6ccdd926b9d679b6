//! Byte-stream providers: the seekable sources the reader adapts.
//!
//! [`ByteStream`] is the external-collaborator boundary: anything seekable
//! with a growth notification can feed an
//! [`AsyncReader`](crate::AsyncReader). Two implementations ship with the
//! crate: [`FileByteStream`] over a local file (always fully available) and
//! [`MemoryByteStream`] with a movable availability watermark for
//! progressive-download behavior.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use flujo_core::{PipelineError, Result};

/// Invoked by a provider when more bytes become available.
pub type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// A seekable, possibly still-growing source of bytes.
///
/// The reader serializes all access: `read`/`seek` are only ever called from
/// one thread at a time, and [`wait_for_ready`](Self::wait_for_ready) only
/// from the reader's own event-loop thread.
pub trait ByteStream: Send {
    /// Total stream length in bytes, as far as it is currently known.
    fn total_size(&self) -> u64;

    /// Bytes readable right now; at most [`total_size`](Self::total_size).
    fn bytes_available(&self) -> u64;

    /// Current read-cursor offset.
    fn position(&self) -> u64;

    /// Moves the read cursor.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Reads up to `buf.len()` bytes at the cursor, advancing it. A short
    /// count means no more bytes are available right now, not an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Blocks until more bytes arrive or `timeout` expires. Returns whether
    /// availability may have grown. Providers that never grow return `false`
    /// immediately.
    fn wait_for_ready(&mut self, timeout: Duration) -> bool {
        let _ = timeout;
        false
    }

    /// Installs (or clears) the growth notification.
    fn set_ready_callback(&mut self, callback: Option<ReadyCallback>) {
        let _ = callback;
    }
}

// ---------------------------------------------------------------------------
// File-backed stream
// ---------------------------------------------------------------------------

/// A [`ByteStream`] over a local file. The whole length is available from
/// the start, so the growth notification never fires.
pub struct FileByteStream {
    file: File,
    len: u64,
    position: u64,
}

impl FileByteStream {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            position: 0,
        })
    }
}

impl ByteStream for FileByteStream {
    fn total_size(&self) -> u64 {
        self.len
    }

    fn bytes_available(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| {
                tracing::warn!(%err, offset, "file seek failed");
                PipelineError::RuntimeError
            })?;
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = self.file.read(buf).map_err(|err| {
            tracing::warn!(%err, "file read failed");
            PipelineError::RuntimeError
        })?;
        self.position += count as u64;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// In-memory stream with an availability watermark
// ---------------------------------------------------------------------------

struct MemoryShared {
    state: Mutex<MemoryState>,
    grown: Condvar,
}

struct MemoryState {
    data: Vec<u8>,
    available: u64,
    callback: Option<ReadyCallback>,
}

/// An in-memory [`ByteStream`] whose available prefix can be grown at
/// runtime through its [`MemoryStreamHandle`], simulating an in-progress
/// download.
pub struct MemoryByteStream {
    shared: Arc<MemoryShared>,
    position: u64,
}

/// Producer-side handle paired with a [`MemoryByteStream`].
#[derive(Clone)]
pub struct MemoryStreamHandle {
    shared: Arc<MemoryShared>,
}

impl MemoryByteStream {
    /// A stream whose full contents are available immediately.
    pub fn new(data: Vec<u8>) -> Self {
        let available = data.len() as u64;
        Self::with_available(data, available).0
    }

    /// A stream of `data.len()` total bytes with only the first `available`
    /// readable; grow the watermark through the returned handle.
    pub fn with_available(data: Vec<u8>, available: u64) -> (Self, MemoryStreamHandle) {
        let available = available.min(data.len() as u64);
        let shared = Arc::new(MemoryShared {
            state: Mutex::new(MemoryState {
                data,
                available,
                callback: None,
            }),
            grown: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
                position: 0,
            },
            MemoryStreamHandle { shared },
        )
    }
}

impl MemoryStreamHandle {
    /// Raises the availability watermark. Shrinking is ignored. Fires the
    /// stream's ready callback and wakes blocked waiters when it grows.
    pub fn set_available(&self, available: u64) {
        let callback = {
            let mut state = self.shared.state.lock();
            let clamped = available.min(state.data.len() as u64);
            if clamped <= state.available {
                return;
            }
            state.available = clamped;
            state.callback.take()
        };
        self.shared.grown.notify_all();
        if let Some(callback) = callback {
            callback();
            self.shared.state.lock().callback = Some(callback);
        }
    }

    /// Makes every byte available.
    pub fn complete(&self) {
        let total = self.shared.state.lock().data.len() as u64;
        self.set_available(total);
    }
}

impl ByteStream for MemoryByteStream {
    fn total_size(&self) -> u64 {
        self.shared.state.lock().data.len() as u64
    }

    fn bytes_available(&self) -> u64 {
        self.shared.state.lock().available
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.shared.state.lock().data.len() as u64 {
            return Err(PipelineError::InvalidArgument("seek beyond end of stream"));
        }
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let state = self.shared.state.lock();
        let start = self.position.min(state.available) as usize;
        let end = (self.position + buf.len() as u64).min(state.available) as usize;
        let count = end.saturating_sub(start);
        buf[..count].copy_from_slice(&state.data[start..end]);
        drop(state);
        self.position += count as u64;
        Ok(count)
    }

    fn wait_for_ready(&mut self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.available >= state.data.len() as u64 {
            return false;
        }
        let before = state.available;
        self.shared.grown.wait_for(&mut state, timeout);
        state.available > before
    }

    fn set_ready_callback(&mut self, callback: Option<ReadyCallback>) {
        self.shared.state.lock().callback = callback;
    }
}
