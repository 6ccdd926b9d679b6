//! The pull-mode async reader: byte-range requests over a seekable stream.
//!
//! Requests may be issued from any thread; servicing happens on the owning
//! event-loop thread whenever new bytes are known to be available or a
//! wake-up was posted. All mutable state sits behind one mutex plus one
//! wait/notify condition; requests complete in FIFO submission order.
//!
//! The flush protocol is the only cancellation primitive: `begin_flush`
//! retires every pending request with a cancelled status and wakes every
//! waiter before it returns, so nothing issued before the flush can be lost
//! or block forever. Dropping the reader performs the same flush.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use flujo_core::{
    ByteRangeReader, CompletedRequest, PipelineError, ReadOutcome, Result, StreamLength,
};

use crate::byte_stream::ByteStream;
use crate::event_loop::LoopHandle;

/// How long one blocking slice of an inline synchronous read waits for the
/// provider to grow before giving up with a short read.
const SYNC_WAIT_SLICE: Duration = Duration::from_millis(100);

struct PendingRead {
    position: u64,
    length: usize,
    buffer: Vec<u8>,
    tag: u64,
}

#[derive(Default)]
struct ReaderState {
    pending: VecDeque<PendingRead>,
    ready: VecDeque<CompletedRequest>,
    flushing: bool,
    wake_posted: bool,
    total: u64,
    available: u64,
}

struct ReaderShared {
    stream: Mutex<Box<dyn ByteStream>>,
    state: Mutex<ReaderState>,
    cond: Condvar,
    loop_handle: LoopHandle,
}

/// Adapts a [`ByteStream`] into a queue of outstanding, cancellable
/// byte-range reads serviced off an event loop.
pub struct AsyncReader {
    shared: Arc<ReaderShared>,
}

impl AsyncReader {
    /// Wraps `stream`, servicing requests on the loop behind `loop_handle`.
    ///
    /// The stream's readiness notification is wired to the reader, so bytes
    /// arriving on the provider side trigger a service pass automatically.
    pub fn new(mut stream: Box<dyn ByteStream>, loop_handle: LoopHandle) -> Arc<Self> {
        let shared = Arc::new(ReaderShared {
            stream: Mutex::new(Box::new(NullStream)),
            state: Mutex::new(ReaderState::default()),
            cond: Condvar::new(),
            loop_handle,
        });

        let weak = Arc::downgrade(&shared);
        stream.set_ready_callback(Some(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                schedule_service(&shared);
            }
        })));
        *shared.stream.lock() = stream;
        refresh_lengths(&shared);

        Arc::new(Self { shared })
    }

    /// Wakes the service path; call when the provider signals new bytes
    /// through a channel the reader cannot observe itself.
    pub fn notify_bytes_available(&self) {
        schedule_service(&self.shared);
    }
}

impl ByteRangeReader for AsyncReader {
    fn request(&self, buffer: Vec<u8>, position: u64, length: usize, tag: u64) -> Result<()> {
        if length == 0 || buffer.len() < length {
            return Err(PipelineError::InvalidArgument(
                "zero-length request or undersized buffer",
            ));
        }
        let mut state = self.shared.state.lock();
        if state.flushing {
            return Err(PipelineError::WrongState);
        }
        let was_empty = state.pending.is_empty();
        state.pending.push_back(PendingRead {
            position,
            length,
            buffer,
            tag,
        });
        drop(state);
        if was_empty {
            schedule_service(&self.shared);
        }
        Ok(())
    }

    fn wait_for_next(&self, timeout: Duration) -> Result<CompletedRequest> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.flushing {
                return Err(PipelineError::WrongState);
            }
            if let Some(completed) = state.ready.pop_front() {
                return Ok(completed);
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::Timeout);
            }
            self.shared.cond.wait_until(&mut state, deadline);
        }
    }

    fn sync_read(&self, position: u64, buffer: &mut [u8]) -> Result<ReadOutcome> {
        if self.shared.loop_handle.is_loop_thread() {
            return sync_read_inline(&self.shared, position, buffer);
        }

        // Foreign thread: post a one-shot work item to the loop and block on
        // the reader's condition until it completes, keeping one consistent
        // serialization point for all reads.
        let slot: Arc<Mutex<Option<(Vec<u8>, Result<ReadOutcome>)>>> = Arc::new(Mutex::new(None));
        let task_slot = slot.clone();
        let task_shared = Arc::downgrade(&self.shared);
        let length = buffer.len();
        let posted = self.shared.loop_handle.post(move || {
            let Some(shared) = task_shared.upgrade() else {
                return;
            };
            let mut scratch = vec![0u8; length];
            let outcome = sync_read_inline(&shared, position, &mut scratch);
            *task_slot.lock() = Some((scratch, outcome));
            // Take the state mutex between publishing the result and
            // signalling, so the waiter cannot slip into its wait between
            // checking the slot and parking.
            drop(shared.state.lock());
            shared.cond.notify_all();
        });
        if !posted {
            return Err(PipelineError::WrongState);
        }

        let mut state = self.shared.state.lock();
        loop {
            if let Some((scratch, outcome)) = slot.lock().take() {
                buffer.copy_from_slice(&scratch);
                return outcome;
            }
            if state.flushing {
                return Err(PipelineError::WrongState);
            }
            self.shared.cond.wait(&mut state);
        }
    }

    fn begin_flush(&self) {
        let mut state = self.shared.state.lock();
        state.flushing = true;
        let retired = state.pending.len();
        while let Some(request) = state.pending.pop_front() {
            state.ready.push_back(CompletedRequest {
                tag: request.tag,
                position: request.position,
                buffer: request.buffer,
                outcome: ReadOutcome::Cancelled,
            });
        }
        drop(state);
        tracing::debug!(retired, "reader flush started");
        self.shared.cond.notify_all();
    }

    fn end_flush(&self) {
        self.shared.state.lock().flushing = false;
        tracing::debug!("reader flush ended");
    }

    fn length(&self) -> StreamLength {
        refresh_lengths(&self.shared);
        let state = self.shared.state.lock();
        StreamLength {
            total: state.total,
            available: state.available,
        }
    }
}

impl Drop for AsyncReader {
    fn drop(&mut self) {
        // Implicit flush: no outstanding request may block a caller past the
        // reader's lifetime.
        self.begin_flush();
    }
}

/// Placeholder stream installed while the real one gets its callback wired.
struct NullStream;

impl ByteStream for NullStream {
    fn total_size(&self) -> u64 {
        0
    }
    fn bytes_available(&self) -> u64 {
        0
    }
    fn position(&self) -> u64 {
        0
    }
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Ok(())
    }
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

/// Posts one service pass to the loop, coalescing bursts: while a posted
/// wake-up is outstanding no duplicate is queued.
fn schedule_service(shared: &Arc<ReaderShared>) {
    {
        let mut state = shared.state.lock();
        if state.wake_posted {
            return;
        }
        state.wake_posted = true;
    }
    let weak = Arc::downgrade(shared);
    let posted = shared.loop_handle.post(move || {
        if let Some(shared) = weak.upgrade() {
            service(&shared);
        }
    });
    if !posted {
        shared.state.lock().wake_posted = false;
    }
}

/// Re-reads total/available from the stream into the cached lengths.
/// The cache only ever grows; a provider reporting a smaller value than
/// previously observed is ignored.
fn refresh_lengths(shared: &Arc<ReaderShared>) {
    let (total, available) = {
        let stream = shared.stream.lock();
        (stream.total_size(), stream.bytes_available())
    };
    let mut state = shared.state.lock();
    state.total = state.total.max(total);
    state.available = state.available.max(available.min(state.total));
}

enum ServiceStep {
    /// Requested offset is beyond the total length: retire with zeros.
    Retire(PendingRead),
    /// Head range is serviceable: read it now.
    Read(PendingRead),
    Done,
}

/// One service pass, on the loop thread: drain every serviceable request
/// from the head of the pending queue into the ready queue.
fn service(shared: &Arc<ReaderShared>) {
    shared.state.lock().wake_posted = false;
    refresh_lengths(shared);

    loop {
        let step = {
            let mut state = shared.state.lock();
            if state.flushing {
                ServiceStep::Done
            } else if let Some(head) = state.pending.front() {
                if head.position >= state.total {
                    ServiceStep::Retire(state.pending.pop_front().expect("head exists"))
                } else if head.position + head.length as u64 <= state.available
                    || state.available == state.total
                {
                    ServiceStep::Read(state.pending.pop_front().expect("head exists"))
                } else {
                    ServiceStep::Done
                }
            } else {
                ServiceStep::Done
            }
        };

        let completed = match step {
            ServiceStep::Done => break,
            ServiceStep::Retire(mut request) => {
                request.buffer[..request.length].fill(0);
                CompletedRequest {
                    tag: request.tag,
                    position: request.position,
                    buffer: request.buffer,
                    outcome: ReadOutcome::EndOfStream,
                }
            }
            ServiceStep::Read(request) => perform_read(shared, request),
        };

        let mut state = shared.state.lock();
        state.ready.push_back(completed);
        drop(state);
        // One signal per drained request.
        shared.cond.notify_one();
    }
}

/// Executes one non-blocking read against the stream, seeking only when the
/// cursor is off target. Short reads zero-fill the remainder and report a
/// soft partial outcome.
fn perform_read(shared: &Arc<ReaderShared>, mut request: PendingRead) -> CompletedRequest {
    let mut stream = shared.stream.lock();
    let destination = &mut request.buffer[..request.length];
    let mut filled = 0usize;

    if stream.position() != request.position
        && let Err(err) = stream.seek(request.position)
    {
        tracing::warn!(%err, position = request.position, "seek failed; zero-filling");
        destination.fill(0);
        drop(stream);
        return CompletedRequest {
            tag: request.tag,
            position: request.position,
            buffer: request.buffer,
            outcome: ReadOutcome::Partial { valid_len: 0 },
        };
    }
    while filled < request.length {
        match stream.read(&mut destination[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(err) => {
                tracing::warn!(%err, "stream read failed; zero-filling remainder");
                break;
            }
        }
    }
    drop(stream);

    let outcome = if filled == request.length {
        ReadOutcome::Complete
    } else {
        destination[filled..].fill(0);
        ReadOutcome::Partial { valid_len: filled }
    };
    CompletedRequest {
        tag: request.tag,
        position: request.position,
        buffer: request.buffer,
        outcome,
    }
}

/// The synchronous read path, on the loop thread: blocks on the provider
/// (in bounded slices) until the range is available, the stream stops
/// growing, or a flush begins.
fn sync_read_inline(
    shared: &Arc<ReaderShared>,
    position: u64,
    buffer: &mut [u8],
) -> Result<ReadOutcome> {
    refresh_lengths(shared);
    loop {
        let (total, available, flushing) = {
            let state = shared.state.lock();
            (state.total, state.available, state.flushing)
        };
        if flushing {
            return Err(PipelineError::WrongState);
        }
        if position >= total {
            buffer.fill(0);
            return Ok(ReadOutcome::EndOfStream);
        }
        if position + buffer.len() as u64 <= available || available == total {
            break;
        }
        let grew = shared.stream.lock().wait_for_ready(SYNC_WAIT_SLICE);
        refresh_lengths(shared);
        if !grew && shared.state.lock().available == available {
            // Provider is not growing; settle for a short read.
            break;
        }
    }

    let request = PendingRead {
        position,
        length: buffer.len(),
        buffer: vec![0u8; buffer.len()],
        tag: 0,
    };
    let completed = perform_read(shared, request);
    buffer.copy_from_slice(&completed.buffer[..buffer.len()]);
    Ok(completed.outcome)
}
