//! # Pipes
//!
//! The pipe control block: a [`RingBuffer`], a condition variable per
//! direction and independent closed flags for each end. Both endpoints share
//! the control block; its storage is released when the second end closes.
//!
//! Every wait is a loop over its condition and every wakeup is a broadcast,
//! so a close can release all blocked peers at once.

use crate::ring::RingBuffer;
use crate::{IpcError, IpcResult, PipeId};
use alloc::sync::Arc;
use cinder_execution::context::BlockReason;
use cinder_execution::scheduler::Scheduler;
use cinder_execution::sync::CondVar;
use core::fmt;
use spin::Mutex;

/// Default pipe capacity: 32 KiB
pub const PIPE_BUFFER_SIZE: usize = 32 * 1024;

static_assertions::const_assert!(PIPE_BUFFER_SIZE > 0);

/// Pipe flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Pipe end flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct PipeFlags: u32 {
            /// The read end is closed
            const READER_CLOSED = 1 << 0;
            /// The write end is closed
            const WRITER_CLOSED = 1 << 1;
        }
    }
}

pub use flags::PipeFlags;

/// Point-in-time view of a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    /// Total capacity
    pub capacity: usize,
    /// Bytes left to read
    pub leftovers: usize,
    /// Free bytes
    pub avail_space: usize,
    /// Read end closed
    pub reader_closed: bool,
    /// Write end closed
    pub writer_closed: bool,
    /// Storage already released
    pub released: bool,
}

struct PipeInner<const CAP: usize> {
    /// `None` once both ends are closed
    ring: Option<RingBuffer<CAP>>,
    flags: PipeFlags,
}

/// Pipe control block
struct Pipe<const CAP: usize> {
    id: PipeId,
    sched: Arc<dyn Scheduler>,
    inner: Mutex<PipeInner<CAP>>,
    has_data: CondVar,
    has_space: CondVar,
}

impl<const CAP: usize> Pipe<CAP> {
    fn new(sched: Arc<dyn Scheduler>) -> Self {
        Self {
            id: PipeId::new(),
            sched,
            inner: Mutex::new(PipeInner {
                ring: Some(RingBuffer::new()),
                flags: PipeFlags::empty(),
            }),
            has_data: CondVar::new(),
            has_space: CondVar::new(),
        }
    }

    fn write(&self, src: &[u8]) -> IpcResult<usize> {
        let inner = self.inner.lock();
        if inner.flags.contains(PipeFlags::WRITER_CLOSED) {
            return Err(IpcError::WriterClosed);
        }
        if src.is_empty() {
            return Ok(0);
        }

        let mut inner = self.has_space.wait_while(
            &*self.sched,
            &self.inner,
            inner,
            BlockReason::PipeWrite,
            |p| {
                !p.flags.contains(PipeFlags::READER_CLOSED)
                    && p.ring.as_ref().is_some_and(|ring| ring.is_full())
            },
        )?;

        if inner.flags.contains(PipeFlags::READER_CLOSED) {
            return Err(IpcError::BrokenPipe);
        }
        if inner.flags.contains(PipeFlags::WRITER_CLOSED) {
            return Err(IpcError::WriterClosed);
        }
        let ring = inner.ring.as_mut().ok_or(IpcError::WriterClosed)?;
        let written = ring.push(src);
        log::trace!("[pipe] {} wrote {}/{} bytes", self.id, written, src.len());
        drop(inner);

        self.has_data.broadcast(&*self.sched);
        Ok(written)
    }

    fn read(&self, dst: &mut [u8]) -> IpcResult<usize> {
        let inner = self.inner.lock();
        if inner.flags.contains(PipeFlags::READER_CLOSED) {
            return Err(IpcError::ReaderClosed);
        }
        if dst.is_empty() {
            return Ok(0);
        }

        let mut inner = self.has_data.wait_while(
            &*self.sched,
            &self.inner,
            inner,
            BlockReason::PipeRead,
            |p| {
                !p.flags.contains(PipeFlags::WRITER_CLOSED)
                    && p.ring.as_ref().is_some_and(|ring| ring.is_empty())
            },
        )?;

        if inner.flags.contains(PipeFlags::READER_CLOSED) {
            return Err(IpcError::ReaderClosed);
        }
        let ring = inner.ring.as_mut().ok_or(IpcError::ReaderClosed)?;
        if ring.is_empty() {
            // Write end closed and nothing left: end of stream.
            return Ok(0);
        }
        let read = ring.pop(dst);
        log::trace!("[pipe] {} read {}/{} bytes", self.id, read, dst.len());
        drop(inner);

        self.has_space.broadcast(&*self.sched);
        Ok(read)
    }

    /// Close one end. Only the open -> closed transition wakes the peer side.
    fn close(&self, end: PipeFlags) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.flags.contains(end) {
                return false;
            }
            inner.flags.insert(end);
            if inner.flags.contains(PipeFlags::READER_CLOSED | PipeFlags::WRITER_CLOSED) {
                inner.ring = None;
                log::debug!("[pipe] {} released", self.id);
            }
        }

        let woken = if end == PipeFlags::READER_CLOSED {
            self.has_space.broadcast(&*self.sched)
        } else {
            self.has_data.broadcast(&*self.sched)
        };
        log::debug!("[pipe] {} closed {:?}, {} waiter(s) woken", self.id, end, woken);
        true
    }

    fn stats(&self) -> PipeStats {
        let inner = self.inner.lock();
        let (leftovers, avail_space) = inner
            .ring
            .as_ref()
            .map_or((0, 0), |ring| (ring.len(), ring.available()));
        PipeStats {
            capacity: CAP,
            leftovers,
            avail_space,
            reader_closed: inner.flags.contains(PipeFlags::READER_CLOSED),
            writer_closed: inner.flags.contains(PipeFlags::WRITER_CLOSED),
            released: inner.ring.is_none(),
        }
    }
}

/// Create a pipe of [`PIPE_BUFFER_SIZE`] bytes.
pub fn pipe(sched: Arc<dyn Scheduler>) -> (PipeReader, PipeWriter) {
    channel::<PIPE_BUFFER_SIZE>(sched)
}

/// Create a pipe of `CAP` bytes.
pub fn channel<const CAP: usize>(sched: Arc<dyn Scheduler>) -> (PipeReader<CAP>, PipeWriter<CAP>) {
    let pipe = Arc::new(Pipe::<CAP>::new(sched));
    log::debug!("[pipe] {} created, capacity {}", pipe.id, CAP);
    (
        PipeReader { pipe: pipe.clone() },
        PipeWriter { pipe },
    )
}

/// Read end of a pipe. Closes on drop.
pub struct PipeReader<const CAP: usize = PIPE_BUFFER_SIZE> {
    pipe: Arc<Pipe<CAP>>,
}

impl<const CAP: usize> PipeReader<CAP> {
    /// Read up to `dst.len()` bytes, blocking while the pipe is empty and
    /// the write end is open.
    ///
    /// `Ok(0)` for a non-empty `dst` means end of stream.
    pub fn read(&self, dst: &mut [u8]) -> IpcResult<usize> {
        self.pipe.read(dst)
    }

    /// Close the read end. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.pipe.close(PipeFlags::READER_CLOSED)
    }

    /// Pipe this end belongs to
    pub fn id(&self) -> PipeId {
        self.pipe.id
    }

    /// Snapshot of the pipe
    pub fn stats(&self) -> PipeStats {
        self.pipe.stats()
    }
}

impl<const CAP: usize> Drop for PipeReader<CAP> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<const CAP: usize> fmt::Debug for PipeReader<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("id", &self.pipe.id)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Write end of a pipe. Closes on drop.
pub struct PipeWriter<const CAP: usize = PIPE_BUFFER_SIZE> {
    pipe: Arc<Pipe<CAP>>,
}

impl<const CAP: usize> PipeWriter<CAP> {
    /// Write as much of `src` as currently fits, blocking while the pipe is
    /// full and the read end is open.
    ///
    /// Short writes are normal; loop until everything is written.
    pub fn write(&self, src: &[u8]) -> IpcResult<usize> {
        self.pipe.write(src)
    }

    /// Write all of `src`, looping over short writes.
    pub fn write_all(&self, mut src: &[u8]) -> IpcResult<()> {
        while !src.is_empty() {
            let n = self.write(src)?;
            src = &src[n..];
        }
        Ok(())
    }

    /// Close the write end. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.pipe.close(PipeFlags::WRITER_CLOSED)
    }

    /// Pipe this end belongs to
    pub fn id(&self) -> PipeId {
        self.pipe.id
    }

    /// Snapshot of the pipe
    pub fn stats(&self) -> PipeStats {
        self.pipe.stats()
    }
}

impl<const CAP: usize> Drop for PipeWriter<CAP> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<const CAP: usize> fmt::Debug for PipeWriter<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter")
            .field("id", &self.pipe.id)
            .field("stats", &self.stats())
            .finish()
    }
}

static_assertions::assert_impl_all!(PipeReader: Send, Sync);
static_assertions::assert_impl_all!(PipeWriter: Send, Sync);
