//! # Cinder IPC Subsystem
//!
//! Bounded, blocking byte pipes between threads.
//!
//! A pipe is a fixed-capacity circular buffer with a read end and a write
//! end. Readers block while it is empty, writers block while it is full, and
//! each end can be closed on its own:
//! - closing the write end lets readers drain what is left, then see EOF
//! - closing the read end makes blocked and later writes fail with
//!   [`IpcError::BrokenPipe`]
//!
//! Transfers are short whenever the buffer cannot take or give the whole
//! request; callers loop.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod pipe;
pub mod ring;

pub use pipe::{channel, pipe, PipeReader, PipeStats, PipeWriter, PIPE_BUFFER_SIZE};
pub use ring::RingBuffer;

use cinder_execution::ExecError;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for pipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipeId(u64);

impl PipeId {
    /// Create a new pipe ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for PipeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe:{}", self.0)
    }
}

/// IPC result type
pub type IpcResult<T> = Result<T, IpcError>;

/// IPC errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// The read end is closed; nothing can be written
    BrokenPipe,
    /// Read on a closed read end
    ReaderClosed,
    /// Write on a closed write end
    WriterClosed,
    /// The execution layer refused to block
    Exec(ExecError),
}

impl From<ExecError> for IpcError {
    fn from(err: ExecError) -> Self {
        IpcError::Exec(err)
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::BrokenPipe => f.write_str("broken pipe"),
            IpcError::ReaderClosed => f.write_str("read end closed"),
            IpcError::WriterClosed => f.write_str("write end closed"),
            IpcError::Exec(err) => write!(f, "execution error: {}", err),
        }
    }
}
