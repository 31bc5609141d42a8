//! # Cinder Execution Subsystem
//!
//! The execution subsystem manages:
//! - Thread handles and their create/join/detach/exit lifecycle
//! - Execution contexts (the schedulable units behind thread handles)
//! - The per-process thread collection
//! - Condition variables built on the scheduler's block/wakeup primitives
//!
//! ## Key Principle
//!
//! This subsystem provides the thread lifecycle, not the scheduler.
//! The scheduler is plugged in through the [`scheduler::Scheduler`] trait,
//! and every operation takes the scheduler it runs on.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod context;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod thread;

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for thread handles
///
/// Identifiers are handed out from a monotonic counter and never reused, so a
/// stale id can only fail to resolve; it can never name a different thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Create a new thread ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Unique identifier for execution contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new context ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0)
    }
}

/// Unique identifier for processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Create a new process ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Handle is not in the current process's thread collection
    ThreadNotFound,
    /// A thread tried to join itself
    SelfJoin,
    /// Target is detached, or was detached while being joined
    Detached,
    /// Target already exited
    AlreadyExited,
    /// Calling context is already stopped or terminated
    CallerStopped,
    /// Caller is not running on an execution context
    NoCurrentContext,
    /// Out of resources
    OutOfResources,
    /// Already exists
    AlreadyExists,
    /// Invalid state
    InvalidState,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ExecError::ThreadNotFound => "thread not found in current process",
            ExecError::SelfJoin => "thread cannot join itself",
            ExecError::Detached => "thread is detached",
            ExecError::AlreadyExited => "thread already exited",
            ExecError::CallerStopped => "calling context is stopped",
            ExecError::NoCurrentContext => "no current execution context",
            ExecError::OutOfResources => "out of resources",
            ExecError::AlreadyExists => "already exists",
            ExecError::InvalidState => "invalid state",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_thread_ids_are_unique() {
        let a = ThreadId::new();
        let b = ThreadId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ExecError::SelfJoin.to_string(), "thread cannot join itself");
        assert_eq!(ExecError::Detached.to_string(), "thread is detached");
    }
}
