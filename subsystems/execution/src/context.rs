//! # Execution Contexts
//!
//! The schedulable unit behind a thread handle. Contexts are created and
//! owned by the scheduler; the thread subsystem only links them to handles.

use crate::process::Process;
use crate::scheduler::Scheduler;
use crate::thread::ThreadHandle;
use crate::ContextId;
use alloc::sync::{Arc, Weak};
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::RwLock;

/// Entry point run by a freshly spawned context
pub type EntryPoint = fn(&dyn Scheduler);

/// Context flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Context flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ContextFlags: u32 {
            /// Context adopted an already running host thread at boot
            const ADOPTED = 1 << 0;
            /// A wakeup arrived while the context was still running
            const WAKEUP_PENDING = 1 << 1;
        }
    }
}

pub use flags::ContextFlags;

/// Scheduling state of an execution context (unit-only for atomic storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ContextState {
    /// Allocated, never run
    Init = 0,
    /// Waiting in the ready queue
    Ready = 1,
    /// Currently owns the CPU
    Running = 2,
    /// Blocked until explicitly woken
    Stopped = 3,
    /// Terminated, awaiting or past teardown
    Exited = 4,
}

impl ContextState {
    /// Convert from u32
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Ready),
            2 => Some(Self::Running),
            3 => Some(Self::Stopped),
            4 => Some(Self::Exited),
            _ => None,
        }
    }

    /// Convert to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if the context can be woken
    pub fn is_wakeable(&self) -> bool {
        matches!(self, ContextState::Init | ContextState::Stopped)
    }

    /// Check if the context has terminated
    pub fn is_terminated(&self) -> bool {
        matches!(self, ContextState::Exited)
    }

    /// Check if the context is stopped or has terminated
    pub fn is_stopped(&self) -> bool {
        matches!(self, ContextState::Stopped | ContextState::Exited)
    }
}

impl Default for ContextState {
    fn default() -> Self {
        ContextState::Init
    }
}

/// Reason a context gave up the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting for a thread to exit or be detached
    Join,
    /// Waiting for data in a pipe
    PipeRead,
    /// Waiting for space in a pipe
    PipeWrite,
    /// Other/unspecified
    Other,
}

/// Execution context (TCB)
pub struct ExecContext {
    /// Unique identifier
    id: ContextId,
    /// Owning process
    process: Arc<Process>,
    /// Current state
    state: AtomicU32,
    /// Flags
    flags: RwLock<ContextFlags>,
    /// Entry point, taken once by the scheduler
    entry: Option<EntryPoint>,
    /// Back-link to the thread handle; never keeps the handle alive
    handle: RwLock<Weak<ThreadHandle>>,
}

impl ExecContext {
    /// Create a new context
    pub fn new(process: Arc<Process>, entry: Option<EntryPoint>) -> Self {
        Self {
            id: ContextId::new(),
            process,
            state: AtomicU32::new(ContextState::Init as u32),
            flags: RwLock::new(ContextFlags::empty()),
            entry,
            handle: RwLock::new(Weak::new()),
        }
    }

    /// Get context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Get owning process
    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    /// Get entry point
    pub fn entry(&self) -> Option<EntryPoint> {
        self.entry
    }

    /// Get current state
    pub fn state(&self) -> ContextState {
        let val = self.state.load(Ordering::SeqCst);
        ContextState::from_u32(val).unwrap_or(ContextState::Exited)
    }

    /// Set context state
    pub fn set_state(&self, state: ContextState) {
        self.state.store(state.as_u32(), Ordering::SeqCst);
    }

    /// Get flags
    pub fn flags(&self) -> ContextFlags {
        *self.flags.read()
    }

    /// Set a flag
    pub fn set_flag(&self, flag: ContextFlags) {
        self.flags.write().insert(flag);
    }

    /// Clear a flag, returning whether it was set
    pub fn take_flag(&self, flag: ContextFlags) -> bool {
        let mut flags = self.flags.write();
        let was_set = flags.contains(flag);
        flags.remove(flag);
        was_set
    }

    /// Follow the back-link to the owning thread handle
    pub fn handle(&self) -> Option<Arc<ThreadHandle>> {
        self.handle.read().upgrade()
    }

    pub(crate) fn link_handle(&self, handle: &Arc<ThreadHandle>) {
        *self.handle.write() = Arc::downgrade(handle);
    }

    /// Teardown hook, called by the scheduler once this exited context has
    /// been switched away from for good.
    pub fn reclaim(&self, sched: &dyn Scheduler) {
        debug_assert_eq!(self.state(), ContextState::Exited);
        log::trace!("[thread] {} torn down", self.id);
        if let Some(handle) = self.handle() {
            handle.context_reclaimed(sched);
        }
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("id", &self.id)
            .field("process", &self.process.id())
            .field("state", &self.state())
            .field("flags", &self.flags())
            .finish()
    }
}

static_assertions::assert_impl_all!(ExecContext: Send, Sync);
