//! # Process Management
//!
//! The slice of the process control block the thread core relies on: the
//! ordered collection of thread handles and the thread counter.

use crate::context::ContextState;
use crate::thread::ThreadHandle;
use crate::{ProcessId, ThreadId};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::RwLock;

/// Process structure
pub struct Process {
    /// Process ID
    id: ProcessId,
    /// Process name
    name: String,
    /// Main thread
    main_thread: RwLock<Option<ThreadId>>,
    /// Thread handles, in creation order
    threads: RwLock<Vec<Arc<ThreadHandle>>>,
    /// Threads ever started in this process
    threads_counter: AtomicUsize,
}

impl Process {
    /// Create a new process
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProcessId::new(),
            name: name.into(),
            main_thread: RwLock::new(None),
            threads: RwLock::new(Vec::new()),
            threads_counter: AtomicUsize::new(0),
        }
    }

    /// Get process ID
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Get process name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set main thread
    pub fn set_main_thread(&self, thread: ThreadId) {
        *self.main_thread.write() = Some(thread);
    }

    /// Get main thread
    pub fn main_thread(&self) -> Option<ThreadId> {
        *self.main_thread.read()
    }

    /// Append a handle to the thread collection
    pub fn insert_thread(&self, handle: Arc<ThreadHandle>) {
        self.threads.write().push(handle);
    }

    /// Look a handle up by id
    pub fn find_thread(&self, id: ThreadId) -> Option<Arc<ThreadHandle>> {
        self.threads.read().iter().find(|h| h.id() == id).cloned()
    }

    /// Membership test
    pub fn contains_thread(&self, id: ThreadId) -> bool {
        self.threads.read().iter().any(|h| h.id() == id)
    }

    /// Remove a handle from the collection
    pub fn remove_thread(&self, id: ThreadId) -> Option<Arc<ThreadHandle>> {
        let mut threads = self.threads.write();
        let pos = threads.iter().position(|h| h.id() == id)?;
        Some(threads.remove(pos))
    }

    /// Ids of every handle currently in the collection
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.read().iter().map(|h| h.id()).collect()
    }

    /// Number of handles currently in the collection
    pub fn handle_count(&self) -> usize {
        self.threads.read().len()
    }

    /// Count a newly started thread
    pub fn count_thread(&self) -> usize {
        self.threads_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Threads ever started in this process
    pub fn thread_count(&self) -> usize {
        self.threads_counter.load(Ordering::SeqCst)
    }

    /// Drop a handle from the collection if it is exited and unreferenced.
    ///
    /// Safe to call after any reference-count decrement; returns whether the
    /// handle was reclaimed.
    pub fn reclaim_thread(&self, handle: &ThreadHandle) -> bool {
        if !handle.is_reclaimable() {
            return false;
        }
        debug_assert!(
            handle
                .context()
                .map_or(true, |ctx| ctx.state() == ContextState::Exited),
            "handle reclaimed before its context was torn down"
        );
        match self.remove_thread(handle.id()) {
            Some(_) => {
                log::debug!("[thread] {} reclaimed from process {}", handle.id(), self.name);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handles", &self.handle_count())
            .field("threads_counter", &self.thread_count())
            .finish()
    }
}
