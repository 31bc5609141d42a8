//! # Thread Handle
//!
//! The process-level thread control block. A handle outlives its execution
//! context: joiners keep talking to the handle after the context is gone,
//! and the handle is only dropped from its process once it is `Exited` with
//! no outstanding references.

use super::HandleState;
use crate::context::{BlockReason, ExecContext};
use crate::process::Process;
use crate::scheduler::Scheduler;
use crate::sync::CondVar;
use crate::{ExecError, ExecResult, ThreadId};
use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use spin::{Mutex, RwLock};

/// Body of a thread: receives the argument payload, returns the exit value
pub type Task = Box<dyn FnOnce(&[u8]) -> i32 + Send + 'static>;

/// Handle flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Handle flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct HandleFlags: u32 {
            /// Handle of the process's main thread
            const MAIN = 1 << 0;
        }
    }
}

pub use flags::HandleFlags;

/// Mutable lifecycle fields, always accessed together
#[derive(Debug)]
struct HandleInner {
    state: HandleState,
    exit_value: i32,
    ref_count: usize,
    /// The initial reference has been handed back by a successful join
    collected: bool,
}

/// Thread handle (PTCB)
pub struct ThreadHandle {
    /// Unique identifier
    id: ThreadId,
    /// Owning process
    process: Weak<Process>,
    /// Execution context, absent for placeholders and after teardown
    context: RwLock<Weak<ExecContext>>,
    /// Task, taken once by the trampoline
    task: Mutex<Option<Task>>,
    /// Argument payload
    args: Vec<u8>,
    /// State, exit value and reference count
    inner: Mutex<HandleInner>,
    /// Joiners wait here
    cv: CondVar,
    /// Flags
    flags: HandleFlags,
}

impl ThreadHandle {
    /// Create a handle holding one reference, in state `Init`
    pub fn new(
        process: &Arc<Process>,
        task: Option<Task>,
        args: &[u8],
        flags: HandleFlags,
    ) -> Self {
        Self {
            id: ThreadId::new(),
            process: Arc::downgrade(process),
            context: RwLock::new(Weak::new()),
            task: Mutex::new(task),
            args: args.to_vec(),
            inner: Mutex::new(HandleInner {
                state: HandleState::Init,
                exit_value: 0,
                ref_count: 1,
                collected: false,
            }),
            cv: CondVar::new(),
            flags,
        }
    }

    /// Get handle ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Get owning process
    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.upgrade()
    }

    /// Get the execution context, if it still exists
    pub fn context(&self) -> Option<Arc<ExecContext>> {
        self.context.read().upgrade()
    }

    /// Check if this is the process's main thread
    pub fn is_main(&self) -> bool {
        self.flags.contains(HandleFlags::MAIN)
    }

    /// Get flags
    pub fn flags(&self) -> HandleFlags {
        self.flags
    }

    /// Argument payload
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Argument length
    pub fn argl(&self) -> usize {
        self.args.len()
    }

    /// Get current state
    pub fn state(&self) -> HandleState {
        self.inner.lock().state
    }

    /// Last exit value stored by the thread
    pub fn exit_value(&self) -> i32 {
        self.inner.lock().exit_value
    }

    /// Outstanding references
    pub fn ref_count(&self) -> usize {
        self.inner.lock().ref_count
    }

    /// Check whether the handle may be dropped from its process
    pub fn is_reclaimable(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == HandleState::Exited && inner.ref_count == 0
    }

    /// Number of joiners currently blocked on this handle
    pub fn waiters(&self) -> usize {
        self.cv.waiters()
    }

    pub(crate) fn take_task(&self) -> Option<Task> {
        self.task.lock().take()
    }

    /// Link handle and context both ways
    pub(crate) fn bind_context(self: &Arc<Self>, ctx: &Arc<ExecContext>) {
        *self.context.write() = Arc::downgrade(ctx);
        ctx.link_handle(self);
    }

    /// Register as a joiner, wait for a terminal state, and deregister.
    pub(crate) fn join(&self, sched: &dyn Scheduler) -> ExecResult<i32> {
        let mut guard = self.inner.lock();
        if guard.state == HandleState::Detached {
            return Err(ExecError::Detached);
        }
        guard.ref_count += 1;

        let waited = self.cv.wait_while(sched, &self.inner, guard, BlockReason::Join, |inner| {
            !inner.state.is_terminal()
        });
        let mut guard = match waited {
            Ok(guard) => guard,
            Err(err) => {
                let mut inner = self.inner.lock();
                inner.ref_count = inner.ref_count.saturating_sub(1);
                return Err(err);
            }
        };

        guard.ref_count = guard.ref_count.saturating_sub(1);
        match guard.state {
            HandleState::Exited => {
                // First successful join collects the exit status.
                if !guard.collected {
                    guard.collected = true;
                    guard.ref_count = guard.ref_count.saturating_sub(1);
                }
                Ok(guard.exit_value)
            }
            _ => Err(ExecError::Detached),
        }
    }

    /// Detach and release every blocked joiner.
    pub(crate) fn detach(&self, sched: &dyn Scheduler) -> ExecResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state == HandleState::Exited {
                return Err(ExecError::AlreadyExited);
            }
            debug_assert!(inner.state.can_transition_to(HandleState::Detached));
            inner.state = HandleState::Detached;
            inner.ref_count = 1;
        }
        let woken = self.cv.broadcast(sched);
        log::debug!("[thread] {} detached, {} joiner(s) released", self.id, woken);
        Ok(())
    }

    /// Publish the exit value and wake joiners. The state is left alone
    /// until the context is torn down.
    pub(crate) fn publish_exit(&self, sched: &dyn Scheduler, exit_value: i32) {
        self.inner.lock().exit_value = exit_value;
        self.cv.broadcast(sched);
    }

    /// Second half of exit, driven by the scheduler's teardown hook.
    ///
    /// Only the state moves; the initial reference stays until a join
    /// collects the exit value.
    pub(crate) fn context_reclaimed(&self, sched: &dyn Scheduler) {
        {
            let mut inner = self.inner.lock();
            if inner.state != HandleState::Detached {
                debug_assert!(inner.state.can_transition_to(HandleState::Exited));
                inner.state = HandleState::Exited;
            }
            log::debug!(
                "[thread] {} context gone, state {:?}, {} ref(s) left",
                self.id,
                inner.state,
                inner.ref_count
            );
        }
        self.cv.broadcast(sched);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: HandleState, ref_count: usize) {
        let mut inner = self.inner.lock();
        inner.state = state;
        inner.ref_count = ref_count;
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ThreadHandle")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("exit_value", &inner.exit_value)
            .field("ref_count", &inner.ref_count)
            .field("flags", &self.flags)
            .field("argl", &self.args.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(ThreadHandle: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntryPoint;
    use crate::scheduler::SchedulerStats;

    /// Scheduler with no contexts; enough for paths that never block.
    struct IdleScheduler;

    impl Scheduler for IdleScheduler {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn spawn(&self, _process: &Arc<Process>, _entry: EntryPoint) -> ExecResult<Arc<ExecContext>> {
            Err(ExecError::OutOfResources)
        }

        fn wakeup(&self, _ctx: &Arc<ExecContext>) -> bool {
            false
        }

        fn current(&self) -> Option<Arc<ExecContext>> {
            None
        }

        fn block(&self, _reason: BlockReason) {}

        fn yield_now(&self) {}

        fn exit_current(&self) -> ! {
            panic!("idle scheduler has no context to exit");
        }

        fn stats(&self) -> SchedulerStats {
            SchedulerStats::default()
        }
    }

    #[test]
    fn test_new_handle() {
        let process = Arc::new(Process::new("handle"));
        let task: Task = Box::new(|args: &[u8]| args.len() as i32);
        let handle = ThreadHandle::new(&process, Some(task), b"abc", HandleFlags::empty());

        assert_eq!(handle.state(), HandleState::Init);
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(handle.argl(), 3);
        assert!(!handle.is_main());
        assert!(handle.context().is_none());
        assert!(!handle.is_reclaimable());

        let task = handle.take_task().unwrap();
        assert_eq!(task(handle.args()), 3);
        assert!(handle.take_task().is_none());
    }

    #[test]
    fn test_handle_does_not_keep_process_alive() {
        let process = Arc::new(Process::new("weak"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::MAIN);
        assert!(handle.is_main());
        assert!(handle.process().is_some());
        drop(process);
        assert!(handle.process().is_none());
    }

    #[test]
    fn test_teardown_keeps_initial_reference() {
        let sched = IdleScheduler;
        let process = Arc::new(Process::new("teardown"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::empty());

        handle.publish_exit(&sched, 9);
        assert_eq!(handle.state(), HandleState::Init);
        handle.context_reclaimed(&sched);

        assert_eq!(handle.state(), HandleState::Exited);
        assert_eq!(handle.ref_count(), 1);
        assert!(!handle.is_reclaimable());
    }

    #[test]
    fn test_join_after_exit_collects_value() {
        let sched = IdleScheduler;
        let process = Arc::new(Process::new("collect"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::empty());
        handle.publish_exit(&sched, 42);
        handle.context_reclaimed(&sched);

        assert_eq!(handle.join(&sched), Ok(42));
        assert_eq!(handle.ref_count(), 0);
        assert!(handle.is_reclaimable());

        // The initial reference is only given back once.
        assert_eq!(handle.join(&sched), Ok(42));
        assert_eq!(handle.ref_count(), 0);
    }

    #[test]
    fn test_detach_after_exit_rejected() {
        let sched = IdleScheduler;
        let process = Arc::new(Process::new("late-detach"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::empty());
        handle.context_reclaimed(&sched);

        assert_eq!(handle.detach(&sched), Err(ExecError::AlreadyExited));
        assert_eq!(handle.state(), HandleState::Exited);
    }

    #[test]
    fn test_detached_handle_stays_detached_through_teardown() {
        let sched = IdleScheduler;
        let process = Arc::new(Process::new("detached-teardown"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::empty());

        assert_eq!(handle.detach(&sched), Ok(()));
        assert_eq!(handle.detach(&sched), Ok(()));
        handle.context_reclaimed(&sched);
        assert_eq!(handle.state(), HandleState::Detached);
        assert_eq!(handle.join(&sched), Err(ExecError::Detached));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_second_teardown_is_rejected() {
        let sched = IdleScheduler;
        let process = Arc::new(Process::new("double-teardown"));
        let handle = ThreadHandle::new(&process, None, &[], HandleFlags::empty());
        handle.context_reclaimed(&sched);
        handle.context_reclaimed(&sched);
    }
}
