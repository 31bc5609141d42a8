//! # Thread Operations
//!
//! Create, self, join, detach and exit, as seen from the running context.
//!
//! Exit is a two-phase handshake. [`exit_thread`] stores the exit value and
//! wakes joiners at once; the handle only becomes `Exited` when the
//! scheduler tears the context down and calls [`ExecContext::reclaim`]. A
//! joiner therefore never frees a handle whose context is still being
//! dismantled.
//!
//! [`ExecContext::reclaim`]: crate::context::ExecContext::reclaim

use super::{HandleFlags, Task, ThreadHandle};
use crate::context::ExecContext;
use crate::scheduler::Scheduler;
use crate::{ExecError, ExecResult, ThreadId};
use alloc::sync::Arc;

fn current_context(sched: &dyn Scheduler) -> ExecResult<Arc<ExecContext>> {
    sched.current().ok_or(ExecError::NoCurrentContext)
}

/// Create a thread in the current process.
///
/// With a task, a new execution context running [`start_thread`] is spawned,
/// bound to the handle and made runnable. Without one, only a placeholder
/// handle is recorded. Either way the handle is in the process's collection
/// before this returns.
pub fn create_thread(sched: &dyn Scheduler, task: Option<Task>, args: &[u8]) -> ExecResult<ThreadId> {
    let process = current_context(sched)?.process().clone();
    let spawn = task.is_some();
    let handle = Arc::new(ThreadHandle::new(&process, task, args, HandleFlags::empty()));

    let ctx = if spawn {
        let ctx = sched.spawn(&process, start_thread)?;
        handle.bind_context(&ctx);
        process.count_thread();
        Some(ctx)
    } else {
        None
    };

    process.insert_thread(handle.clone());
    if let Some(ctx) = ctx {
        sched.wakeup(&ctx);
    }

    log::debug!(
        "[thread] created {} in process {} (argl {}, spawned: {})",
        handle.id(),
        process.name(),
        handle.argl(),
        spawn
    );
    Ok(handle.id())
}

/// Build the main-thread handle for the calling context.
///
/// Called once at process bootstrap, on the context that will run the
/// process's main task.
pub fn boot_main_thread(sched: &dyn Scheduler) -> ExecResult<ThreadId> {
    let ctx = current_context(sched)?;
    if ctx.handle().is_some() {
        return Err(ExecError::AlreadyExists);
    }
    let process = ctx.process().clone();
    let handle = Arc::new(ThreadHandle::new(&process, None, &[], HandleFlags::MAIN));
    handle.bind_context(&ctx);
    process.count_thread();
    process.set_main_thread(handle.id());
    process.insert_thread(handle.clone());
    log::debug!("[thread] main thread {} of process {}", handle.id(), process.name());
    Ok(handle.id())
}

/// Handle of the calling thread, found through the context's back-link.
pub fn current_handle(sched: &dyn Scheduler) -> Option<Arc<ThreadHandle>> {
    sched.current()?.handle()
}

/// Id of the calling thread.
pub fn thread_self(sched: &dyn Scheduler) -> ExecResult<ThreadId> {
    current_handle(sched)
        .map(|handle| handle.id())
        .ok_or(ExecError::NoCurrentContext)
}

/// Wait for a thread of the current process to exit and return its exit value.
///
/// Fails without blocking if `tid` is not in the current process, is the
/// caller itself, is detached, or if the caller's context is already stopped.
/// A join released by a detach fails with [`ExecError::Detached`].
pub fn join_thread(sched: &dyn Scheduler, tid: ThreadId) -> ExecResult<i32> {
    let current = current_context(sched)?;
    let process = current.process().clone();
    let handle = process.find_thread(tid).ok_or(ExecError::ThreadNotFound)?;

    if current.handle().is_some_and(|me| me.id() == tid) {
        return Err(ExecError::SelfJoin);
    }
    if current.state().is_stopped() {
        return Err(ExecError::CallerStopped);
    }

    let outcome = handle.join(sched);
    process.reclaim_thread(&handle);

    match outcome {
        Ok(exit_value) => log::debug!("[thread] joined {} -> {}", tid, exit_value),
        Err(err) => log::debug!("[thread] join of {} failed: {}", tid, err),
    }
    outcome
}

/// Detach a thread of the current process.
///
/// Joiners already blocked on it are woken and fail; later joins fail at once.
pub fn detach_thread(sched: &dyn Scheduler, tid: ThreadId) -> ExecResult<()> {
    let process = current_context(sched)?.process().clone();
    let handle = process.find_thread(tid).ok_or(ExecError::ThreadNotFound)?;
    handle.detach(sched)
}

/// Terminate the calling thread with `exit_value`.
///
/// How the context leaves is up to the scheduler. On a hosted scheduler a
/// context adopted from an existing host thread (the bootstrap main thread)
/// has no entry frame to return to; exiting it unwinds that host thread's
/// own stack, so its caller must be prepared to catch the unwind.
pub fn exit_thread(sched: &dyn Scheduler, exit_value: i32) -> ! {
    if let Some(handle) = current_handle(sched) {
        log::debug!("[thread] {} exiting with {}", handle.id(), exit_value);
        handle.publish_exit(sched, exit_value);
    }
    sched.exit_current()
}

/// Entry point of every spawned thread context.
///
/// Runs the handle's task on its argument payload and exits with the task's
/// return value.
pub fn start_thread(sched: &dyn Scheduler) {
    let Some(handle) = current_handle(sched) else {
        log::error!("[thread] context started without a thread handle");
        sched.exit_current()
    };
    let task = handle.take_task();
    let exit_value = match task {
        Some(task) => task(handle.args()),
        None => 0,
    };
    drop(handle);
    exit_thread(sched, exit_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BlockReason, ContextState, EntryPoint};
    use crate::process::Process;
    use crate::scheduler::SchedulerStats;
    use alloc::boxed::Box;

    /// Scheduler pinned to one context that never switches away.
    struct PinnedScheduler {
        current: Arc<ExecContext>,
    }

    impl PinnedScheduler {
        fn new(name: &str) -> Self {
            let ctx = Arc::new(ExecContext::new(Arc::new(Process::new(name)), None));
            ctx.set_state(ContextState::Running);
            Self { current: ctx }
        }

        fn process(&self) -> Arc<Process> {
            self.current.process().clone()
        }
    }

    impl Scheduler for PinnedScheduler {
        fn name(&self) -> &'static str {
            "pinned"
        }

        fn spawn(&self, _process: &Arc<Process>, _entry: EntryPoint) -> ExecResult<Arc<ExecContext>> {
            Err(ExecError::OutOfResources)
        }

        fn wakeup(&self, _ctx: &Arc<ExecContext>) -> bool {
            false
        }

        fn current(&self) -> Option<Arc<ExecContext>> {
            Some(self.current.clone())
        }

        fn block(&self, _reason: BlockReason) {}

        fn yield_now(&self) {}

        fn exit_current(&self) -> ! {
            panic!("pinned scheduler cannot exit");
        }

        fn stats(&self) -> SchedulerStats {
            SchedulerStats::default()
        }
    }

    #[test]
    fn test_stopped_caller_cannot_join() {
        let sched = PinnedScheduler::new("stopped-caller");
        boot_main_thread(&sched).unwrap();
        let tid = create_thread(&sched, None, &[]).unwrap();

        sched.current.set_state(ContextState::Stopped);
        assert_eq!(join_thread(&sched, tid), Err(ExecError::CallerStopped));
        assert_eq!(sched.process().find_thread(tid).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_spawn_failure_leaves_no_handle() {
        let sched = PinnedScheduler::new("no-spawn");
        let task: Task = Box::new(|_: &[u8]| 0);

        assert_eq!(
            create_thread(&sched, Some(task), &[]),
            Err(ExecError::OutOfResources)
        );
        assert_eq!(sched.process().handle_count(), 0);
        assert_eq!(sched.process().thread_count(), 0);
    }

    #[test]
    fn test_main_thread_booted_once() {
        let sched = PinnedScheduler::new("main");
        let main = boot_main_thread(&sched).unwrap();

        assert_eq!(thread_self(&sched), Ok(main));
        assert_eq!(sched.process().main_thread(), Some(main));
        assert_eq!(boot_main_thread(&sched), Err(ExecError::AlreadyExists));
    }
}
