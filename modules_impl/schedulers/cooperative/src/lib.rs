//! # Cooperative Scheduler Module
//!
//! A hosted, cooperative scheduler for Cinder.
//!
//! ## Features
//! - One host thread per execution context, one CPU token between them
//! - FIFO ready queue, no preemption
//! - Context switches only at `block`, `yield_now` and exit
//! - Deferred teardown: exited contexts are reclaimed by the next context
//!   that gets the CPU
//!
//! ## Usage
//!
//! Create the scheduler, adopt the calling thread with
//! [`CoopScheduler::boot_process`], then drive the thread and pipe
//! subsystems through it as a `&dyn Scheduler`.

#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod scheduler;

pub use config::CoopConfig;
pub use scheduler::CoopScheduler;

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_execution::context::ContextState;
    use cinder_execution::process::Process;
    use cinder_execution::scheduler::Scheduler;
    use cinder_execution::ExecError;
    use std::sync::Arc;

    #[test]
    fn test_boot_adopts_caller() {
        let sched = CoopScheduler::new(CoopConfig::compact());
        let ctx = sched.boot(Arc::new(Process::new("boot"))).unwrap();

        assert_eq!(ctx.state(), ContextState::Running);
        let current = sched.current().unwrap();
        assert!(Arc::ptr_eq(&current, &ctx));
        assert_eq!(sched.stats().live_contexts, 1);
    }

    #[test]
    fn test_second_boot_rejected() {
        let sched = CoopScheduler::new(CoopConfig::compact());
        sched.boot(Arc::new(Process::new("first"))).unwrap();
        assert_eq!(
            sched.boot(Arc::new(Process::new("second"))).unwrap_err(),
            ExecError::AlreadyExists
        );
    }

    #[test]
    fn test_yield_without_peers_keeps_cpu() {
        let sched = CoopScheduler::new(CoopConfig::compact());
        let ctx = sched.boot(Arc::new(Process::new("alone"))).unwrap();

        sched.yield_now();
        assert_eq!(ctx.state(), ContextState::Running);
        let stats = sched.stats();
        assert_eq!(stats.voluntary_yields, 1);
        assert_eq!(stats.context_switches, 0);
    }

    #[test]
    fn test_wakeup_of_running_context_is_remembered() {
        let sched = CoopScheduler::new(CoopConfig::compact());
        let ctx = sched.boot(Arc::new(Process::new("pending"))).unwrap();

        assert!(!sched.wakeup(&ctx));
        // Consumes the pending wakeup instead of stopping.
        sched.block(cinder_execution::context::BlockReason::Other);
        assert_eq!(ctx.state(), ContextState::Running);
        assert_eq!(sched.stats().blocks, 0);
    }

    #[test]
    fn test_adopted_exit_unwinds_boot_thread() {
        use cinder_execution::thread::{current_handle, exit_thread};
        use std::panic::{self, AssertUnwindSafe};

        let sched = CoopScheduler::new(CoopConfig::compact());
        sched.boot_process("adopted-exit").unwrap();
        let main = current_handle(&*sched).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| exit_thread(&*sched, 3)));
        assert!(outcome.is_err());
        assert!(sched.current().is_none());
        assert_eq!(main.exit_value(), 3);
        let stats = sched.stats();
        assert_eq!(stats.live_contexts, 0);
        assert_eq!(stats.runnable_contexts, 0);
    }

    #[test]
    fn test_spawned_context_runs_on_yield() {
        fn entry(sched: &dyn Scheduler) {
            let me = sched.current().unwrap();
            me.process().count_thread();
        }

        let sched = CoopScheduler::new(CoopConfig::compact());
        let main = sched.boot(Arc::new(Process::new("spawn"))).unwrap();
        let process = main.process().clone();

        let ctx = sched.spawn(&process, entry).unwrap();
        assert_eq!(ctx.state(), ContextState::Init);
        assert!(sched.wakeup(&ctx));
        assert_eq!(sched.stats().runnable_contexts, 1);

        sched.yield_now();
        assert_eq!(process.thread_count(), 1);
        assert_eq!(ctx.state(), ContextState::Exited);
        assert_eq!(sched.stats().live_contexts, 1);
        assert_eq!(sched.stats().context_switches, 2);
    }
}
