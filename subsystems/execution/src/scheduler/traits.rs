//! # Scheduler Traits
//!
//! Defines the trait that scheduler implementations must implement.

use crate::context::{BlockReason, EntryPoint, ExecContext};
use crate::process::Process;
use crate::ExecResult;
use alloc::sync::Arc;

/// The scheduler primitives consumed by the thread core
///
/// Scheduling is cooperative: at most one context runs at a time and control
/// only changes hands inside [`Scheduler::block`], [`Scheduler::yield_now`]
/// and [`Scheduler::exit_current`].
pub trait Scheduler: Send + Sync {
    /// Get the scheduler name
    fn name(&self) -> &'static str;

    /// Allocate a context bound to `process` that will run `entry`.
    ///
    /// The context stays in `Init` until it is woken.
    fn spawn(&self, process: &Arc<Process>, entry: EntryPoint) -> ExecResult<Arc<ExecContext>>;

    /// Make a context runnable.
    ///
    /// Returns `false` if the context was not waiting. A wakeup aimed at the
    /// running context is remembered, and its next [`Scheduler::block`]
    /// returns immediately.
    fn wakeup(&self, ctx: &Arc<ExecContext>) -> bool;

    /// The context running on the caller's behalf
    fn current(&self) -> Option<Arc<ExecContext>>;

    /// Give up the CPU until woken
    fn block(&self, reason: BlockReason);

    /// Give up the CPU, staying runnable
    fn yield_now(&self);

    /// Terminate the current context. Never returns.
    ///
    /// Once the context has been switched away from, the scheduler calls
    /// [`ExecContext::reclaim`] on it.
    fn exit_current(&self) -> !;

    /// Get scheduler statistics
    fn stats(&self) -> SchedulerStats;
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total number of context switches
    pub context_switches: u64,
    /// Total voluntary yields
    pub voluntary_yields: u64,
    /// Total blocking waits
    pub blocks: u64,
    /// Number of contexts currently runnable
    pub runnable_contexts: usize,
    /// Number of contexts currently blocked
    pub blocked_contexts: usize,
    /// Number of contexts not yet exited
    pub live_contexts: usize,
}
