//! # Condition Variable
//!
//! A wait queue of execution contexts. Waiting always happens in a loop
//! over a condition, and waking is always a broadcast: every waiter re-checks
//! its own condition after it runs again, so releasing several waiters at
//! once (detach, pipe close) is safe.

use crate::context::{BlockReason, ExecContext};
use crate::scheduler::Scheduler;
use crate::{ExecError, ExecResult};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::fmt;
use spin::{Mutex, MutexGuard};

/// A condition variable
pub struct CondVar {
    waiters: Mutex<VecDeque<Arc<ExecContext>>>,
}

impl CondVar {
    /// Creates a new condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks the current context while `condition` returns `true`.
    ///
    /// `guard` must come from `mutex`. The caller is queued before the guard
    /// is released, so a broadcast issued between the release and the block
    /// is not lost. When woken the mutex is re-acquired and the condition
    /// re-evaluated; the returned guard is held with the condition false.
    pub fn wait_while<'a, T>(
        &self,
        sched: &dyn Scheduler,
        mutex: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        reason: BlockReason,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> ExecResult<MutexGuard<'a, T>> {
        while condition(&mut *guard) {
            let me = sched.current().ok_or(ExecError::NoCurrentContext)?;
            self.enqueue(me);
            drop(guard);
            sched.block(reason);
            guard = mutex.lock();
        }
        Ok(guard)
    }

    /// Wakes every context blocked on this condition variable.
    ///
    /// Returns the number of contexts woken.
    pub fn broadcast(&self, sched: &dyn Scheduler) -> usize {
        let waiters = core::mem::take(&mut *self.waiters.lock());
        let mut woken = 0;
        for ctx in waiters {
            if sched.wakeup(&ctx) {
                woken += 1;
            }
        }
        woken
    }

    /// Number of contexts currently queued
    pub fn waiters(&self) -> usize {
        self.waiters.lock().len()
    }

    fn enqueue(&self, ctx: Arc<ExecContext>) {
        let mut waiters = self.waiters.lock();
        if !waiters.iter().any(|w| Arc::ptr_eq(w, &ctx)) {
            waiters.push_back(ctx);
        }
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CondVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondVar")
            .field("waiters", &self.waiters())
            .finish()
    }
}
