//! # Cooperative Scheduler Implementation
//!
//! Every execution context is backed by a host thread, but only the context
//! holding the CPU token runs; all others sleep on the hand-off condvar until
//! the token is passed to them. Control changes hands only inside `block`,
//! `yield_now` and context exit, which gives the kernel the same
//! one-runnable-at-a-time model as a uniprocessor.

use crate::CoopConfig;
use cinder_execution::context::{BlockReason, ContextFlags, ContextState, EntryPoint, ExecContext};
use cinder_execution::process::Process;
use cinder_execution::scheduler::{Scheduler, SchedulerMetrics, SchedulerStats};
use cinder_execution::thread;
use cinder_execution::{ExecError, ExecResult, ThreadId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

thread_local! {
    /// Context backed by the calling host thread
    static CURRENT: RefCell<Option<Arc<ExecContext>>> = const { RefCell::new(None) };
}

/// Unwind payload that carries a context out of its entry point
struct ContextExit;

/// The CPU token and the queues around it
struct Cpu {
    /// Context holding the CPU
    running: Option<Arc<ExecContext>>,
    /// Runnable contexts, FIFO
    ready: VecDeque<Arc<ExecContext>>,
    /// Exited contexts awaiting teardown
    zombies: Vec<Arc<ExecContext>>,
    /// Contexts in `Stopped`
    blocked: usize,
    /// Contexts not yet exited
    live: usize,
}

impl Cpu {
    fn is_running(&self, ctx: &Arc<ExecContext>) -> bool {
        self.running.as_ref().is_some_and(|r| Arc::ptr_eq(r, ctx))
    }
}

/// Cooperative scheduler
pub struct CoopScheduler {
    /// Configuration
    config: CoopConfig,
    /// Self reference handed to spawned host threads
    this: Weak<CoopScheduler>,
    /// CPU token and queues
    cpu: Mutex<Cpu>,
    /// Signalled whenever the token moves
    handoff: Condvar,
    /// Statistics
    metrics: SchedulerMetrics,
}

impl CoopScheduler {
    /// Create a new scheduler
    pub fn new(config: CoopConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            cpu: Mutex::new(Cpu {
                running: None,
                ready: VecDeque::new(),
                zombies: Vec::new(),
                blocked: 0,
                live: 0,
            }),
            handoff: Condvar::new(),
            metrics: SchedulerMetrics::new(),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &CoopConfig {
        &self.config
    }

    /// Adopt the calling host thread as a running context of `process`.
    ///
    /// Fails if some context already holds the CPU. An adopted context has no
    /// entry frame of its own; exiting it unwinds the calling host thread.
    pub fn boot(&self, process: Arc<Process>) -> ExecResult<Arc<ExecContext>> {
        let ctx = {
            let mut cpu = self.cpu.lock();
            if cpu.running.is_some() {
                return Err(ExecError::AlreadyExists);
            }
            let ctx = Arc::new(ExecContext::new(process, None));
            ctx.set_flag(ContextFlags::ADOPTED);
            ctx.set_state(ContextState::Running);
            cpu.running = Some(ctx.clone());
            cpu.live += 1;
            ctx
        };
        CURRENT.with(|current| *current.borrow_mut() = Some(ctx.clone()));
        log::info!("[coop] booted process {} on {}", ctx.process().name(), ctx.id());
        Ok(ctx)
    }

    /// Create a process, adopt the calling host thread into it and give it
    /// its main thread handle.
    pub fn boot_process(&self, name: &str) -> ExecResult<ThreadId> {
        self.boot(Arc::new(Process::new(name)))?;
        thread::boot_main_thread(self)
    }

    /// Pass the CPU to the next ready context, or leave it idle.
    fn dispatch(&self, cpu: &mut Cpu) {
        let next = cpu.ready.pop_front();
        match &next {
            Some(ctx) => {
                ctx.set_state(ContextState::Running);
                self.metrics.record_context_switch();
                log::trace!("[coop] switch to {}", ctx.id());
            }
            None => log::warn!("[coop] no runnable context ({} blocked)", cpu.blocked),
        }
        cpu.running = next;
        self.handoff.notify_all();
    }

    /// Sleep until `me` holds the CPU, then tear down contexts that exited
    /// in the meantime.
    fn wait_for_cpu(&self, mut cpu: MutexGuard<'_, Cpu>, me: &Arc<ExecContext>) {
        while !cpu.is_running(me) {
            self.handoff.wait(&mut cpu);
        }
        let zombies = std::mem::take(&mut cpu.zombies);
        drop(cpu);
        for zombie in zombies {
            zombie.reclaim(self);
        }
    }

    /// Body of every spawned host thread
    fn run_context(self: Arc<Self>, ctx: Arc<ExecContext>) {
        CURRENT.with(|current| *current.borrow_mut() = Some(ctx.clone()));
        let cpu = self.cpu.lock();
        self.wait_for_cpu(cpu, &ctx);

        if let Some(entry) = ctx.entry() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&*self)));
            if let Err(payload) = outcome {
                if !payload.is::<ContextExit>() {
                    log::error!("[coop] {} panicked", ctx.id());
                }
            }
        }

        self.retire(&ctx);
        CURRENT.with(|current| current.borrow_mut().take());
    }

    /// Mark the running context exited and give the CPU away for good.
    fn retire(&self, ctx: &Arc<ExecContext>) {
        let mut cpu = self.cpu.lock();
        debug_assert!(cpu.is_running(ctx));
        ctx.set_state(ContextState::Exited);
        cpu.live = cpu.live.saturating_sub(1);
        cpu.zombies.push(ctx.clone());
        log::trace!("[coop] {} exited", ctx.id());
        self.dispatch(&mut cpu);
    }
}

impl Scheduler for CoopScheduler {
    fn name(&self) -> &'static str {
        "cooperative"
    }

    fn spawn(&self, process: &Arc<Process>, entry: EntryPoint) -> ExecResult<Arc<ExecContext>> {
        let sched = self.this.upgrade().ok_or(ExecError::InvalidState)?;
        let ctx = Arc::new(ExecContext::new(process.clone(), Some(entry)));
        let thread_ctx = ctx.clone();

        std::thread::Builder::new()
            .name(self.config.thread_name(ctx.id().as_u64()))
            .stack_size(self.config.stack_size)
            .spawn(move || sched.run_context(thread_ctx))
            .map_err(|err| {
                log::error!("[coop] cannot back {} with a host thread: {}", ctx.id(), err);
                ExecError::OutOfResources
            })?;

        self.cpu.lock().live += 1;
        log::trace!("[coop] spawned {} for process {}", ctx.id(), process.name());
        Ok(ctx)
    }

    fn wakeup(&self, ctx: &Arc<ExecContext>) -> bool {
        let mut cpu = self.cpu.lock();
        let woken = match ctx.state() {
            ContextState::Init => true,
            ContextState::Stopped => {
                cpu.blocked = cpu.blocked.saturating_sub(1);
                true
            }
            ContextState::Running => {
                ctx.set_flag(ContextFlags::WAKEUP_PENDING);
                false
            }
            ContextState::Ready | ContextState::Exited => false,
        };
        if woken {
            ctx.set_state(ContextState::Ready);
            cpu.ready.push_back(ctx.clone());
            if cpu.running.is_none() {
                self.dispatch(&mut cpu);
            }
        }
        woken
    }

    fn current(&self) -> Option<Arc<ExecContext>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    fn block(&self, reason: BlockReason) {
        let Some(me) = self.current() else {
            return;
        };
        let mut cpu = self.cpu.lock();
        if me.take_flag(ContextFlags::WAKEUP_PENDING) {
            return;
        }
        me.set_state(ContextState::Stopped);
        cpu.blocked += 1;
        self.metrics.record_block();
        log::trace!("[coop] {} blocked on {:?}", me.id(), reason);
        self.dispatch(&mut cpu);
        self.wait_for_cpu(cpu, &me);
    }

    fn yield_now(&self) {
        let Some(me) = self.current() else {
            return;
        };
        let mut cpu = self.cpu.lock();
        self.metrics.record_yield();
        if cpu.ready.is_empty() {
            return;
        }
        me.set_state(ContextState::Ready);
        cpu.ready.push_back(me.clone());
        self.dispatch(&mut cpu);
        self.wait_for_cpu(cpu, &me);
    }

    /// Spawned contexts unwind back to their entry frame. An adopted context
    /// gives up the CPU first and then unwinds the host thread that booted
    /// it, with a payload only this scheduler recognises.
    fn exit_current(&self) -> ! {
        if let Some(me) = self.current() {
            if me.flags().contains(ContextFlags::ADOPTED) {
                log::warn!("[coop] adopted context {} exiting", me.id());
                self.retire(&me);
                CURRENT.with(|current| current.borrow_mut().take());
            }
        }
        panic::resume_unwind(Box::new(ContextExit))
    }

    fn stats(&self) -> SchedulerStats {
        let cpu = self.cpu.lock();
        SchedulerStats {
            context_switches: self.metrics.context_switches(),
            voluntary_yields: self.metrics.voluntary_yields(),
            blocks: self.metrics.blocks(),
            runnable_contexts: cpu.ready.len(),
            blocked_contexts: cpu.blocked,
            live_contexts: cpu.live,
        }
    }
}

impl fmt::Debug for CoopScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoopScheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
