//! The scheduler core (spec §4.3): ready/sleep queue management,
//! preemption bookkeeping, and the thread-lifecycle API exposed to
//! external collaborators.
//!
//! The actual CPU register save/restore on a context switch is not this
//! crate's concern — `ArchContext` is an external collaborator trait with
//! no production implementation here, mirroring how this subsystem treats
//! the timer/block/page-table layers in `collaborators.rs`. What this
//! module owns is everything the scheduling *decision* depends on: queue
//! order, priority donation, and MLFQ recomputation.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::fixed_point::{self, Fixed};

use super::mlfq;
use super::queue::{ReadyQueue, SleepQueue};
use super::thread::{Location, Nice, Priority, Thread, ThreadId, ThreadStatus, NICE_MIN, NICE_MAX, PRI_MAX, PRI_MIN};

/// Sentinel returned by `create` on allocation failure (spec §4.3
/// "Failure semantics").
pub const TID_ERROR: ThreadId = 0;

/// Entry point a newly created thread would run; invoked by `ArchContext`
/// on first dispatch, never by the scheduler itself.
pub type EntryPoint = fn(usize);

/// The context-switch trampoline. Implementations save the outgoing
/// thread's register file and restore the incoming one's; this crate's
/// tests use a no-op fake since no real execution context exists under
/// the host test target.
pub trait ArchContext: Send + Sync {
    fn switch(&self, from: ThreadId, to: ThreadId);
}

/// A trampoline that performs no actual register save/restore.
pub struct NullContext;

impl ArchContext for NullContext {
    fn switch(&self, _from: ThreadId, _to: ThreadId) {}
}

struct SchedulerState {
    threads: BTreeMap<ThreadId, Arc<Thread>>,
    ready: ReadyQueue,
    sleeping: SleepQueue,
    current: Arc<Thread>,
}

/// The single-CPU scheduler. All mutation happens with a coarse lock held
/// (spec §5: "protected by disabling interrupts at the mutation site";
/// modeled here as a `spin::Mutex` since this crate does not itself own
/// an interrupt controller).
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    idle: Arc<Thread>,
    next_tid: AtomicU64,
    ticks: AtomicU64,
    mlfqs: AtomicBool,
    load_avg: Mutex<Fixed>,
    arch: Mutex<Arc<dyn ArchContext>>,
}

impl Scheduler {
    /// Boots the scheduler with a single running idle thread (tid 0,
    /// priority `PRI_MIN`), matching spec's bootstrap-thread convention.
    pub fn new(mlfqs: bool) -> Self {
        let idle = Thread::new(TID_ERROR, String::from("idle"), PRI_MIN);
        idle.set_status(ThreadStatus::Running);
        Self {
            state: Mutex::new(SchedulerState {
                threads: BTreeMap::new(),
                ready: ReadyQueue::new(),
                sleeping: SleepQueue::new(),
                current: idle.clone(),
            }),
            idle,
            next_tid: AtomicU64::new(1),
            ticks: AtomicU64::new(0),
            mlfqs: AtomicBool::new(mlfqs),
            load_avg: Mutex::new(0),
            arch: Mutex::new(Arc::new(NullContext)),
        }
    }

    pub fn set_arch_context(&self, arch: Arc<dyn ArchContext>) {
        *self.arch.lock() = arch;
    }

    pub fn mlfqs_enabled(&self) -> bool {
        self.mlfqs.load(Ordering::Relaxed)
    }

    pub fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn current(&self) -> Arc<Thread> {
        self.state.lock().current.clone()
    }

    pub fn thread(&self, tid: ThreadId) -> Option<Arc<Thread>> {
        self.state.lock().threads.get(&tid).cloned()
    }

    /// `create(name, priority, fn, aux)` (spec §4.3). `entry`/`aux` are
    /// recorded for the arch layer to dispatch on first run; this crate
    /// never invokes them.
    pub fn create(&self, name: &str, priority: Priority, _entry: EntryPoint, _aux: usize) -> ThreadId {
        let priority = priority.min(PRI_MAX);
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        let thread = Thread::new(tid, String::from(name), priority);
        if self.mlfqs_enabled() {
            thread.set_nice(0);
            thread.set_recent_cpu(0);
        }
        let mut state = self.state.lock();
        state.threads.insert(tid, thread.clone());
        thread.set_status(ThreadStatus::Ready);
        thread.set_location(Location::Ready);
        let preempt = thread.effective_priority() > state.current.effective_priority();
        state.ready.insert(thread);
        drop(state);
        log::debug!("created thread {tid} ({name}) at priority {priority}");
        if preempt {
            self.yield_now();
        }
        tid
    }

    /// Blocks the calling thread: marks it BLOCKED and switches away.
    /// Callers are responsible for having already placed `self` on the
    /// structure it is waiting on (sleep queue, lock waiters, ...).
    pub fn block(&self) {
        let current = self.current();
        assert_ne!(current.tid, self.idle.tid, "idle thread must never block");
        current.set_status(ThreadStatus::Blocked);
        self.switch_away(current);
    }

    /// Moves `thread` from BLOCKED to READY and inserts it in priority
    /// order; yields immediately if it now outranks the running thread
    /// (spec §4.2 semaphore `up`, §5 "ordering guarantees").
    pub fn unblock(&self, thread: Arc<Thread>) {
        thread.set_status(ThreadStatus::Ready);
        thread.set_location(Location::Ready);
        let mut state = self.state.lock();
        let should_yield = thread.effective_priority() > state.current.effective_priority();
        state.ready.insert(thread);
        drop(state);
        if should_yield {
            self.yield_now();
        }
    }

    /// Cooperative yield: re-enqueues the current thread as READY (unless
    /// it is the idle thread, which simply re-blocks) and dispatches the
    /// highest-priority ready thread.
    pub fn yield_now(&self) {
        let current = self.current();
        if core::ptr::eq(current.as_ref(), self.idle.as_ref()) {
            self.dispatch_next();
            return;
        }
        current.set_status(ThreadStatus::Ready);
        current.set_location(Location::Ready);
        let mut state = self.state.lock();
        state.ready.insert(current);
        drop(state);
        self.dispatch_next();
    }

    /// Terminates the calling thread: status DYING, never scheduled
    /// again. The *next* scheduled thread reaps it (spec §3 Thread
    /// lifecycle) via `reap_if_dying`.
    pub fn exit(&self, status: i32) -> ! {
        let current = self.current();
        log::info!("thread {} exiting with status {status}", current.tid);
        current.set_status(ThreadStatus::Dying);
        self.switch_away(current);
        unreachable!("a DYING thread must never be rescheduled")
    }

    fn switch_away(&self, outgoing: Arc<Thread>) {
        self.dispatch_next();
        let _ = outgoing;
    }

    /// Pops the next-to-run thread (or idle if the ready queue is empty),
    /// performs the arch-level switch, and reaps the outgoing thread if
    /// it was DYING.
    fn dispatch_next(&self) {
        let mut state = self.state.lock();
        let outgoing = state.current.clone();
        let next = state.ready.pop_front().unwrap_or_else(|| self.idle.clone());
        next.set_status(ThreadStatus::Running);
        next.set_location(Location::None);
        state.current = next.clone();
        let dying = outgoing.status() == ThreadStatus::Dying;
        if dying {
            state.threads.remove(&outgoing.tid);
        }
        drop(state);
        self.arch.lock().switch(outgoing.tid, next.tid);
        if dying {
            log::debug!("reaped dying thread {}", outgoing.tid);
        }
    }

    /// `set_priority` (spec §4.3): updates base priority; under priority
    /// scheduling, recomputes effective priority and yields if the
    /// caller's effective priority dropped below the best ready thread.
    /// Ignored in MLFQ mode per spec §9.
    pub fn set_priority(&self, priority: Priority) {
        if self.mlfqs_enabled() {
            return;
        }
        let current = self.current();
        current.set_base_priority(priority.min(PRI_MAX));
        let best_ready = self.state.lock().ready.front_priority().unwrap_or(PRI_MIN);
        if current.effective_priority() < best_ready {
            self.yield_now();
        }
    }

    pub fn get_priority(&self) -> Priority {
        self.current().effective_priority()
    }

    pub fn set_nice(&self, nice: Nice) {
        let nice = nice.clamp(NICE_MIN, NICE_MAX);
        let current = self.current();
        current.set_nice(nice);
        mlfq::recompute_priority(&current);
        self.resort_ready(&current);
    }

    pub fn get_nice(&self) -> Nice {
        self.current().nice()
    }

    pub fn get_load_avg_x100(&self) -> i32 {
        let load_avg = *self.load_avg.lock();
        fixed_point::to_int_round(fixed_point::mul_int(load_avg, 100))
    }

    pub fn get_recent_cpu_x100(&self) -> i32 {
        fixed_point::to_int_round(fixed_point::mul_int(self.current().recent_cpu(), 100))
    }

    /// `sleep_until(absolute_tick)` (spec §4.3). The idle thread never
    /// sleeps (it blocks-and-halts instead, outside this crate's scope).
    pub fn sleep_until(&self, tick: u64) {
        let current = self.current();
        if core::ptr::eq(current.as_ref(), self.idle.as_ref()) {
            return;
        }
        if tick <= self.now_ticks() {
            return;
        }
        current.set_wakeup_tick(tick);
        current.set_status(ThreadStatus::Blocked);
        current.set_location(Location::Sleeping);
        self.state.lock().sleeping.insert(current.clone());
        self.switch_away(current);
    }

    /// Called from the timer ISR on every tick. Wakes due sleepers,
    /// advances the running thread's time slice, and runs MLFQ
    /// recomputation at its 4-tick and 1-second cadences (spec §4.3).
    pub fn tick(&self) {
        let now = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let due = self.state.lock().sleeping.drain_due(now);
        for thread in due {
            self.unblock(thread);
        }

        if self.mlfqs_enabled() {
            let current = self.current();
            if !core::ptr::eq(current.as_ref(), self.idle.as_ref()) {
                current.set_recent_cpu(fixed_point::add_int(current.recent_cpu(), 1));
            }
            if now % (mlfq::TIMER_FREQ as u64) == 0 {
                self.recompute_load_avg();
                self.recompute_all_recent_cpu();
            }
            if now % 4 == 0 {
                self.recompute_all_priorities();
            }
        }

        let current = self.current();
        if !core::ptr::eq(current.as_ref(), self.idle.as_ref()) && current.advance_slice() >= super::thread::TIME_SLICE_TICKS {
            current.reset_slice();
            self.request_yield_on_return();
        }
    }

    /// In this crate there is no real interrupt-return path to defer
    /// into, so a same-context yield is the closest honest equivalent;
    /// production arch glue would instead set a pending flag consulted on
    /// interrupt return.
    fn request_yield_on_return(&self) {
        self.yield_now();
    }

    /// Re-sorts `thread` within the ready queue after its priority
    /// changed (donation, `set_nice`). A no-op if it is not READY.
    pub fn resort_ready(&self, thread: &Arc<Thread>) {
        if thread.status() == ThreadStatus::Ready {
            self.state.lock().ready.resort(thread);
        }
    }

    fn recompute_load_avg(&self) {
        let ready_threads = {
            let state = self.state.lock();
            let running_counts = !core::ptr::eq(state.current.as_ref(), self.idle.as_ref());
            state.ready.len() as i32 + i32::from(running_counts)
        };
        let mut load_avg = self.load_avg.lock();
        *load_avg = mlfq::next_load_avg(*load_avg, ready_threads);
    }

    fn recompute_all_recent_cpu(&self) {
        let load_avg = *self.load_avg.lock();
        let state = self.state.lock();
        for thread in state.threads.values() {
            if !core::ptr::eq(thread.as_ref(), self.idle.as_ref()) {
                mlfq::recompute_recent_cpu(thread, load_avg);
            }
        }
    }

    fn recompute_all_priorities(&self) {
        let mut state = self.state.lock();
        for thread in state.threads.values() {
            if !core::ptr::eq(thread.as_ref(), self.idle.as_ref()) {
                mlfq::recompute_priority(thread);
            }
        }
        let current = state.current.clone();
        let mut ready: alloc::vec::Vec<Arc<Thread>> = alloc::vec::Vec::new();
        while let Some(t) = state.ready.pop_front() {
            ready.push(t);
        }
        for t in ready {
            state.ready.insert(t);
        }
        drop(state);
        let _ = current;
    }
}

lazy_static::lazy_static! {
    pub static ref SCHEDULER: Scheduler = Scheduler::new(cfg!(feature = "mlfqs"));
}
