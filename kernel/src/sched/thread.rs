//! Thread data model (spec §3 "Thread").

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use crate::fixed_point::Fixed;

pub type ThreadId = u64;
pub type Priority = u8;
pub const PRI_MIN: Priority = 0;
pub const PRI_MAX: Priority = 63;

pub type Nice = i8;
pub const NICE_MIN: Nice = -20;
pub const NICE_MAX: Nice = 20;

/// Timer ticks a thread may run before the scheduler requests a yield.
pub const TIME_SLICE_TICKS: u32 = 4;

const MAGIC: u32 = 0x5448_5244; // "THRD"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Which scheduling set a thread currently belongs to. A thread is a
/// member of at most one at a time; `Scheduler`/queue code updates this
/// alongside the physical move between sets rather than deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    None,
    Ready,
    Sleeping,
    WaitingOnLock,
}

/// Anything a thread can donate priority through: implemented by
/// `sync::Lock`. Kept as a trait here (rather than `sched` depending on
/// `sync::Lock` directly) so the scheduler core has no knowledge of lock
/// internals — it only needs to walk a donation chain.
pub trait DonorLock: Send + Sync {
    /// Highest effective priority among the lock's current waiters, or
    /// `PRI_MIN` if it has none. Derived live from the waiter set rather
    /// than cached, so it shrinks back down as waiters are woken.
    fn max_priority(&self) -> Priority;
    fn owner(&self) -> Option<Arc<Thread>>;
}

struct ThreadState {
    status: ThreadStatus,
    location: Location,
    base_priority: Priority,
    recent_cpu: Fixed,
    nice: Nice,
    wakeup_tick: u64,
    waiting_for: Option<Arc<dyn DonorLock>>,
    locks_held: Vec<Arc<dyn DonorLock>>,
    slice_ticks: u32,
}

/// A schedulable thread. Blocking operations act on `Arc<Thread>` handles
/// rather than raw pointers or indices into an intrusive list — see
/// DESIGN.md for why this crate favors safe shared ownership here over
/// the unsafe intrusive-list style.
pub struct Thread {
    pub tid: ThreadId,
    pub name: String,
    effective_priority: AtomicU8,
    state: Mutex<ThreadState>,
    magic: u32,
}

impl Thread {
    pub fn new(tid: ThreadId, name: String, priority: Priority) -> Arc<Self> {
        Arc::new(Self {
            tid,
            name,
            effective_priority: AtomicU8::new(priority),
            state: Mutex::new(ThreadState {
                status: ThreadStatus::Ready,
                location: Location::None,
                base_priority: priority,
                recent_cpu: 0,
                nice: 0,
                wakeup_tick: 0,
                waiting_for: None,
                locks_held: Vec::new(),
                slice_ticks: 0,
            }),
            magic: MAGIC,
        })
    }

    /// Panics if the stack-base magic cookie has been corrupted.
    pub fn check_magic(&self) {
        assert_eq!(self.magic, MAGIC, "thread {} stack overflow detected", self.tid);
    }

    pub fn status(&self) -> ThreadStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.state.lock().status = status;
    }

    pub fn location(&self) -> Location {
        self.state.lock().location
    }

    pub fn set_location(&self, location: Location) {
        self.state.lock().location = location;
    }

    pub fn effective_priority(&self) -> Priority {
        self.effective_priority.load(Ordering::Acquire)
    }

    pub fn base_priority(&self) -> Priority {
        self.state.lock().base_priority
    }

    /// Sets base priority and recomputes effective priority from the
    /// current donation set (spec §4.3 `set_priority`).
    pub fn set_base_priority(&self, priority: Priority) {
        let mut state = self.state.lock();
        state.base_priority = priority;
        self.recompute_effective_locked(&mut state);
    }

    fn recompute_effective_locked(&self, state: &mut ThreadState) {
        let donated = state
            .locks_held
            .iter()
            .map(|l| l.max_priority())
            .max()
            .unwrap_or(PRI_MIN);
        let effective = state.base_priority.max(donated);
        self.effective_priority.store(effective, Ordering::Release);
    }

    /// Recompute effective priority from `locks_held` after a donation or
    /// a lock release changed the donation set.
    pub fn recompute_effective(&self) {
        let mut state = self.state.lock();
        self.recompute_effective_locked(&mut state);
    }

    pub fn nice(&self) -> Nice {
        self.state.lock().nice
    }

    pub fn set_nice(&self, nice: Nice) {
        self.state.lock().nice = nice.clamp(NICE_MIN, NICE_MAX);
    }

    pub fn recent_cpu(&self) -> Fixed {
        self.state.lock().recent_cpu
    }

    pub fn set_recent_cpu(&self, value: Fixed) {
        self.state.lock().recent_cpu = value;
    }

    pub fn wakeup_tick(&self) -> u64 {
        self.state.lock().wakeup_tick
    }

    pub fn set_wakeup_tick(&self, tick: u64) {
        self.state.lock().wakeup_tick = tick;
    }

    pub fn waiting_for(&self) -> Option<Arc<dyn DonorLock>> {
        self.state.lock().waiting_for.clone()
    }

    pub fn set_waiting_for(&self, lock: Option<Arc<dyn DonorLock>>) {
        self.state.lock().waiting_for = lock;
    }

    pub fn push_held_lock(&self, lock: Arc<dyn DonorLock>) {
        let mut state = self.state.lock();
        state.locks_held.push(lock);
        self.recompute_effective_locked(&mut state);
    }

    pub fn remove_held_lock(&self, lock: &Arc<dyn DonorLock>) {
        let mut state = self.state.lock();
        state
            .locks_held
            .retain(|l| !Arc::ptr_eq(l, lock));
        self.recompute_effective_locked(&mut state);
    }

    pub fn held_lock_count(&self) -> usize {
        self.state.lock().locks_held.len()
    }

    pub fn advance_slice(&self) -> u32 {
        let mut state = self.state.lock();
        state.slice_ticks += 1;
        state.slice_ticks
    }

    pub fn reset_slice(&self) {
        self.state.lock().slice_ticks = 0;
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("effective_priority", &self.effective_priority())
            .finish()
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.tid == other.tid
    }
}

impl Eq for Thread {}
