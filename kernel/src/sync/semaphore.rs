//! Semaphore (spec §4.2): FIFO-by-arrival waiter list, released in
//! effective-priority order.
//!
//! Operations take the `Scheduler` they block against as an explicit
//! argument rather than reaching for a global singleton — production
//! code passes the crate's one `sched::SCHEDULER`, while tests construct
//! an independent `Scheduler` per test so parallel test execution can't
//! interfere across cases.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::sched::{Priority, Scheduler, Thread, PRI_MIN};

struct SemaphoreState {
    count: u32,
    waiters: Vec<Arc<Thread>>,
}

pub struct Semaphore {
    inner: Mutex<SemaphoreState>,
}

impl Semaphore {
    pub fn new(count: u32) -> Self {
        Self {
            inner: Mutex::new(SemaphoreState {
                count,
                waiters: Vec::new(),
            }),
        }
    }

    /// Registers `current` as a waiter without blocking. Used by
    /// `Lock::acquire` so donation propagation can see the blocking
    /// thread's priority before the thread is actually suspended.
    /// Idempotent with the implicit registration `down` performs.
    pub fn register_waiter(&self, current: &Arc<Thread>) {
        let mut state = self.inner.lock();
        if !state.waiters.iter().any(|t| Arc::ptr_eq(t, current)) {
            state.waiters.push(current.clone());
        }
    }

    /// `down`: decrements if positive; otherwise blocks until a matching
    /// `up` wakes this thread.
    pub fn down(&self, sched: &Scheduler) {
        loop {
            let mut state = self.inner.lock();
            if state.count > 0 {
                state.count -= 1;
                let current = sched.current();
                state.waiters.retain(|t| !Arc::ptr_eq(t, &current));
                return;
            }
            let current = sched.current();
            if !state.waiters.iter().any(|t| Arc::ptr_eq(t, &current)) {
                state.waiters.push(current);
            }
            drop(state);
            sched.block();
        }
    }

    /// `up`: increments the count; if a waiter exists, wakes the one with
    /// the highest effective priority (FIFO among ties).
    pub fn up(&self, sched: &Scheduler) {
        let mut state = self.inner.lock();
        state.count += 1;
        let woken = highest_priority_waiter(&state.waiters).map(|idx| state.waiters.remove(idx));
        drop(state);
        if let Some(waiter) = woken {
            sched.unblock(waiter);
        }
    }

    /// Highest effective priority among current waiters, or `PRI_MIN`.
    pub fn waiters_max_priority(&self) -> Priority {
        self.inner
            .lock()
            .waiters
            .iter()
            .map(|t| t.effective_priority())
            .max()
            .unwrap_or(PRI_MIN)
    }

    pub fn count(&self) -> u32 {
        self.inner.lock().count
    }
}

fn highest_priority_waiter(waiters: &[Arc<Thread>]) -> Option<usize> {
    waiters
        .iter()
        .enumerate()
        .max_by_key(|(idx, t)| (t.effective_priority(), core::cmp::Reverse(*idx)))
        .map(|(idx, _)| idx)
}
