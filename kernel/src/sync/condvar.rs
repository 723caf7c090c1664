//! Condition variable (spec §4.2): unordered collection of per-waiter
//! semaphores, signaled in effective-priority order; all operations
//! require the caller to hold the associated `Lock`.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::sched::{Scheduler, Thread};

use super::lock::Lock;
use super::semaphore::Semaphore;

struct Waiter {
    thread: Arc<Thread>,
    sema: Arc<Semaphore>,
}

pub struct Condvar {
    waiters: Mutex<Vec<Waiter>>,
}

impl Condvar {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// `wait(cv, L)`: atomically releases `lock` and blocks the caller on
    /// a private semaphore, then reacquires `lock` before returning.
    /// Caller must already hold `lock`.
    pub fn wait(&self, lock: &Arc<Lock>, sched: &Scheduler) {
        let sema = Arc::new(Semaphore::new(0));
        let current = sched.current();
        self.waiters.lock().push(Waiter {
            thread: current,
            sema: sema.clone(),
        });
        lock.release(sched);
        sema.down(sched);
        lock.acquire(sched);
    }

    /// `signal`: wakes the single highest-effective-priority waiter.
    pub fn signal(&self, sched: &Scheduler) {
        let mut waiters = self.waiters.lock();
        if let Some(idx) = highest_priority_index(&waiters) {
            let waiter = waiters.remove(idx);
            drop(waiters);
            waiter.sema.up(sched);
        }
    }

    /// `broadcast`: wakes every current waiter.
    pub fn broadcast(&self, sched: &Scheduler) {
        let drained: Vec<Waiter> = self.waiters.lock().drain(..).collect();
        for waiter in drained {
            waiter.sema.up(sched);
        }
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

fn highest_priority_index(waiters: &[Waiter]) -> Option<usize> {
    waiters
        .iter()
        .enumerate()
        .max_by_key(|(idx, w)| (w.thread.effective_priority(), core::cmp::Reverse(*idx)))
        .map(|(idx, _)| idx)
}
