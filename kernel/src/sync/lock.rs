//! Lock with priority donation (spec §4.2).

use alloc::sync::Arc;

use crate::sched::{DonorLock, Priority, Scheduler, Thread};

use super::semaphore::Semaphore;

/// Donation walks stop after this many hops even if a cycle would let
/// them continue forever (spec §9 "Cyclic donation graph").
const MAX_DONATION_DEPTH: u32 = 8;

/// Mutual-exclusion lock whose waiters donate their effective priority to
/// the current owner, transitively through a chain of held locks.
pub struct Lock {
    sema: Semaphore,
    owner: spin::Mutex<Option<Arc<Thread>>>,
}

impl Lock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sema: Semaphore::new(1),
            owner: spin::Mutex::new(None),
        })
    }

    pub fn is_held_by(&self, thread: &Arc<Thread>) -> bool {
        self.owner.lock().as_ref().is_some_and(|o| Arc::ptr_eq(o, thread))
    }

    pub fn acquire(self: &Arc<Self>, sched: &Scheduler) {
        let current = sched.current();
        if self.owner.lock().is_some() {
            current.set_waiting_for(Some(self.clone() as Arc<dyn DonorLock>));
            self.sema.register_waiter(&current);
            self.propagate_donation(sched);
        }
        self.sema.down(sched);
        current.set_waiting_for(None);
        *self.owner.lock() = Some(current.clone());
        current.push_held_lock(self.clone());
    }

    /// Walks `waiting_for` starting at this lock's owner, recomputing
    /// effective priority at each hop (spec §4.2 `acquire` step 2).
    fn propagate_donation(self: &Arc<Self>, sched: &Scheduler) {
        let mut lock: Arc<dyn DonorLock> = self.clone();
        let mut depth = 0;
        loop {
            let Some(owner) = lock.owner() else { break };
            owner.recompute_effective();
            sched.resort_ready(&owner);
            depth += 1;
            if depth >= MAX_DONATION_DEPTH {
                break;
            }
            match owner.waiting_for() {
                Some(next) => lock = next,
                None => break,
            }
        }
    }

    pub fn release(self: &Arc<Self>, sched: &Scheduler) {
        let current = sched.current();
        current.remove_held_lock(&(self.clone() as Arc<dyn DonorLock>));
        *self.owner.lock() = None;
        self.sema.up(sched);
    }
}

impl DonorLock for Lock {
    fn max_priority(&self) -> Priority {
        self.sema.waiters_max_priority()
    }

    fn owner(&self) -> Option<Arc<Thread>> {
        self.owner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontended_acquire_and_release() {
        let sched = Scheduler::new(false);
        let lock = Lock::new();
        // A freshly created thread outranks idle (priority 0), so
        // `create` dispatches straight to it.
        let tid = sched.create("t", 10, |_| {}, 0);
        let thread = sched.thread(tid).unwrap();
        assert_eq!(sched.current().tid, thread.tid);

        lock.acquire(&sched);
        assert!(lock.is_held_by(&thread));
        lock.release(&sched);
        assert!(!lock.is_held_by(&thread));
    }

    // These tests replicate `acquire`'s contended branch (register as
    // waiter, propagate donation) directly rather than calling `acquire`
    // itself for the blocking thread. Calling it for real would enter
    // `Semaphore::down`'s retry loop, which never returns here: this
    // crate's test target has no real `ArchContext` to actually suspend
    // a call stack and later resume it, only `NullContext`'s no-op
    // switch, so a genuinely contended `down` spins against a count that
    // nothing outside that same call can ever increment. The donation
    // math itself — `register_waiter` + `propagate_donation` — is the
    // real code under test and involves no such loop.

    #[test]
    fn single_donation_then_release_relaxes_priority() {
        let sched = Scheduler::new(false);
        let lock = Lock::new();

        let n_tid = sched.create("n", 10, |_| {}, 0);
        let n = sched.thread(n_tid).unwrap();
        lock.acquire(&sched); // uncontended: N now owns L

        let h_tid = sched.create("h", 40, |_| {}, 0); // outranks N, dispatches to H
        let h = sched.thread(h_tid).unwrap();
        assert_eq!(sched.current().tid, h.tid);

        h.set_waiting_for(Some(lock.clone() as Arc<dyn DonorLock>));
        lock.sema.register_waiter(&h);
        lock.propagate_donation(&sched);

        assert_eq!(n.effective_priority(), 40);
        assert_eq!(lock.max_priority(), 40);

        sched.block(); // H suspends once; only N is ready, so it dispatches there
        assert_eq!(sched.current().tid, n.tid);

        lock.release(&sched);
        assert_eq!(n.effective_priority(), 10);
    }

    #[test]
    fn nested_donation_chain_of_three() {
        let sched = Scheduler::new(false);
        let l1 = Lock::new();
        let l2 = Lock::new();

        let n_tid = sched.create("n", 10, |_| {}, 0);
        let n = sched.thread(n_tid).unwrap();
        l1.acquire(&sched); // N owns L1

        let m_tid = sched.create("m", 20, |_| {}, 0); // outranks N, dispatches to M
        let m = sched.thread(m_tid).unwrap();
        l2.acquire(&sched); // uncontended: M owns L2

        // M blocks on L1 (held by N).
        m.set_waiting_for(Some(l1.clone() as Arc<dyn DonorLock>));
        l1.sema.register_waiter(&m);
        l1.propagate_donation(&sched);
        assert_eq!(n.effective_priority(), 20);

        let h_tid = sched.create("h", 40, |_| {}, 0); // outranks M, dispatches to H
        let h = sched.thread(h_tid).unwrap();

        // H blocks on L2 (held by M); the walk continues through M's own
        // `waiting_for` into L1 and on to N in the same call.
        h.set_waiting_for(Some(l2.clone() as Arc<dyn DonorLock>));
        l2.sema.register_waiter(&h);
        l2.propagate_donation(&sched);

        assert_eq!(m.effective_priority(), 40);
        assert_eq!(n.effective_priority(), 40);
        assert_eq!(l1.max_priority(), 40);
        assert_eq!(l2.max_priority(), 40);
    }
}
