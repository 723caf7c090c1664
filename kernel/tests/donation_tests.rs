//! Black-box `Lock` integration tests. Deliberately limited to uncontended
//! scenarios: a genuinely contended `acquire` would enter `Semaphore::down`'s
//! retry loop, which never returns under the host test target (no real
//! `ArchContext` exists to suspend and later resume a call stack). The
//! donation-propagation math itself is covered by `sync::lock`'s own
//! crate-internal unit tests, which can safely drive it directly.

use nucleon_kernel::sched::{DonorLock, Scheduler, PRI_MIN};
use nucleon_kernel::sync::Lock;

#[test]
fn uncontended_ownership_transfers_cleanly() {
    let sched = Scheduler::new(false);
    let lock = Lock::new();

    let a_tid = sched.create("a", 10, |_| {}, 0);
    let a = sched.thread(a_tid).unwrap();

    lock.acquire(&sched);
    assert!(lock.is_held_by(&a));
    assert_eq!(a.held_lock_count(), 1);
    assert_eq!(lock.owner().unwrap().tid, a.tid);

    lock.release(&sched);
    assert!(!lock.is_held_by(&a));
    assert_eq!(a.held_lock_count(), 0);
    assert!(lock.owner().is_none());
}

#[test]
fn lock_reports_no_donation_without_waiters() {
    let sched = Scheduler::new(false);
    let lock = Lock::new();
    sched.create("solo", 15, |_| {}, 0);

    lock.acquire(&sched);
    assert_eq!(lock.max_priority(), PRI_MIN);
    lock.release(&sched);
}

#[test]
fn holding_multiple_locks_tracks_each_independently() {
    let sched = Scheduler::new(false);
    let l1 = Lock::new();
    let l2 = Lock::new();

    let tid = sched.create("multi", 10, |_| {}, 0);
    let t = sched.thread(tid).unwrap();

    l1.acquire(&sched);
    l2.acquire(&sched);
    assert_eq!(t.held_lock_count(), 2);

    l1.release(&sched);
    assert_eq!(t.held_lock_count(), 1);
    assert!(!l1.is_held_by(&t));
    assert!(l2.is_held_by(&t));

    l2.release(&sched);
    assert_eq!(t.held_lock_count(), 0);
}
