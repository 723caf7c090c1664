//! Ready and sleep queues (spec §3 "Ready set" / "Sleep set").
//!
//! Both are small-N collections maintained in sorted order on every
//! insert rather than sorted lazily — the natural choice given the
//! unbounded-but-small thread counts this scheduler targets, and it keeps
//! `pop_front` trivial.

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::thread::Thread;

/// READY threads, priority descending, FIFO among equal priorities.
#[derive(Default)]
pub struct ReadyQueue {
    entries: Vec<Arc<Thread>>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert `thread`, keeping priority-descending / FIFO-on-ties order.
    pub fn insert(&mut self, thread: Arc<Thread>) {
        let priority = thread.effective_priority();
        let pos = self
            .entries
            .iter()
            .position(|t| t.effective_priority() < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, thread);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Thread>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Remove `thread` from the queue regardless of position (used when a
    /// thread's priority changes and it must be re-sorted).
    pub fn remove(&mut self, thread: &Arc<Thread>) -> bool {
        if let Some(pos) = self.entries.iter().position(|t| Arc::ptr_eq(t, thread)) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Re-insert a thread already in the queue, maintaining sort order
    /// under its current (possibly changed) priority.
    pub fn resort(&mut self, thread: &Arc<Thread>) {
        if self.remove(thread) {
            self.insert(thread.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.entries.iter()
    }

    pub fn front_priority(&self) -> Option<super::thread::Priority> {
        self.entries.first().map(|t| t.effective_priority())
    }
}

/// Sleeping threads, `wakeup_tick` ascending, FIFO among ties.
#[derive(Default)]
pub struct SleepQueue {
    entries: Vec<Arc<Thread>>,
}

impl SleepQueue {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, thread: Arc<Thread>) {
        let tick = thread.wakeup_tick();
        let pos = self
            .entries
            .iter()
            .position(|t| t.wakeup_tick() > tick)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, thread);
    }

    /// Remove and return every thread whose `wakeup_tick <= now`, in
    /// ascending `wakeup_tick` order.
    pub fn drain_due(&mut self, now: u64) -> Vec<Arc<Thread>> {
        let split = self
            .entries
            .iter()
            .position(|t| t.wakeup_tick() > now)
            .unwrap_or(self.entries.len());
        self.entries.drain(0..split).collect()
    }
}
