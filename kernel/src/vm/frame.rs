//! Physical frame table and clock (second-chance) eviction (spec §4.5).

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::collaborators::{PageAllocator, PageDirectoryId, PageTableOps, PallocFlags, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::sched::ThreadId;

/// Kernel-mapped address of a physical frame, as returned by the
/// injected `PageAllocator`.
pub type FrameHandle = usize;

/// At most this many full passes over the frame list before eviction is
/// considered exhausted and therefore fatal (spec §4.5).
const MAX_EVICTION_PASSES: usize = 2;

/// Something a frame's contents can be evicted into: implemented by the
/// owning thread's supplemental page table. Kept as a trait so the frame
/// table has no concrete dependency on `vm::spt`.
pub trait FrameOwner: Send + Sync {
    /// Called when the clock algorithm selects this frame as a victim.
    /// Implementations write back to a file, swap out, or drop the page
    /// as appropriate, and must update their own SPTE state accordingly.
    fn on_evict(&self, user_vpage: usize, kaddr: usize, dirty: bool) -> KernelResult<()>;
}

struct FrameRecord {
    kaddr: FrameHandle,
    owner_tid: ThreadId,
    owner: Arc<dyn FrameOwner>,
    user_vpage: usize,
    pd: PageDirectoryId,
}

struct FrameTableState {
    frames: Vec<FrameRecord>,
    clock_hand: usize,
}

/// A simple bump/free-list allocator used when a frame table is built
/// without wiring in a real `PageAllocator` — convenient for tests and
/// for code exercising frame-table bookkeeping in isolation.
struct FixedPool {
    free: Mutex<Vec<usize>>,
}

impl FixedPool {
    fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new((0..capacity).collect()),
        }
    }
}

impl PageAllocator for FixedPool {
    fn get(&self, _flags: PallocFlags) -> Option<usize> {
        self.free.lock().pop()
    }

    fn free(&self, kaddr: usize) {
        self.free.lock().push(kaddr);
    }
}

/// A page table fake that never reports the accessed bit set, so the
/// clock algorithm picks the current hand position as victim on its
/// first visit. Paired with `FrameTable::with_capacity` for tests that
/// only care about frame bookkeeping, not real accessed/dirty tracking.
struct AlwaysEvictable;

impl PageTableOps for AlwaysEvictable {
    fn install(&self, _pd: PageDirectoryId, _vpage: usize, _kaddr: usize, _writable: bool) -> bool {
        true
    }
    fn lookup(&self, _pd: PageDirectoryId, _vpage: usize) -> Option<usize> {
        None
    }
    fn clear(&self, _pd: PageDirectoryId, _vpage: usize) {}
    fn is_accessed(&self, _pd: PageDirectoryId, _vpage: usize) -> bool {
        false
    }
    fn is_dirty(&self, _pd: PageDirectoryId, _vpage: usize) -> bool {
        false
    }
    fn set_accessed(&self, _pd: PageDirectoryId, _vpage: usize, _value: bool) {}
    fn set_dirty(&self, _pd: PageDirectoryId, _vpage: usize, _value: bool) {}
}

pub struct FrameTable {
    state: Mutex<FrameTableState>,
    palloc: Arc<dyn PageAllocator>,
    pt: Arc<dyn PageTableOps>,
}

impl FrameTable {
    pub fn new(palloc: Arc<dyn PageAllocator>, pt: Arc<dyn PageTableOps>) -> Self {
        Self {
            state: Mutex::new(FrameTableState {
                frames: Vec::new(),
                clock_hand: 0,
            }),
            palloc,
            pt,
        }
    }

    /// Convenience constructor over a fixed-size in-memory pool and an
    /// always-evictable page table fake, for tests that only care about
    /// frame-table bookkeeping.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(FixedPool::new(capacity)), Arc::new(AlwaysEvictable))
    }

    /// `allocate(user_vpage, zero?) → kaddr` (spec §4.5). Requests a
    /// physical page; on exhaustion, runs eviction once and retries.
    pub fn allocate(
        &self,
        owner_tid: ThreadId,
        owner: Arc<dyn FrameOwner>,
        pd: PageDirectoryId,
        user_vpage: usize,
        zero: bool,
    ) -> KernelResult<FrameHandle> {
        let flags = if zero {
            PallocFlags::USER | PallocFlags::ZERO
        } else {
            PallocFlags::USER
        };
        let kaddr = match self.palloc.get(flags) {
            Some(kaddr) => kaddr,
            None => {
                self.evict_one()?;
                self.palloc
                    .get(flags)
                    .ok_or(KernelError::OutOfMemory {
                        requested: PAGE_SIZE,
                        available: 0,
                    })?
            }
        };
        self.state.lock().frames.push(FrameRecord {
            kaddr,
            owner_tid,
            owner,
            user_vpage,
            pd,
        });
        Ok(kaddr)
    }

    /// `free(kaddr)`: removes the bookkeeping record and releases the
    /// physical page back to the allocator.
    pub fn free(&self, kaddr: FrameHandle) {
        let mut state = self.state.lock();
        if let Some(pos) = state.frames.iter().position(|f| f.kaddr == kaddr) {
            state.frames.remove(pos);
            if state.clock_hand > pos {
                state.clock_hand -= 1;
            }
        }
        drop(state);
        self.palloc.free(kaddr);
    }

    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Runs the second-chance clock to free exactly one frame. Bounded to
    /// two full passes over the frame list; exhaustion is fatal (spec
    /// §4.5), as is being asked to evict from an empty table.
    fn evict_one(&self) -> KernelResult<()> {
        let total = self.state.lock().frames.len();
        assert!(total > 0, "frame eviction requested with no frames to evict");
        let max_visits = total * MAX_EVICTION_PASSES;

        for _ in 0..max_visits {
            let (victim_kaddr, victim_owner, victim_vpage, victim_pd) = {
                let mut state = self.state.lock();
                let idx = state.clock_hand % state.frames.len();
                state.clock_hand = (state.clock_hand + 1) % state.frames.len();
                let record = &state.frames[idx];
                (
                    record.kaddr,
                    record.owner.clone(),
                    record.user_vpage,
                    record.pd,
                )
            };

            if self.pt.is_accessed(victim_pd, victim_vpage) {
                self.pt.set_accessed(victim_pd, victim_vpage, false);
                continue;
            }

            let dirty = self.pt.is_dirty(victim_pd, victim_vpage);
            victim_owner.on_evict(victim_vpage, victim_kaddr, dirty)?;
            self.pt.clear(victim_pd, victim_vpage);
            self.free(victim_kaddr);
            return Ok(());
        }
        panic!("frame eviction exhausted {max_visits} visits without finding a victim");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopOwner;
    impl FrameOwner for NoopOwner {
        fn on_evict(&self, _user_vpage: usize, _kaddr: usize, _dirty: bool) -> KernelResult<()> {
            Ok(())
        }
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let table = FrameTable::with_capacity(4);
        let owner: Arc<dyn FrameOwner> = Arc::new(NoopOwner);
        let kaddr = table.allocate(1, owner, 0, 0x1000, false).unwrap();
        assert_eq!(table.frame_count(), 1);
        table.free(kaddr);
        assert_eq!(table.frame_count(), 0);
    }

    #[test]
    fn allocate_evicts_when_pool_is_exhausted() {
        let table = FrameTable::with_capacity(1);
        let owner: Arc<dyn FrameOwner> = Arc::new(NoopOwner);
        table.allocate(1, owner.clone(), 0, 0x1000, false).unwrap();
        // Pool has one slot; this allocation must evict the first frame.
        table.allocate(1, owner, 0, 0x2000, false).unwrap();
        assert_eq!(table.frame_count(), 1);
    }

    #[test]
    #[should_panic(expected = "no frames to evict")]
    fn eviction_with_no_frames_panics() {
        let table = FrameTable::with_capacity(0);
        let owner: Arc<dyn FrameOwner> = Arc::new(NoopOwner);
        table.allocate(1, owner, 0, 0x1000, false).unwrap();
    }
}
