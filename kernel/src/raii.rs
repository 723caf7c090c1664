//! RAII guards for kernel resources that must be released on every exit
//! path (spec §5 "Resource acquisition"): a frame allocated mid-fault-
//! handling, or a swap slot reserved mid-eviction, must go back to its pool
//! if the surrounding operation fails before the resource is committed to
//! its final owner (an SPTE).
//!
//! Each guard exposes `commit()`, which forgets the guard without running
//! its `Drop` — the resource has found a permanent owner and the caller is
//! now responsible for it.

use crate::vm::frame::{FrameHandle, FrameTable};
use crate::vm::swap::SwapAllocator;

/// Releases a physical frame back to its `FrameTable` unless committed.
pub struct FrameGuard<'a> {
    frame: Option<FrameHandle>,
    table: &'a FrameTable,
}

impl<'a> FrameGuard<'a> {
    pub fn new(frame: FrameHandle, table: &'a FrameTable) -> Self {
        Self {
            frame: Some(frame),
            table,
        }
    }

    pub fn handle(&self) -> FrameHandle {
        self.frame.expect("frame guard used after commit")
    }

    /// The frame has a permanent owner (an SPTE); stop tracking it.
    pub fn commit(mut self) -> FrameHandle {
        self.frame.take().expect("frame guard used after commit")
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.table.free(frame);
        }
    }
}

/// Releases a swap slot back to its `SwapAllocator` unless committed.
pub struct SwapSlotGuard<'a> {
    slot: Option<u64>,
    allocator: &'a SwapAllocator,
}

impl<'a> SwapSlotGuard<'a> {
    pub fn new(slot: u64, allocator: &'a SwapAllocator) -> Self {
        Self {
            slot: Some(slot),
            allocator,
        }
    }

    pub fn slot(&self) -> u64 {
        self.slot.expect("swap slot guard used after commit")
    }

    /// The slot has a permanent owner (an SPTE's SWAP entry); stop tracking.
    pub fn commit(mut self) -> u64 {
        self.slot.take().expect("swap slot guard used after commit")
    }
}

impl Drop for SwapSlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.allocator.free(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use crate::error::KernelResult;
    use crate::vm::frame::{FrameOwner, FrameTable};
    use crate::vm::swap::SwapAllocator;

    struct NoopOwner;
    impl FrameOwner for NoopOwner {
        fn on_evict(&self, _user_vpage: usize, _kaddr: usize, _dirty: bool) -> KernelResult<()> {
            Ok(())
        }
    }

    #[test]
    fn frame_guard_frees_on_drop() {
        let table = FrameTable::with_capacity(4);
        let owner: Arc<dyn FrameOwner> = Arc::new(NoopOwner);
        let frame = table.allocate(1, owner, 0, 0x1000, false).unwrap();
        {
            let _guard = FrameGuard::new(frame, &table);
        }
        assert_eq!(table.frame_count(), 0);
    }

    #[test]
    fn frame_guard_commit_keeps_frame_allocated() {
        let table = FrameTable::with_capacity(4);
        let owner: Arc<dyn FrameOwner> = Arc::new(NoopOwner);
        let frame = table.allocate(1, owner, 0, 0x1000, false).unwrap();
        let guard = FrameGuard::new(frame, &table);
        let committed = guard.commit();
        assert_eq!(committed, frame);
        assert_eq!(table.frame_count(), 1);
    }

    #[test]
    fn swap_slot_guard_frees_on_drop() {
        let allocator = SwapAllocator::with_capacity(4);
        let slot = allocator.alloc();
        {
            let _guard = SwapSlotGuard::new(slot, &allocator);
        }
        assert_eq!(allocator.free_count(), 4);
    }

    #[test]
    fn swap_slot_guard_commit_keeps_slot_reserved() {
        let allocator = SwapAllocator::with_capacity(4);
        let slot = allocator.alloc();
        let guard = SwapSlotGuard::new(slot, &allocator);
        let committed = guard.commit();
        assert_eq!(committed, slot);
        assert_eq!(allocator.free_count(), 3);
    }
}
