//! Traits for the hardware and host-OS layers this crate depends on but
//! does not implement: the timer, the swap block device, the physical
//! page allocator, the page-table hardware abstraction, and the
//! filesystem (spec §6 "External interfaces").
//!
//! Production implementations of these live below the kernel's
//! architecture-support layer, out of scope here. `kernel/tests/common`
//! provides in-memory fakes so the scheduler and VM logic can be driven
//! end-to-end under the host test target.

/// Bytes per disk sector.
pub const SECTOR_SIZE: usize = 512;
/// Bytes per virtual/physical page.
pub const PAGE_SIZE: usize = 4096;
/// Sectors spanned by one page.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

/// Monotonic hardware tick source. The timer ISR is expected to call
/// `Scheduler::tick` directly; this trait exposes only the free-running
/// counter external callers (e.g. `sleep_until`) read.
pub trait TimerDevice: Send + Sync {
    fn now_ticks(&self) -> u64;
}

/// The block device backing the swap area.
///
/// `read`/`write` operate on whole sectors; callers above this layer
/// translate pages to `SECTORS_PER_PAGE` contiguous sectors.
pub trait BlockDevice: Send + Sync {
    fn sector_count(&self) -> u64;
    fn read(&self, sector: u64, buf: &mut [u8; SECTOR_SIZE]);
    fn write(&self, sector: u64, buf: &[u8; SECTOR_SIZE]);
}

bitflags::bitflags! {
    /// Flags accepted by `PageAllocator::get`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PallocFlags: u32 {
        /// Page is destined for a user address space (vs. kernel-only).
        const USER = 1 << 0;
        /// Zero the page before returning it.
        const ZERO = 1 << 1;
    }
}

/// The physical page allocator (`palloc`).
pub trait PageAllocator: Send + Sync {
    /// Returns a kernel-mapped address for one physical page, or `None`
    /// if the pool is exhausted.
    fn get(&self, flags: PallocFlags) -> Option<usize>;
    fn free(&self, kaddr: usize);
}

/// Opaque identifier for a page directory / address space.
pub type PageDirectoryId = u64;

/// Page-table hardware abstraction: installing, inspecting, and tearing
/// down user virtual-to-physical mappings.
pub trait PageTableOps: Send + Sync {
    fn install(&self, pd: PageDirectoryId, vpage: usize, kaddr: usize, writable: bool) -> bool;
    fn lookup(&self, pd: PageDirectoryId, vpage: usize) -> Option<usize>;
    fn clear(&self, pd: PageDirectoryId, vpage: usize);
    fn is_accessed(&self, pd: PageDirectoryId, vpage: usize) -> bool;
    fn is_dirty(&self, pd: PageDirectoryId, vpage: usize) -> bool;
    fn set_accessed(&self, pd: PageDirectoryId, vpage: usize, value: bool);
    fn set_dirty(&self, pd: PageDirectoryId, vpage: usize, value: bool);
}

/// Opaque per-open-file handle, reopened independently per mmap per spec
/// §4.7 ("file reopened from the fd's file handle").
pub type FileHandle = u64;

/// Minimal filesystem surface the demand loader and mmap registry need.
/// All calls are expected to be serialized by the caller under a single
/// coarse lock (spec §5, `filesys_lock`) — this trait itself is not
/// responsible for that serialization.
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str) -> Option<FileHandle>;
    fn close(&self, file: FileHandle);
    fn read(&self, file: FileHandle, buf: &mut [u8], offset: u64) -> usize;
    fn write(&self, file: FileHandle, buf: &[u8], offset: u64) -> usize;
    fn length(&self, file: FileHandle) -> u64;
    /// Returns a new handle to the same underlying file, independent of
    /// `file`'s lifetime (required so `munmap` can outlive the fd it was
    /// created from).
    fn reopen(&self, file: FileHandle) -> FileHandle;
}
