//! Supplemental page table and demand loader (spec §4.6).

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use spin::Mutex;

use crate::collaborators::{FileHandle, FileSystem, PageDirectoryId, PageTableOps, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::sched::ThreadId;

use super::frame::{FrameOwner, FrameTable};
use super::swap::SwapAllocator;

/// Maximum stack size a fault is allowed to grow into (8 MiB, spec §4.6).
pub const MAX_STACK_SIZE: usize = 8 * 1024 * 1024;
/// A stack-grow fault must land within this many bytes below the
/// current stack pointer (spec §4.6, accounts for `push`/`pusha`).
const STACK_FAULT_SLACK: usize = 32;

/// Where a page's bytes currently live. A page that started out FILE- or
/// ZERO-backed keeps its `Spte::backing` populated even once resident —
/// eviction needs to know where to write it back to, or whether it can
/// simply be discarded, without re-deriving that from the state tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Not yet loaded, and has no file backing: a pure anonymous page.
    Zero,
    /// Resident in a physical frame.
    Frame { kaddr: usize },
    /// Swapped out to the given slot.
    Swap { slot: u64 },
}

/// Present for any SPTE originally installed via `install_file` (demand
/// loader segments and mmap), and carried along regardless of current
/// `Residency` so eviction and `munmap` can still find the backing file.
#[derive(Debug, Clone, Copy)]
pub struct FileBacking {
    pub file: FileHandle,
    pub offset: u64,
    pub read_bytes: usize,
    pub zero_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Spte {
    pub residency: Residency,
    pub backing: Option<FileBacking>,
    pub writable: bool,
}

/// Per-thread map from user virtual page to its backing descriptor.
pub struct Spt {
    entries: Mutex<BTreeMap<usize, Spte>>,
    owner_tid: ThreadId,
    pd: PageDirectoryId,
    frames: Arc<FrameTable>,
    swap: Arc<SwapAllocator>,
    block: Arc<dyn crate::collaborators::BlockDevice>,
    fs: Arc<dyn FileSystem>,
    pt: Arc<dyn PageTableOps>,
}

impl Spt {
    pub fn new(
        owner_tid: ThreadId,
        pd: PageDirectoryId,
        frames: Arc<FrameTable>,
        swap: Arc<SwapAllocator>,
        block: Arc<dyn crate::collaborators::BlockDevice>,
        fs: Arc<dyn FileSystem>,
        pt: Arc<dyn PageTableOps>,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            owner_tid,
            pd,
            frames,
            swap,
            block,
            fs,
            pt,
        })
    }

    pub fn lookup(&self, vpage: usize) -> Option<Spte> {
        self.entries.lock().get(&vpage).copied()
    }

    /// `install_zero(vp)`.
    pub fn install_zero(&self, vpage: usize) -> KernelResult<()> {
        self.insert_new(
            vpage,
            Spte {
                residency: Residency::Zero,
                backing: None,
                writable: true,
            },
        )
    }

    /// `install_file(vp, file, off, rb, zb, writable)`.
    pub fn install_file(
        &self,
        vpage: usize,
        file: FileHandle,
        offset: u64,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> KernelResult<()> {
        if read_bytes + zero_bytes != PAGE_SIZE {
            return Err(KernelError::InvalidState {
                expected: "read_bytes + zero_bytes == PAGE_SIZE",
                actual: "read_bytes + zero_bytes != PAGE_SIZE",
            });
        }
        if vpage % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidAddress { addr: vpage });
        }
        self.insert_new(
            vpage,
            Spte {
                residency: Residency::Zero,
                backing: Some(FileBacking {
                    file,
                    offset,
                    read_bytes,
                    zero_bytes,
                }),
                writable,
            },
        )
    }

    /// Removes an un-loaded (never-resident) SPTE. Used by the mmap
    /// registry to roll back a partially installed mapping; not exposed
    /// as part of the public demand-loader API.
    pub(crate) fn remove_unloaded(&self, vpage: usize) {
        self.entries.lock().remove(&vpage);
    }

    pub fn is_resident(&self, vpage: usize) -> bool {
        matches!(
            self.entries.lock().get(&vpage).map(|e| e.residency),
            Some(Residency::Frame { .. })
        )
    }

    fn insert_new(&self, vpage: usize, spte: Spte) -> KernelResult<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&vpage) {
            return Err(KernelError::AlreadyExists {
                resource: "SPTE",
                id: vpage as u64,
            });
        }
        entries.insert(vpage, spte);
        Ok(())
    }

    /// `load(vp, pd)`: brings a page with an existing SPTE into a frame
    /// and installs the PTE. Fatal precondition: `vp` must already have
    /// an SPTE, and must not already be FRAME-resident.
    pub fn load(self: &Arc<Self>, vpage: usize) -> KernelResult<()> {
        let spte = self.lookup(vpage).ok_or(KernelError::UnmappedMemory { addr: vpage })?;
        if matches!(spte.residency, Residency::Frame { .. }) {
            return Err(KernelError::InvalidState {
                expected: "non-resident SPTE",
                actual: "already resident",
            });
        }

        let owner: Arc<dyn FrameOwner> = self.clone();
        let kaddr = self
            .frames
            .allocate(self.owner_tid, owner, self.pd, vpage, false)?;

        if let Err(e) = self.fill_frame(kaddr, &spte) {
            self.frames.free(kaddr);
            return Err(e);
        }

        if !self.pt.install(self.pd, vpage, kaddr, spte.writable) {
            self.frames.free(kaddr);
            return Err(KernelError::InvalidState {
                expected: "page table install to succeed",
                actual: "install failed",
            });
        }
        self.pt.set_dirty(self.pd, vpage, false);

        let mut entries = self.entries.lock();
        entries.insert(
            vpage,
            Spte {
                residency: Residency::Frame { kaddr },
                backing: spte.backing,
                writable: spte.writable,
            },
        );
        Ok(())
    }

    fn fill_frame(&self, kaddr: usize, spte: &Spte) -> KernelResult<()> {
        let buf = unsafe { core::slice::from_raw_parts_mut(kaddr as *mut u8, PAGE_SIZE) };
        match (spte.residency, spte.backing) {
            (Residency::Swap { slot }, _) => {
                let mut page = [0u8; PAGE_SIZE];
                self.swap.swap_in(self.block.as_ref(), slot, &mut page);
                buf.copy_from_slice(&page);
            }
            (Residency::Zero, Some(backing)) => {
                let read = self
                    .fs
                    .read(backing.file, &mut buf[..backing.read_bytes], backing.offset);
                if read != backing.read_bytes {
                    return Err(KernelError::InvalidState {
                        expected: "full page read from file",
                        actual: "short read",
                    });
                }
                buf[backing.read_bytes..backing.read_bytes + backing.zero_bytes].fill(0);
            }
            (Residency::Zero, None) => buf.fill(0),
            (Residency::Frame { .. }, _) => {
                unreachable!("load() precondition excludes resident SPTEs")
            }
        }
        Ok(())
    }

    /// `destroy(spt)`: flushes writeback, frees frames and swap slots for
    /// every SPTE, then drops them all.
    pub fn destroy(&self) {
        let vpages: alloc::vec::Vec<usize> = self.entries.lock().keys().copied().collect();
        for vpage in vpages {
            self.teardown_page(vpage);
        }
    }

    /// Tears down a single SPTE: writes back/frees its frame or swap
    /// slot as appropriate, then removes the entry. Shared by `destroy`
    /// and `munmap` (which tears down only the pages a mapping covers).
    pub(crate) fn teardown_page(&self, vpage: usize) {
        let Some(spte) = self.lookup(vpage) else { return };
        match spte.residency {
            Residency::Frame { kaddr } => {
                let dirty = self.pt.is_dirty(self.pd, vpage);
                self.writeback_if_needed(kaddr, &spte, dirty);
                self.pt.clear(self.pd, vpage);
                self.frames.free(kaddr);
            }
            Residency::Swap { slot } => self.swap.free(slot),
            Residency::Zero => {}
        }
        self.entries.lock().remove(&vpage);
    }

    fn writeback_if_needed(&self, kaddr: usize, spte: &Spte, dirty: bool) {
        if let Some(backing) = spte.backing {
            if dirty && spte.writable {
                let buf = unsafe { core::slice::from_raw_parts(kaddr as *const u8, backing.read_bytes) };
                self.fs.write(backing.file, buf, backing.offset);
            }
        }
    }
}

impl FrameOwner for Spt {
    /// Eviction policy (spec §4.5, fixed by spec §9's open-question
    /// resolution): writable file-backed pages write back; anonymous
    /// dirty pages go to swap; clean pages are simply dropped.
    fn on_evict(&self, vpage: usize, kaddr: usize, dirty: bool) -> KernelResult<()> {
        let spte = self.lookup(vpage).ok_or(KernelError::UnmappedMemory { addr: vpage })?;

        let next_residency = if spte.backing.is_some() {
            self.writeback_if_needed(kaddr, &spte, dirty);
            Residency::Zero
        } else if dirty {
            let buf = unsafe { core::slice::from_raw_parts(kaddr as *const u8, PAGE_SIZE) };
            let mut page = [0u8; PAGE_SIZE];
            page.copy_from_slice(buf);
            let slot = self.swap.swap_out(self.block.as_ref(), &page);
            Residency::Swap { slot }
        } else {
            Residency::Zero
        };

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&vpage) {
            entry.residency = next_residency;
        }
        Ok(())
    }
}

/// A fault at `addr` is a stack-grow candidate if it is within
/// `STACK_FAULT_SLACK` bytes below `esp`, within `MAX_STACK_SIZE` of
/// `stack_base` (the page just below the fixed user stack top), and
/// below `user_kernel_split` (spec §4.6 "Stack growth policy").
pub fn is_stack_growth_candidate(
    addr: usize,
    esp: usize,
    stack_base: usize,
    user_kernel_split: usize,
) -> bool {
    if addr >= user_kernel_split {
        return false;
    }
    if addr + STACK_FAULT_SLACK < esp {
        return false;
    }
    stack_base.saturating_sub(addr) <= MAX_STACK_SIZE
}
