//! Memory-mapped file registry (spec §4.7).

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::collaborators::{FileHandle, FileSystem, PageDirectoryId, PageTableOps, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};

use super::spt::Spt;

struct MmapDescriptor {
    file: FileHandle,
    base_vpage: usize,
    byte_size: usize,
}

/// Per-process `mmap`/`munmap` bookkeeping. `id` is per-registry
/// monotonic within the "max existing + 1" convention spec §4.7 specifies
/// (so ids aren't simply an ever-incrementing counter — a freed id can be
/// reissued once nothing higher remains).
pub struct MmapRegistry {
    entries: Mutex<BTreeMap<u64, MmapDescriptor>>,
}

impl MmapRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// `mmap(fd, base_vp) → id or −1`.
    pub fn mmap(
        &self,
        spt: &Arc<Spt>,
        fs: &dyn FileSystem,
        pt: &dyn PageTableOps,
        pd: PageDirectoryId,
        fd: FileHandle,
        base_vpage: usize,
    ) -> KernelResult<u64> {
        if fd == 0 || fd == 1 {
            return Err(KernelError::PermissionDenied {
                operation: "mmap stdin/stdout",
            });
        }
        if base_vpage == 0 || base_vpage % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidAddress { addr: base_vpage });
        }

        let file = fs.reopen(fd);
        let size = fs.length(file);
        if size == 0 {
            fs.close(file);
            return Err(KernelError::InvalidState {
                expected: "file size > 0",
                actual: "empty file",
            });
        }

        let page_count = (size as usize).div_ceil(PAGE_SIZE);
        let mut installed: Vec<usize> = Vec::new();
        for i in 0..page_count {
            let vpage = base_vpage + i * PAGE_SIZE;
            if spt.lookup(vpage).is_some() || pt.lookup(pd, vpage).is_some() {
                for done in &installed {
                    spt.remove_unloaded(*done);
                }
                fs.close(file);
                return Err(KernelError::AlreadyExists {
                    resource: "mapped page",
                    id: vpage as u64,
                });
            }
            let offset = (i * PAGE_SIZE) as u64;
            let read_bytes = core::cmp::min(PAGE_SIZE, size as usize - i * PAGE_SIZE);
            let zero_bytes = PAGE_SIZE - read_bytes;
            if let Err(e) = spt.install_file(vpage, file, offset, read_bytes, zero_bytes, true) {
                for done in &installed {
                    spt.remove_unloaded(*done);
                }
                fs.close(file);
                return Err(e);
            }
            installed.push(vpage);
        }

        let mut entries = self.entries.lock();
        let id = entries.keys().max().copied().unwrap_or(0) + 1;
        entries.insert(
            id,
            MmapDescriptor {
                file,
                base_vpage,
                byte_size: size as usize,
            },
        );
        Ok(id)
    }

    /// `munmap(id)`: writes back dirty pages, tears down each covered
    /// SPTE, and closes the reopened file handle. A missing id is a
    /// no-op.
    pub fn munmap(&self, spt: &Arc<Spt>, fs: &dyn FileSystem, id: u64) {
        let descriptor = self.entries.lock().remove(&id);
        let Some(descriptor) = descriptor else { return };

        let page_count = descriptor.byte_size.div_ceil(PAGE_SIZE);
        for i in 0..page_count {
            let vpage = descriptor.base_vpage + i * PAGE_SIZE;
            spt.teardown_page(vpage);
        }
        fs.close(descriptor.file);
    }
}

impl Default for MmapRegistry {
    fn default() -> Self {
        Self::new()
    }
}
