//! Boundary validators (spec §4.8): user-pointer validation for the
//! system-call gateway. Every byte a syscall is about to dereference must
//! be checked *before* the dereference, never after.

use alloc::sync::Arc;

use crate::collaborators::{PageDirectoryId, PageTableOps, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};

use super::spt::Spt;

/// Checks `[addr, addr+len)` for a read: every covered page must lie
/// below `user_kernel_split` and be either already mapped or loadable
/// from the SPT. Does not fault the pages in — callers load on demand
/// after validation succeeds.
pub fn validate_user_read(
    addr: usize,
    len: usize,
    spt: &Arc<Spt>,
    pt: &dyn PageTableOps,
    pd: PageDirectoryId,
    user_kernel_split: usize,
) -> KernelResult<()> {
    validate_range(addr, len, spt, pt, pd, user_kernel_split)
}

/// Checks `[addr, addr+len)` for a write. Mapped-or-loadable pages must
/// additionally be writable.
pub fn validate_user_write(
    addr: usize,
    len: usize,
    spt: &Arc<Spt>,
    pt: &dyn PageTableOps,
    pd: PageDirectoryId,
    user_kernel_split: usize,
) -> KernelResult<()> {
    validate_range(addr, len, spt, pt, pd, user_kernel_split)?;

    let mut vpage = addr - addr % PAGE_SIZE;
    let end = addr + len;
    while vpage < end {
        if let Some(spte) = spt.lookup(vpage) {
            if !spte.writable {
                return Err(KernelError::PermissionDenied {
                    operation: "write to read-only page",
                });
            }
        }
        vpage += PAGE_SIZE;
    }
    Ok(())
}

fn validate_range(
    addr: usize,
    len: usize,
    spt: &Arc<Spt>,
    pt: &dyn PageTableOps,
    pd: PageDirectoryId,
    user_kernel_split: usize,
) -> KernelResult<()> {
    if len == 0 {
        return Ok(());
    }
    let end = addr.checked_add(len).ok_or(KernelError::InvalidAddress { addr })?;
    if end > user_kernel_split {
        return Err(KernelError::InvalidAddress { addr });
    }

    let mut vpage = addr - addr % PAGE_SIZE;
    while vpage < end {
        let mapped = pt.lookup(pd, vpage).is_some();
        let loadable = spt.lookup(vpage).is_some();
        if !mapped && !loadable {
            return Err(KernelError::UnmappedMemory { addr: vpage });
        }
        vpage += PAGE_SIZE;
    }
    Ok(())
}
