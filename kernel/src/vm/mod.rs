//! Virtual memory manager: frame table and eviction (C5), swap-slot
//! allocator (C4), supplemental page table and demand loader (C6),
//! memory-mapped file registry (C7), and boundary validators (C8).

pub mod frame;
pub mod mmap;
pub mod spt;
pub mod swap;
pub mod validate;

pub use frame::{FrameHandle, FrameOwner, FrameTable};
pub use mmap::MmapRegistry;
pub use spt::{FileBacking, Residency, Spt, Spte, MAX_STACK_SIZE};
pub use swap::SwapAllocator;
pub use validate::{validate_user_read, validate_user_write};
