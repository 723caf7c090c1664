//! Kernel error types.
//!
//! Mirrors the corpus convention of a single crate-wide error enum instead
//! of ad hoc `&'static str` results. Invariant violations (bad magic, bad
//! status transition, interrupt-context misuse, swap exhaustion) are never
//! represented here — those are fatal and go through `panic!` at the call
//! site, per spec §7.

use core::fmt;

/// Crate-wide error type for the scheduler and virtual memory subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No physical frames available and eviction could not free one.
    OutOfMemory { requested: usize, available: usize },
    /// An address is outside the user range, unaligned, or otherwise bad.
    InvalidAddress { addr: usize },
    /// No backing descriptor for a virtual page.
    UnmappedMemory { addr: usize },
    /// Generic not-found (thread, lock, mmap id, swap slot).
    NotFound { resource: &'static str, id: u64 },
    /// Generic already-exists (duplicate SPTE at a vpage, duplicate mmap).
    AlreadyExists { resource: &'static str, id: u64 },
    /// A precondition on the caller was violated (e.g. cv wait without the
    /// lock held, installing a SPTE with rb+zb != PAGESIZE).
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    /// The calling thread does not hold the resource it tried to release.
    PermissionDenied { operation: &'static str },
    /// A counted resource (tids, swap slots, mmap ids) is exhausted.
    ResourceExhausted { resource: &'static str },
    /// Operation would need to block but the caller asked not to.
    WouldBlock,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {requested} bytes, {available} available"
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address 0x{addr:x}"),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at 0x{addr:x}"),
            Self::NotFound { resource, id } => write!(f, "{resource} {id} not found"),
            Self::AlreadyExists { resource, id } => {
                write!(f, "{resource} {id} already exists")
            }
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {expected}, got {actual}")
            }
            Self::PermissionDenied { operation } => {
                write!(f, "permission denied for operation: {operation}")
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {resource}"),
            Self::WouldBlock => write!(f, "operation would block"),
        }
    }
}
