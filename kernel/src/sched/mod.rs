//! Thread scheduling: priority donation and 4.4BSD MLFQ (spec §4.3).

pub mod mlfq;
pub mod queue;
pub mod scheduler;
pub mod thread;

pub use scheduler::{ArchContext, EntryPoint, NullContext, Scheduler, SCHEDULER, TID_ERROR};
pub use thread::{
    DonorLock, Location, Nice, Priority, Thread, ThreadId, ThreadStatus, NICE_MAX, NICE_MIN,
    PRI_MAX, PRI_MIN, TIME_SLICE_TICKS,
};
