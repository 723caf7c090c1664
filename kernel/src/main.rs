#![no_std]
#![no_main]

// `nucleon_kernel` supplies the global allocator and `#[panic_handler]`
// for this target; the binary only needs to boot the scheduler.
use nucleon_kernel::{sched, serial};

fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Boot entry point. Architecture bring-up, the timer/interrupt
/// controller, and the page-table/palloc wiring are external
/// collaborators (spec §1) with no implementation in this crate; a real
/// boot sequence installs them before the scheduler ever ticks.
#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial::init(log::LevelFilter::Info);
    log::info!("nucleon kernel starting");
    log::info!("scheduler ready, tid 0 = idle");
    let _ = &*sched::SCHEDULER;
    halt();
}
