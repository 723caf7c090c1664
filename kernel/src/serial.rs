//! Serial output backing the `print!`/`println!` macros and the `log`
//! facade's kernel logger.
//!
//! Bare metal writes through a 16550 UART; the host test target writes to
//! stdout via `std`, so the same `log::info!("...")` call in scheduler/VM
//! code behaves identically whether it runs under QEMU or `cargo test`.

use core::fmt::{self, Write};

use spin::Mutex;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
struct Writer(uart_16550::SerialPort);

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
impl Writer {
    fn new() -> Self {
        let mut port = unsafe { uart_16550::SerialPort::new(0x3F8) };
        port.init();
        Self(port)
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
impl Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s)
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
struct Writer;

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
impl Writer {
    fn new() -> Self {
        Self
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
impl Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        #[cfg(not(target_os = "none"))]
        {
            std::print!("{s}");
        }
        #[cfg(target_os = "none")]
        {
            let _ = s;
        }
        Ok(())
    }
}

static SERIAL: Mutex<Option<Writer>> = Mutex::new(None);

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let mut guard = SERIAL.lock();
    let writer = guard.get_or_insert_with(Writer::new);
    let _ = writer.write_fmt(args);
}

/// A minimal `log::Log` implementation that writes through the serial/stdout
/// sink above, at a level controlled by `KernelConfig::log_level`.
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger as the global `log` facade backend.
///
/// Idempotent: a second call after the first returns `Err` from
/// `log::set_logger`, which this ignores (reinitialization during tests).
pub fn init(level: log::LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
