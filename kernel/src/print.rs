//! Kernel print macros.
//!
//! On bare metal these write to the serial port (`serial.rs`); on the host
//! test target they fall back to `std::println!` so unit tests can run with
//! the ordinary `cargo test` harness.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
