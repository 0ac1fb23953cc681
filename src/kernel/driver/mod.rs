//! デバイスドライバモジュール

pub mod console;
pub mod serial;

pub use console::{
    DOUBLE_PANIC, FIRST_PANIC, NORMAL, PanicLevel, enter_panic, set_hypercall_console,
    set_serial_console, write_console, write_debug,
};
pub use serial::{SERIAL1, SerialPort};
