//! Global serial console on UART0.

use crate::uart_pl011::Pl011Uart;
use core::fmt::{self, Write};
use spin::Mutex;

pub const UART0_BASE: usize = 0x0900_0000;

static WRITER: Mutex<Pl011Uart> = Mutex::new(Pl011Uart::new(UART0_BASE));

pub fn init() {
    WRITER.lock().init();
}

pub fn _print(args: fmt::Arguments) {
    let _ = WRITER.lock().write_fmt(args);
}

impl Write for Pl011Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
