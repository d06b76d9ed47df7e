//! Hardware access layer for the Caldera demo kernel.
//!
//! Everything here runs with interrupts disabled; the driver stack above is
//! polling-only, so the console lock is a plain spinlock and the CPU
//! primitives are limited to barriers, spin hints and the terminal park loop.

#![no_std]

pub mod console;
pub mod cpu;
pub mod uart_pl011;
