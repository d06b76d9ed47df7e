//! # cal_virtio
//!
//! VirtIO transport layer for the Caldera display driver:
//!
//! - [`MmioBus`]: fixed-stride device discovery on the virtio-mmio window
//! - [`Transport`] trait and the [`MmioTransport`] implementation covering
//!   both the legacy (v1) and modern (v2) register generations
//! - [`VirtQueue`]: a split virtqueue over caller-provided ring memory
//!
//! The layer is deliberately synchronous: one request is outstanding at any
//! instant and completions are polled, never interrupt-driven.

#![no_std]

use bitflags::bitflags;

pub mod hal;
pub mod mmio;
pub mod queue;
pub mod transport;

pub use hal::{PAGE_SIZE, VirtioHal};
pub use mmio::{MmioBus, MmioTransport, MmioVersion, QEMU_VIRT_MMIO};
pub use queue::{Descriptor, DescriptorFlags, QueueMemory, VirtQueue, VirtQueueError};
pub use transport::{DeviceType, QueueRegions, Transport, TransportError};

bitflags! {
    /// Device status bits per VirtIO 1.1 spec section 2.1.
    ///
    /// Written cumulatively during the handshake; the driver only ever adds
    /// bits, it never clears one short of a full reset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceStatus: u32 {
        const ACKNOWLEDGE = 1;
        const DRIVER = 2;
        const DRIVER_OK = 4;
        const FEATURES_OK = 8;
        const DEVICE_NEEDS_RESET = 64;
        const FAILED = 128;
    }
}
