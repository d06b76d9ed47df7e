//! Transport abstraction over the virtio register file.

use crate::DeviceStatus;

/// Errors raised while locating or configuring a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No slot in the scanned window carried the requested device type.
    DeviceNotFound,
    /// The signature matched but the version register is not a generation
    /// this driver speaks.
    UnsupportedTransportVersion(u32),
    /// The device's maximum queue depth cannot satisfy the fixed ring size.
    QueueTooSmall { max: u16, need: u16 },
}

/// VirtIO device type identifiers per VirtIO 1.1 spec section 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceType {
    Invalid = 0,
    Network = 1,
    Block = 2,
    Console = 3,
    Entropy = 4,
    Gpu = 16,
    Input = 18,
}

impl From<u32> for DeviceType {
    fn from(value: u32) -> Self {
        match value {
            1 => DeviceType::Network,
            2 => DeviceType::Block,
            3 => DeviceType::Console,
            4 => DeviceType::Entropy,
            16 => DeviceType::Gpu,
            18 => DeviceType::Input,
            _ => DeviceType::Invalid,
        }
    }
}

/// Bus addresses of the three ring regions, as registered with the device.
///
/// `desc` doubles as the base of the whole contiguous queue region on the
/// legacy transport, which derives the other two placements from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRegions {
    /// Descriptor table.
    pub desc: u64,
    /// Availability ring (driver area).
    pub driver: u64,
    /// Completion ring (device area).
    pub device: u64,
}

/// Register-level operations a virtio transport provides.
///
/// Implemented by [`crate::MmioTransport`] for real hardware and by fake
/// devices in tests.
pub trait Transport {
    /// Device type from the identification register.
    fn device_type(&self) -> DeviceType;

    /// Read the full device feature set (words 0 and 1).
    ///
    /// Legacy transports only expose word 0; the high half reads as zero.
    fn read_device_features(&mut self) -> u64;

    /// Write the driver's accepted feature set.
    ///
    /// Legacy transports must only see a word-0 write; selecting word 1 on
    /// a v1 device is a guest error.
    fn write_driver_features(&mut self, features: u64);

    /// Raw status register value.
    fn read_status(&self) -> u32;

    /// Replace the status register with the accumulated bit set.
    fn write_status(&mut self, status: DeviceStatus);

    /// Maximum depth the device supports for `queue`.
    fn max_queue_size(&mut self, queue: u16) -> u16;

    /// Register ring memory for `queue` and mark it live.
    fn queue_set(&mut self, queue: u16, size: u16, regions: QueueRegions);

    /// Ring the doorbell for `queue`.
    fn queue_notify(&mut self, queue: u16);

    /// Raw interrupt status, read for stall diagnostics only.
    fn interrupt_status(&self) -> u32;

    /// Write zero to the status register, resetting the device.
    fn reset(&mut self);
}
