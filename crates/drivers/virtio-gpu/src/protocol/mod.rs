//! VirtIO GPU protocol records per VirtIO 1.1 section 5.7.
//!
//! All records are `#[repr(C)]` and `bytemuck::Pod`: requests are written
//! into driver-owned memory byte-for-byte, responses are read back the same
//! way. Fields are in the device's native byte order; nothing is swapped.

mod commands;
mod formats;

pub use commands::*;
pub use formats::Format;

use bytemuck::{Pod, Zeroable};

use cal_virtio::{TransportError, VirtQueueError};

/// Errors raised by the GPU driver. Every one of them is unrecoverable at
/// this layer; the caller is expected to log and halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuError {
    /// Discovery or handshake failed.
    Transport(TransportError),
    /// Ring operation failed.
    Queue(VirtQueueError),
    /// The response type is not the success constant this command expects.
    ResponseTypeMismatch { expected: u32, got: u32 },
    /// The device answered with an in-band error response.
    DeviceReportedError(CtrlType),
    /// Present was called before bring-up reached the ready state.
    NotReady,
}

impl From<TransportError> for GpuError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<VirtQueueError> for GpuError {
    fn from(e: VirtQueueError) -> Self {
        Self::Queue(e)
    }
}

/// Newtype for resource IDs to prevent mixing with other u32 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Rectangle used throughout the GPU protocol.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `width` x `height`.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Control header type field values.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlType {
    // 2D commands
    GetDisplayInfo = 0x0100,
    ResourceCreate2d = 0x0101,
    ResourceUnref = 0x0102,
    SetScanout = 0x0103,
    ResourceFlush = 0x0104,
    TransferToHost2d = 0x0105,
    ResourceAttachBacking = 0x0106,
    ResourceDetachBacking = 0x0107,

    // Success responses
    OkNodata = 0x1100,
    OkDisplayInfo = 0x1101,

    // Error responses
    ErrUnspec = 0x1200,
    ErrOutOfMemory = 0x1201,
    ErrInvalidScanoutId = 0x1202,
    ErrInvalidResourceId = 0x1203,
    ErrInvalidContextId = 0x1204,
    ErrInvalidParameter = 0x1205,
}

impl CtrlType {
    /// Whether this is an error response.
    pub const fn is_error(self) -> bool {
        (self as u32) >= 0x1200
    }

    /// Try to parse from a raw header type field.
    pub fn from_raw(val: u32) -> Option<Self> {
        match val {
            0x0100 => Some(Self::GetDisplayInfo),
            0x0101 => Some(Self::ResourceCreate2d),
            0x0102 => Some(Self::ResourceUnref),
            0x0103 => Some(Self::SetScanout),
            0x0104 => Some(Self::ResourceFlush),
            0x0105 => Some(Self::TransferToHost2d),
            0x0106 => Some(Self::ResourceAttachBacking),
            0x0107 => Some(Self::ResourceDetachBacking),
            0x1100 => Some(Self::OkNodata),
            0x1101 => Some(Self::OkDisplayInfo),
            0x1200 => Some(Self::ErrUnspec),
            0x1201 => Some(Self::ErrOutOfMemory),
            0x1202 => Some(Self::ErrInvalidScanoutId),
            0x1203 => Some(Self::ErrInvalidResourceId),
            0x1204 => Some(Self::ErrInvalidContextId),
            0x1205 => Some(Self::ErrInvalidParameter),
            _ => None,
        }
    }
}

/// Control header shared by every command and response.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CtrlHeader {
    /// Command or response type.
    pub ctrl_type: u32,
    /// Flags (fence request; unused by this synchronous driver).
    pub flags: u32,
    /// Fence correlation value; unused in the one-at-a-time design.
    pub fence_id: u64,
    /// Context ID (3D only, zero for 2D).
    pub ctx_id: u32,
    pub padding: u32,
}

impl CtrlHeader {
    /// Size of the control header in bytes.
    pub const SIZE: usize = 24;

    pub const fn new(ctrl_type: CtrlType) -> Self {
        Self {
            ctrl_type: ctrl_type as u32,
            flags: 0,
            fence_id: 0,
            ctx_id: 0,
            padding: 0,
        }
    }
}

/// Maximum number of scanouts a display-info response describes.
pub const MAX_SCANOUTS: usize = 16;

/// Display information for a single scanout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct DisplayOne {
    pub rect: Rect,
    pub enabled: u32,
    pub flags: u32,
}

const _: () = assert!(size_of::<CtrlHeader>() == CtrlHeader::SIZE);
const _: () = assert!(size_of::<Rect>() == 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_type_classification() {
        assert!(CtrlType::ErrInvalidResourceId.is_error());
        assert!(!CtrlType::OkNodata.is_error());
        assert_eq!(CtrlType::from_raw(0x0105), Some(CtrlType::TransferToHost2d));
        assert_eq!(CtrlType::from_raw(0xdead), None);
    }

    #[test]
    fn header_layout() {
        assert_eq!(core::mem::offset_of!(CtrlHeader, ctrl_type), 0);
        assert_eq!(core::mem::offset_of!(CtrlHeader, flags), 4);
        assert_eq!(core::mem::offset_of!(CtrlHeader, fence_id), 8);
        assert_eq!(core::mem::offset_of!(CtrlHeader, ctx_id), 16);
        assert_eq!(core::mem::offset_of!(CtrlHeader, padding), 20);
    }
}
