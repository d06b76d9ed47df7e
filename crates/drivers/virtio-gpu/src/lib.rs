//! # cal_virtio_gpu
//!
//! VirtIO GPU 2D driver: wire-protocol records, the bring-up state machine
//! (resource creation, backing attachment, scanout binding) and the
//! per-frame transfer+flush present cycle.
//!
//! The driver is one-shot and non-recoverable: any response that is not the
//! expected success constant is fatal to the session, mirroring its
//! bare-metal operating context.

#![no_std]

pub mod device;
pub mod display;
pub mod protocol;

pub use device::{
    Backing, CONTROL_QUEUE, DisplayInfo, DriverState, DriverTelemetry, GpuConfig, GpuDevice,
    PollPolicy, QUEUE_DEPTH, StallReport,
};
pub use display::Frame;
pub use protocol::{CtrlHeader, CtrlType, Format, GpuError, Rect, ResourceId};
