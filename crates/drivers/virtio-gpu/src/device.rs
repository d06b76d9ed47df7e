//! GPU device bring-up and the steady-state present cycle.

use bytemuck::{Zeroable, bytes_of, bytes_of_mut};
use cal_hal::cpu;
use cal_virtio::{
    DeviceStatus, QueueMemory, Transport, TransportError, VirtQueue, VirtioHal,
};

use crate::protocol::{
    CmdAttachBackingOne, CmdGetDisplayInfo, CmdResourceCreate2d, CmdResourceFlush, CmdSetScanout,
    CmdTransferToHost2d, CtrlType, DisplayOne, Format, GpuCommand, GpuError, GpuReply, Rect,
    RespDisplayInfo, RespNoData, ResourceId,
};

/// The control queue is the only queue this driver uses.
pub const CONTROL_QUEUE: u16 = 0;

/// Fixed ring depth; devices reporting a smaller maximum are rejected.
pub const QUEUE_DEPTH: usize = 16;

/// Driver configuration fixed at bring-up.
#[derive(Debug, Clone, Copy)]
pub struct GpuConfig {
    /// Scanout to bind (usually 0).
    pub scanout_id: u32,
    /// Pixel format of the backing buffer.
    pub format: Format,
    /// Resource ID to create and reference in every later command.
    pub resource_id: ResourceId,
    /// Resource width in pixels.
    pub width: u32,
    /// Resource height in pixels.
    pub height: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            scanout_id: 0,
            format: Format::B8G8R8A8Unorm,
            resource_id: ResourceId::new(1),
            width: 800,
            height: 600,
        }
    }
}

/// The backing buffer as registered with the device.
///
/// The buffer itself is owned by the renderer; the driver keeps address
/// and length only and never copies or frees it.
#[derive(Debug, Clone, Copy)]
pub struct Backing {
    pub addr: u64,
    pub len: u32,
}

/// Bring-up state machine, in command order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    QueryingDisplayInfo,
    CreatingResource,
    AttachingBacking,
    SettingScanout,
    /// Scanout bound; the present cycle is available.
    Ready,
    /// A fatal response was observed; no recovery exists.
    Failed,
}

impl DriverState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Operation counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverTelemetry {
    pub commands_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub transfers: u64,
    pub flushes: u64,
    pub stall_reports: u64,
}

/// Snapshot handed to the stall watchdog while a completion is overdue.
#[derive(Debug, Clone, Copy)]
pub struct StallReport {
    pub spins: u32,
    pub avail_idx: u16,
    pub used_idx: u16,
    pub interrupt_status: u32,
    pub device_status: u32,
}

/// Completion-poll watchdog policy.
///
/// The driver has no recovery path, so a stuck device produces periodic
/// diagnostics through `on_stall` while polling continues; there is no
/// hard timeout.
#[derive(Clone, Copy)]
pub struct PollPolicy {
    /// Invoke `on_stall` every this many spins; zero disables reporting.
    pub report_every: u32,
    pub on_stall: fn(&StallReport),
}

fn discard_stall(_report: &StallReport) {}

impl PollPolicy {
    /// No diagnostics at all.
    pub const fn silent() -> Self {
        Self {
            report_every: 0,
            on_stall: discard_stall,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            report_every: 20_000_000,
            on_stall: discard_stall,
        }
    }
}

/// Geometry of one scanout as reported by GET_DISPLAY_INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    pub enabled: bool,
}

impl From<&DisplayOne> for DisplayInfo {
    fn from(d: &DisplayOne) -> Self {
        Self {
            width: d.rect.width,
            height: d.rect.height,
            enabled: d.enabled != 0,
        }
    }
}

/// A virtio-gpu device driven through one synchronous control queue.
///
/// Owns the transport and the ring exclusively for the process lifetime.
/// Construction performs the whole bring-up: status handshake, feature
/// negotiation (the empty set), queue activation, then display query,
/// resource creation, backing attachment and scanout binding.
pub struct GpuDevice<H: VirtioHal, T: Transport> {
    transport: T,
    queue: VirtQueue<QUEUE_DEPTH, H>,
    config: GpuConfig,
    backing: Backing,
    status: DeviceStatus,
    state: DriverState,
    display: DisplayInfo,
    telemetry: DriverTelemetry,
    poll: PollPolicy,
}

impl<H: VirtioHal, T: Transport> core::fmt::Debug for GpuDevice<H, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GpuDevice")
            .field("config", &self.config)
            .field("backing", &self.backing)
            .field("status", &self.status)
            .field("state", &self.state)
            .field("display", &self.display)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl<H: VirtioHal, T: Transport> GpuDevice<H, T> {
    /// Bring the device up to the ready state.
    ///
    /// `queue_mem` is the statically-allocated ring memory; `backing` is
    /// the renderer-owned pixel buffer to register with the device.
    pub fn new(
        transport: T,
        queue_mem: &'static mut QueueMemory<QUEUE_DEPTH>,
        config: GpuConfig,
        backing: Backing,
        poll: PollPolicy,
    ) -> Result<Self, GpuError> {
        let queue = VirtQueue::new(queue_mem);
        let mut dev = Self {
            transport,
            queue,
            config,
            backing,
            status: DeviceStatus::empty(),
            state: DriverState::Uninitialized,
            display: DisplayInfo::default(),
            telemetry: DriverTelemetry::default(),
            poll,
        };
        dev.handshake()?;
        dev.bring_up()?;
        Ok(dev)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    /// Scanout geometry reported by the device (informational).
    pub fn display_info(&self) -> &DisplayInfo {
        &self.display
    }

    pub fn telemetry(&self) -> &DriverTelemetry {
        &self.telemetry
    }

    /// Push the current backing-buffer contents to the screen.
    ///
    /// Transfer-to-host followed by resource-flush over the full resource
    /// rectangle; the frame counts as presented only after both responses
    /// validate.
    pub fn present(&mut self) -> Result<(), GpuError> {
        if !self.state.is_ready() {
            return Err(GpuError::NotReady);
        }
        let rect = Rect::from_size(self.config.width, self.config.height);

        let _: RespNoData = self.exchange(&CmdTransferToHost2d::new(
            self.config.resource_id,
            rect,
            0,
        ))?;
        self.telemetry.transfers += 1;

        let _: RespNoData =
            self.exchange(&CmdResourceFlush::new(self.config.resource_id, rect))?;
        self.telemetry.flushes += 1;

        Ok(())
    }

    /// Status bits are only ever added; the accumulated value is written
    /// back whole.
    fn add_status(&mut self, bits: DeviceStatus) {
        self.status |= bits;
        self.transport.write_status(self.status);
    }

    /// Drive the status register Reset → Acknowledge → Driver →
    /// FeaturesOk → (queue activation) → DriverOk.
    fn handshake(&mut self) -> Result<(), GpuError> {
        self.transport.reset();
        self.status = DeviceStatus::empty();
        self.add_status(DeviceStatus::ACKNOWLEDGE);
        self.add_status(DeviceStatus::DRIVER);

        // Negotiate the empty feature set: read what the device offers,
        // accept none of it.
        let _offered = self.transport.read_device_features();
        self.transport.write_driver_features(0);
        self.add_status(DeviceStatus::FEATURES_OK);

        let need = VirtQueue::<QUEUE_DEPTH, H>::depth();
        let max = self.transport.max_queue_size(CONTROL_QUEUE);
        if max < need {
            return Err(TransportError::QueueTooSmall { max, need }.into());
        }
        self.transport
            .queue_set(CONTROL_QUEUE, need, self.queue.regions());

        self.add_status(DeviceStatus::DRIVER_OK);
        Ok(())
    }

    /// Display query, resource creation, backing attachment, scanout.
    fn bring_up(&mut self) -> Result<(), GpuError> {
        self.state = DriverState::QueryingDisplayInfo;
        let info: RespDisplayInfo = self.exchange(&CmdGetDisplayInfo::new())?;
        self.display = DisplayInfo::from(&info.pmodes[self.config.scanout_id as usize]);

        self.state = DriverState::CreatingResource;
        let _: RespNoData = self.exchange(&CmdResourceCreate2d::new(
            self.config.resource_id,
            self.config.format,
            self.config.width,
            self.config.height,
        ))?;

        self.state = DriverState::AttachingBacking;
        let _: RespNoData = self.exchange(&CmdAttachBackingOne::new(
            self.config.resource_id,
            self.backing.addr,
            self.backing.len,
        ))?;

        self.state = DriverState::SettingScanout;
        let _: RespNoData = self.exchange(&CmdSetScanout::new(
            self.config.scanout_id,
            self.config.resource_id,
            Rect::from_size(self.config.width, self.config.height),
        ))?;

        self.state = DriverState::Ready;
        Ok(())
    }

    /// One synchronous request/response exchange on the control queue.
    fn exchange<C: GpuCommand>(&mut self, cmd: &C) -> Result<C::Reply, GpuError> {
        let mut reply = C::Reply::zeroed();

        self.queue.submit(bytes_of(cmd), bytes_of_mut(&mut reply))?;
        self.transport.queue_notify(CONTROL_QUEUE);
        self.telemetry.commands_sent += 1;

        self.wait_for_completion();
        let _ = self.queue.pop_used();
        self.telemetry.responses_received += 1;

        self.validate(reply)
    }

    /// Busy-poll the completion index, emitting a stall report on the
    /// configured cadence. Polling never aborts: with no recovery path,
    /// liveness diagnosis is all the watchdog provides.
    fn wait_for_completion(&mut self) {
        let mut spins: u32 = 0;
        while !self.queue.has_used() {
            spins = spins.wrapping_add(1);
            if self.poll.report_every != 0 && spins % self.poll.report_every == 0 {
                let (avail_idx, used_idx) = self.queue.indices();
                let report = StallReport {
                    spins,
                    avail_idx,
                    used_idx,
                    interrupt_status: self.transport.interrupt_status(),
                    device_status: self.transport.read_status(),
                };
                (self.poll.on_stall)(&report);
                self.telemetry.stall_reports += 1;
            }
            cpu::spin_hint();
        }
    }

    /// Validate a response header: an error-range type is
    /// `DeviceReportedError`, anything other than the expected success
    /// constant is `ResponseTypeMismatch`. Both are fatal.
    fn validate<R: GpuReply>(&mut self, reply: R) -> Result<R, GpuError> {
        let got = reply.header().ctrl_type;
        if let Some(t) = CtrlType::from_raw(got) {
            if t.is_error() {
                self.state = DriverState::Failed;
                self.telemetry.errors += 1;
                return Err(GpuError::DeviceReportedError(t));
            }
        }
        if got != R::EXPECTED as u32 {
            self.state = DriverState::Failed;
            self.telemetry.errors += 1;
            return Err(GpuError::ResponseTypeMismatch {
                expected: R::EXPECTED as u32,
                got,
            });
        }
        Ok(reply)
    }
}
