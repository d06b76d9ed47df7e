//! End-to-end driver tests against an in-process fake device.
//!
//! The fake implements the `Transport` trait and services the ring the way
//! the host emulator does: it walks the availability ring, follows each
//! two-descriptor chain, parses the command record, writes a response into
//! the device-writable buffer and publishes a used entry.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{bytes_of, pod_read_unaligned};
use cal_virtio::{
    DeviceStatus, DeviceType, QueueMemory, QueueRegions, Transport, TransportError, VirtQueue,
    VirtQueueError, VirtioHal,
};
use cal_virtio_gpu::protocol::{
    CmdAttachBackingOne, CmdResourceCreate2d, CtrlHeader, CtrlType, DisplayOne, RespDisplayInfo,
};
use cal_virtio_gpu::{
    Backing, GpuConfig, GpuDevice, GpuError, PollPolicy, QUEUE_DEPTH, Rect, StallReport,
};

struct HostHal;

// SAFETY: the test address space is identity-mapped as far as the fake
// device is concerned.
unsafe impl VirtioHal for HostHal {
    fn virt_to_phys(vaddr: usize) -> u64 {
        vaddr as u64
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Normal,
    /// Answer every command with an OK_DISPLAY_INFO header.
    WrongType,
    /// Answer every command with an error response.
    ErrorResponse,
    /// Defer servicing until the driver probes the interrupt-status
    /// register, which only happens from the stall watchdog.
    StallUntilProbed,
}

struct QueueConfig {
    size: u16,
    regions: QueueRegions,
    ready: bool,
}

struct FakeState {
    behavior: Behavior,
    max_queue: u16,
    queue: Option<QueueConfig>,
    last_avail: u16,
    pending_notify: bool,
    status_writes: Vec<u32>,
    status: u32,
    features_written: Option<u64>,
    commands: Vec<u32>,
    create: Option<CmdResourceCreate2d>,
    attach: Option<CmdAttachBackingOne>,
    scanouts: u32,
}

#[derive(Clone)]
struct FakeGpu(Rc<RefCell<FakeState>>);

impl FakeGpu {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(FakeState {
            behavior: Behavior::Normal,
            max_queue: 16,
            queue: None,
            last_avail: 0,
            pending_notify: false,
            status_writes: Vec::new(),
            status: 0,
            features_written: None,
            commands: Vec::new(),
            create: None,
            attach: None,
            scanouts: 0,
        })))
    }

    fn set_behavior(&self, behavior: Behavior) {
        self.0.borrow_mut().behavior = behavior;
    }

    fn set_max_queue(&self, max: u16) {
        self.0.borrow_mut().max_queue = max;
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawDesc {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

/// Walk every chain the driver has published and answer it.
fn service(state: &mut FakeState) {
    let Some(q) = state.queue.as_ref() else {
        return;
    };
    if !q.ready {
        return;
    }
    let size = usize::from(q.size);
    let desc = q.regions.desc as usize;
    let driver = q.regions.driver as usize;
    let device = q.regions.device as usize;

    loop {
        let avail_idx = unsafe { std::ptr::read_volatile((driver + 2) as *const u16) };
        if state.last_avail == avail_idx {
            break;
        }
        let slot = usize::from(state.last_avail) % size;
        let head = unsafe { std::ptr::read_volatile((driver + 4 + 2 * slot) as *const u16) };

        let first = unsafe {
            std::ptr::read_volatile((desc + 16 * usize::from(head)) as *const RawDesc)
        };
        assert_eq!(first.flags & 1, 1, "request descriptor must chain");
        let second = unsafe {
            std::ptr::read_volatile((desc + 16 * usize::from(first.next)) as *const RawDesc)
        };
        assert_eq!(second.flags & 2, 2, "response descriptor must be writable");

        let out = unsafe {
            std::slice::from_raw_parts(first.addr as usize as *const u8, first.len as usize)
        };
        let input = unsafe {
            std::slice::from_raw_parts_mut(second.addr as usize as *mut u8, second.len as usize)
        };
        let written = handle_command(state, out, input);

        let used_idx = unsafe { std::ptr::read_volatile((device + 2) as *const u16) };
        let used_slot = usize::from(used_idx) % size;
        unsafe {
            std::ptr::write_volatile((device + 4 + 8 * used_slot) as *mut u32, u32::from(head));
            std::ptr::write_volatile(
                (device + 4 + 8 * used_slot + 4) as *mut u32,
                written as u32,
            );
            std::sync::atomic::fence(Ordering::Release);
            std::ptr::write_volatile((device + 2) as *mut u16, used_idx.wrapping_add(1));
        }
        state.last_avail = state.last_avail.wrapping_add(1);
    }
}

fn respond(input: &mut [u8], bytes: &[u8]) -> usize {
    let n = input.len().min(bytes.len());
    input[..n].copy_from_slice(&bytes[..n]);
    n
}

fn handle_command(state: &mut FakeState, out: &[u8], input: &mut [u8]) -> usize {
    let ctrl_type = u32::from_le_bytes(out[0..4].try_into().unwrap());
    state.commands.push(ctrl_type);

    match state.behavior {
        Behavior::WrongType => {
            let header = CtrlHeader::new(CtrlType::OkDisplayInfo);
            return respond(input, bytes_of(&header));
        }
        Behavior::ErrorResponse => {
            let header = CtrlHeader::new(CtrlType::ErrInvalidResourceId);
            return respond(input, bytes_of(&header));
        }
        Behavior::Normal | Behavior::StallUntilProbed => {}
    }

    match CtrlType::from_raw(ctrl_type) {
        Some(CtrlType::GetDisplayInfo) => {
            let mut resp = RespDisplayInfo {
                header: CtrlHeader::new(CtrlType::OkDisplayInfo),
                pmodes: [DisplayOne::default(); 16],
            };
            resp.pmodes[0] = DisplayOne {
                rect: Rect::from_size(1024, 768),
                enabled: 1,
                flags: 0,
            };
            respond(input, bytes_of(&resp))
        }
        Some(CtrlType::ResourceCreate2d) => {
            state.create = Some(pod_read_unaligned(out));
            respond(input, bytes_of(&CtrlHeader::new(CtrlType::OkNodata)))
        }
        Some(CtrlType::ResourceAttachBacking) => {
            state.attach = Some(pod_read_unaligned(out));
            respond(input, bytes_of(&CtrlHeader::new(CtrlType::OkNodata)))
        }
        Some(CtrlType::SetScanout) => {
            state.scanouts += 1;
            respond(input, bytes_of(&CtrlHeader::new(CtrlType::OkNodata)))
        }
        Some(CtrlType::TransferToHost2d | CtrlType::ResourceFlush) => {
            respond(input, bytes_of(&CtrlHeader::new(CtrlType::OkNodata)))
        }
        other => panic!("fake device received unexpected command {other:?}"),
    }
}

impl Transport for FakeGpu {
    fn device_type(&self) -> DeviceType {
        DeviceType::Gpu
    }

    fn read_device_features(&mut self) -> u64 {
        0
    }

    fn write_driver_features(&mut self, features: u64) {
        self.0.borrow_mut().features_written = Some(features);
    }

    fn read_status(&self) -> u32 {
        self.0.borrow().status
    }

    fn write_status(&mut self, status: DeviceStatus) {
        let mut s = self.0.borrow_mut();
        s.status = status.bits();
        s.status_writes.push(status.bits());
    }

    fn max_queue_size(&mut self, _queue: u16) -> u16 {
        self.0.borrow().max_queue
    }

    fn queue_set(&mut self, _queue: u16, size: u16, regions: QueueRegions) {
        self.0.borrow_mut().queue = Some(QueueConfig {
            size,
            regions,
            ready: true,
        });
    }

    fn queue_notify(&mut self, _queue: u16) {
        let mut s = self.0.borrow_mut();
        if s.behavior == Behavior::StallUntilProbed {
            s.pending_notify = true;
            return;
        }
        service(&mut s);
    }

    fn interrupt_status(&self) -> u32 {
        let mut s = self.0.borrow_mut();
        if s.pending_notify {
            s.pending_notify = false;
            service(&mut s);
        }
        0
    }

    fn reset(&mut self) {
        let mut s = self.0.borrow_mut();
        s.status = 0;
        s.status_writes.push(0);
    }
}

struct TestRig {
    fake: FakeGpu,
    framebuffer: Vec<u8>,
}

impl TestRig {
    fn new() -> Self {
        Self {
            fake: FakeGpu::new(),
            framebuffer: vec![0u8; 800 * 600 * 4],
        }
    }

    fn backing(&self) -> Backing {
        Backing {
            addr: self.framebuffer.as_ptr() as u64,
            len: self.framebuffer.len() as u32,
        }
    }

    fn bring_up(&self) -> Result<GpuDevice<HostHal, FakeGpu>, GpuError> {
        let queue_mem = Box::leak(Box::new(QueueMemory::new()));
        GpuDevice::new(
            self.fake.clone(),
            queue_mem,
            GpuConfig::default(),
            self.backing(),
            PollPolicy::silent(),
        )
    }
}

#[test]
fn bring_up_reaches_ready() {
    let rig = TestRig::new();
    let gpu = rig.bring_up().unwrap();

    assert!(gpu.state().is_ready());
    assert_eq!(gpu.display_info().width, 1024);
    assert_eq!(gpu.display_info().height, 768);
    assert!(gpu.display_info().enabled);

    let state = rig.fake.0.borrow();
    // Reset, then strictly cumulative status bits.
    assert_eq!(state.status_writes, vec![0, 1, 3, 11, 15]);
    // The empty feature set was negotiated.
    assert_eq!(state.features_written, Some(0));

    let q = state.queue.as_ref().unwrap();
    assert_eq!(q.size, 16);
    // Two-region layout: avail right behind the descriptor table, used
    // ring on the next page.
    assert_eq!(q.regions.driver, q.regions.desc + 16 * 16);
    assert_eq!(q.regions.device, q.regions.desc + 4096);

    assert_eq!(state.commands, vec![0x0100, 0x0101, 0x0106, 0x0103]);
    let create = state.create.unwrap();
    assert_eq!(
        (create.resource_id, create.format, create.width, create.height),
        (1, 1, 800, 600)
    );
    let attach = state.attach.unwrap();
    assert_eq!(attach.nr_entries, 1);
    assert_eq!(attach.entry.addr, rig.backing().addr);
    assert_eq!(attach.entry.length, rig.backing().len);

    assert_eq!(gpu.telemetry().commands_sent, 4);
    assert_eq!(gpu.telemetry().responses_received, 4);
    assert_eq!(gpu.telemetry().errors, 0);
}

#[test]
fn present_cycle_is_idempotent() {
    let rig = TestRig::new();
    let mut gpu = rig.bring_up().unwrap();

    gpu.present().unwrap();
    gpu.present().unwrap();

    let state = rig.fake.0.borrow();
    assert_eq!(
        state.commands[4..],
        [0x0105, 0x0104, 0x0105, 0x0104],
        "each present is transfer then flush"
    );
    // Bindings unchanged: still one resource, one scanout.
    assert_eq!(state.scanouts, 1);
    assert!(state.create.is_some());
    assert_eq!(gpu.telemetry().transfers, 2);
    assert_eq!(gpu.telemetry().flushes, 2);
}

#[test]
fn queue_too_small_is_fatal() {
    let rig = TestRig::new();
    rig.fake.set_max_queue(8);

    let err = rig.bring_up().unwrap_err();
    assert_eq!(
        err,
        GpuError::Transport(TransportError::QueueTooSmall { max: 8, need: 16 })
    );
}

#[test]
fn wrong_response_type_is_fatal() {
    let rig = TestRig::new();
    rig.fake.set_behavior(Behavior::WrongType);

    // GET_DISPLAY_INFO happens to expect that header; the next command
    // does not.
    let err = rig.bring_up().unwrap_err();
    assert_eq!(
        err,
        GpuError::ResponseTypeMismatch {
            expected: 0x1100,
            got: 0x1101
        }
    );
}

#[test]
fn device_error_response_is_fatal() {
    let rig = TestRig::new();
    rig.fake.set_behavior(Behavior::ErrorResponse);

    let err = rig.bring_up().unwrap_err();
    assert_eq!(
        err,
        GpuError::DeviceReportedError(CtrlType::ErrInvalidResourceId)
    );
}

#[test]
fn present_after_failure_reports_not_ready() {
    let rig = TestRig::new();
    let mut gpu = rig.bring_up().unwrap();

    rig.fake.set_behavior(Behavior::ErrorResponse);
    assert_eq!(
        gpu.present().unwrap_err(),
        GpuError::DeviceReportedError(CtrlType::ErrInvalidResourceId)
    );
    // The session is dead; no further present is attempted.
    assert_eq!(gpu.present().unwrap_err(), GpuError::NotReady);
}

static STALLS: AtomicU64 = AtomicU64::new(0);

fn count_stall(report: &StallReport) {
    assert_eq!(report.used_idx, report.avail_idx.wrapping_sub(1));
    STALLS.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn stall_watchdog_reports_and_polling_continues() {
    let rig = TestRig::new();
    rig.fake.set_behavior(Behavior::StallUntilProbed);

    let queue_mem = Box::leak(Box::new(QueueMemory::new()));
    let gpu = GpuDevice::<HostHal, _>::new(
        rig.fake.clone(),
        queue_mem,
        GpuConfig::default(),
        rig.backing(),
        PollPolicy {
            report_every: 1_000,
            on_stall: count_stall,
        },
    )
    .unwrap();

    assert!(gpu.state().is_ready());
    assert!(STALLS.load(Ordering::Relaxed) >= 1);
    assert!(gpu.telemetry().stall_reports >= 1);
}

#[test]
fn descriptor_exhaustion_is_surfaced() {
    // Exercised at the queue layer: the one-at-a-time driver never hits
    // it, but the error must propagate, not corrupt the ring.
    let queue_mem = Box::leak(Box::new(QueueMemory::<QUEUE_DEPTH>::new()));
    let mut queue: VirtQueue<QUEUE_DEPTH, HostHal> = VirtQueue::new(queue_mem);
    let out = [0u8; 4];
    let mut input = [0u8; 4];
    for _ in 0..QUEUE_DEPTH / 2 {
        queue.submit(&out, &mut input).unwrap();
    }
    assert_eq!(
        queue.submit(&out, &mut input).unwrap_err(),
        VirtQueueError::DescriptorExhaustion
    );
}
