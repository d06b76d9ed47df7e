//! Caldera kernel: a heat-diffusion simulation presented through a
//! virtio-gpu device on QEMU's aarch64 `virt` machine.
//!
//! Boot code reaches [`rust_main`] with interrupts masked and a valid
//! stack; everything after that is a single polling call path. Fatal
//! driver errors have no recovery: they are logged to the serial console
//! and the CPU parks.

#![no_std]
#![no_main]

mod hal_impl;
mod heat;
mod logger;

use core::panic::PanicInfo;
use core::ptr::addr_of_mut;

use cal_virtio::{DeviceType, QEMU_VIRT_MMIO, QueueMemory};
use cal_virtio_gpu::{
    Backing, GpuConfig, GpuDevice, GpuError, PollPolicy, QUEUE_DEPTH, StallReport,
};
use hal_impl::IdentityHal;
use heat::HeatField;

const FB_WIDTH: u32 = 800;
const FB_HEIGHT: u32 = 600;
const FB_BYTES: usize = (FB_WIDTH as usize) * (FB_HEIGHT as usize) * 4;

#[repr(C, align(4096))]
struct FrameBuffer([u8; FB_BYTES]);

// Statically-sized, alignment-satisfying buffers handed to the driver;
// there is no allocator. Each is borrowed exactly once, in run().
static mut FRAMEBUFFER: FrameBuffer = FrameBuffer([0; FB_BYTES]);
static mut QUEUE_MEMORY: QueueMemory<QUEUE_DEPTH> = QueueMemory::new();
static mut SIM: HeatField = HeatField::new();

#[unsafe(no_mangle)]
pub extern "C" fn rust_main() -> ! {
    cal_hal::console::init();
    logger::init(log::LevelFilter::Info);
    log::info!("caldera: heat diffusion on virtio-gpu");

    if let Err(err) = run() {
        log::error!("fatal: {err:?}");
    }
    cal_hal::cpu::park()
}

fn run() -> Result<(), GpuError> {
    // SAFETY: the virt machine maps its virtio-mmio window at this range
    // and nothing else drives those devices.
    let transport = unsafe { QEMU_VIRT_MMIO.find(DeviceType::Gpu) }?;
    log::info!(
        "virtio-gpu at {:#010x}, {:?} transport",
        transport.base(),
        transport.version()
    );

    // SAFETY: single-threaded; these statics are borrowed only here and
    // live for the rest of the process.
    let queue_mem = unsafe { &mut *addr_of_mut!(QUEUE_MEMORY) };
    let fb = unsafe { &mut (*addr_of_mut!(FRAMEBUFFER)).0 };
    let sim = unsafe { &mut *addr_of_mut!(SIM) };

    let config = GpuConfig {
        width: FB_WIDTH,
        height: FB_HEIGHT,
        ..GpuConfig::default()
    };
    let backing = Backing {
        addr: fb.as_ptr() as u64,
        len: fb.len() as u32,
    };
    let mut gpu = GpuDevice::<IdentityHal, _>::new(
        transport,
        queue_mem,
        config,
        backing,
        PollPolicy {
            report_every: 20_000_000,
            on_stall: log_stall,
        },
    )?;

    let display = gpu.display_info();
    log::info!(
        "scanout 0: {}x{} (enabled: {})",
        display.width,
        display.height,
        display.enabled
    );
    log::info!("entering render loop");

    sim.reset();
    let mut frame: u32 = 0;
    loop {
        sim.step();
        sim.render_into(fb, FB_WIDTH, FB_HEIGHT);
        gpu.present()?;

        frame = frame.wrapping_add(1);
        if frame % 60 == 0 {
            log::info!("frame {frame}");
        }
    }
}

fn log_stall(report: &StallReport) {
    log::warn!(
        "gpu: completion overdue after {} spins; avail={} used={} isr={:#x} status={:#x}",
        report.spins,
        report.avail_idx,
        report.used_idx,
        report.interrupt_status,
        report.device_status
    );
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cal_hal::println!("kernel panic: {info}");
    cal_hal::cpu::park()
}
