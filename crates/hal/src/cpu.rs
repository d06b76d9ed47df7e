//! CPU-level primitives: memory barriers, spin hints and the park loop.

use core::sync::atomic::{Ordering, fence};

/// Full barrier between CPU stores and a subsequent device-visible access.
///
/// The compiler fence orders our own memory accesses; on aarch64 the `dsb`
/// additionally guarantees completion of all writes before the device can
/// observe them through DMA.
#[inline]
pub fn device_barrier() {
    fence(Ordering::SeqCst);
    #[cfg(target_arch = "aarch64")]
    // SAFETY: `dsb sy` has no operands and no side effects beyond ordering.
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// Polite busy-wait hint.
#[inline]
pub fn spin_hint() {
    core::hint::spin_loop();
}

/// Halt forever in a low-power wait loop.
///
/// Terminal state for fatal errors and panics: there is no recovery path,
/// so the CPU parks on `wfe` rather than burning cycles.
pub fn park() -> ! {
    loop {
        #[cfg(target_arch = "aarch64")]
        aarch64_cpu::asm::wfe();
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}
