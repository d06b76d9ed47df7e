//! Platform address translation for the driver stack.

use cal_virtio::VirtioHal;

/// Identity translation: the demo runs with the MMU off, so every buffer's
/// virtual address is the bus address the device sees.
pub struct IdentityHal;

// SAFETY: RAM and the MMIO window are identity-mapped on this
// configuration; the returned address is exactly what the device must DMA
// to or from.
unsafe impl VirtioHal for IdentityHal {
    fn virt_to_phys(vaddr: usize) -> u64 {
        vaddr as u64
    }
}
