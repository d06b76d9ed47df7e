//! Address-translation seam between the driver and the platform.
//!
//! The driver never allocates: ring memory and the backing buffer are
//! statically-sized, alignment-satisfying buffers handed in by the caller.
//! All it needs from the platform is the virtual-to-physical mapping for
//! the addresses it registers with the device.

/// Size of a guest page as far as the transport is concerned.
pub const PAGE_SIZE: usize = 4096;

/// Platform address translation for DMA-visible memory.
///
/// # Safety
///
/// Implementations must return the physical address the device will see
/// for any virtual address inside a buffer passed to the driver. On the
/// identity-mapped bare-metal configuration this is the address itself;
/// host-side tests use the same identity mapping.
pub unsafe trait VirtioHal {
    /// Translate a virtual address to the bus address of the same byte.
    fn virt_to_phys(vaddr: usize) -> u64;
}
