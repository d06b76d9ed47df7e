//! Split virtqueue over caller-provided ring memory.
//!
//! The layout is the page-aligned two-region arrangement: descriptor table
//! and availability ring share one region, the completion (used) ring
//! starts on the next page boundary. That is the placement the legacy
//! transport derives from a single page frame number. The modern transport
//! receives the three addresses individually and imposes no adjacency
//! requirement, so one layout serves both generations.

use core::marker::PhantomData;
use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use core::sync::atomic::{Ordering, fence};

use bitflags::bitflags;
use cal_hal::cpu;

use crate::hal::VirtioHal;
use crate::transport::QueueRegions;

/// Terminal sentinel of the descriptor free list.
pub const FREE_LIST_END: u16 = 0xffff;

/// Errors raised by ring operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtQueueError {
    /// The free list is empty: more chains in flight than the ring holds.
    DescriptorExhaustion,
}

bitflags! {
    /// Descriptor flags per VirtIO 1.1 spec section 2.6.5.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u16 {
        /// Buffer continues via the `next` field.
        const NEXT = 1;
        /// Buffer is device write-only (otherwise read-only).
        const WRITE = 2;
        /// Buffer contains a list of buffer descriptors.
        const INDIRECT = 4;
    }
}

/// A single descriptor in the descriptor table.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Bus address of the buffer.
    pub addr: u64,
    /// Length of the buffer in bytes.
    pub len: u32,
    /// Descriptor flags.
    pub flags: u16,
    /// Next descriptor index; meaningful only while NEXT is set or the
    /// descriptor sits on the free list.
    pub next: u16,
}

impl Descriptor {
    const EMPTY: Self = Self {
        addr: 0,
        len: 0,
        flags: 0,
        next: 0,
    };
}

/// Completion ring entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UsedElem {
    /// Head index of the completed descriptor chain.
    pub id: u32,
    /// Total bytes the device wrote into the chain.
    pub len: u32,
}

/// Driver-written region: descriptor table with the availability ring
/// immediately behind it.
#[repr(C, align(4096))]
pub struct DriverArea<const N: usize> {
    desc: [Descriptor; N],
    avail_flags: u16,
    avail_idx: u16,
    avail_ring: [u16; N],
    // Event suppression slot: part of the ring layout even though
    // EVENT_IDX is never negotiated.
    #[allow(dead_code)]
    used_event: u16,
}

/// Device-written region: the completion ring. The page alignment places
/// it on the first page boundary after the driver area.
#[repr(C, align(4096))]
pub struct DeviceArea<const N: usize> {
    used_flags: u16,
    used_idx: u16,
    used_ring: [UsedElem; N],
    #[allow(dead_code)]
    avail_event: u16,
}

/// Ring memory for one queue of depth `N`.
///
/// Statically sized and alignment-satisfying; the caller owns the
/// allocation for the life of the process and hands it to [`VirtQueue`].
#[repr(C)]
pub struct QueueMemory<const N: usize> {
    driver: DriverArea<N>,
    device: DeviceArea<N>,
}

impl<const N: usize> QueueMemory<N> {
    pub const fn new() -> Self {
        Self {
            driver: DriverArea {
                desc: [Descriptor::EMPTY; N],
                avail_flags: 0,
                avail_idx: 0,
                avail_ring: [0; N],
                used_event: 0,
            },
            device: DeviceArea {
                used_flags: 0,
                used_idx: 0,
                used_ring: [UsedElem { id: 0, len: 0 }; N],
                avail_event: 0,
            },
        }
    }
}

impl<const N: usize> Default for QueueMemory<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A split virtqueue of fixed depth `N`.
///
/// Exclusively owned by the call path that created it; the device touches
/// the ring memory only between the doorbell and the completion it
/// publishes, and the access discipline (barriers before notify, never
/// reading a completion before its index advances) is the only
/// synchronization.
pub struct VirtQueue<const N: usize, H: VirtioHal> {
    mem: &'static mut QueueMemory<N>,
    free_head: u16,
    num_free: u16,
    last_used: u16,
    _hal: PhantomData<H>,
}

impl<const N: usize, H: VirtioHal> VirtQueue<N, H> {
    /// Take ownership of `mem` and initialize the free list and indices.
    pub fn new(mem: &'static mut QueueMemory<N>) -> Self {
        for i in 0..N {
            mem.driver.desc[i] = Descriptor {
                next: if i + 1 < N { (i + 1) as u16 } else { FREE_LIST_END },
                ..Descriptor::EMPTY
            };
        }
        mem.driver.avail_flags = 0;
        mem.driver.avail_idx = 0;
        mem.driver.used_event = 0;
        mem.device.used_flags = 0;
        mem.device.used_idx = 0;
        mem.device.avail_event = 0;
        // The device must not observe stale ring contents once the queue
        // is registered.
        cpu::device_barrier();

        Self {
            mem,
            free_head: 0,
            num_free: N as u16,
            last_used: 0,
            _hal: PhantomData,
        }
    }

    /// Ring depth.
    pub const fn depth() -> u16 {
        N as u16
    }

    /// Descriptors currently on the free list.
    pub fn num_free(&self) -> u16 {
        self.num_free
    }

    /// Bus addresses of the three regions for transport registration.
    pub fn regions(&self) -> QueueRegions {
        QueueRegions {
            desc: H::virt_to_phys(addr_of!(self.mem.driver.desc) as usize),
            driver: H::virt_to_phys(addr_of!(self.mem.driver.avail_flags) as usize),
            device: H::virt_to_phys(addr_of!(self.mem.device.used_flags) as usize),
        }
    }

    /// Current (availability, completion) indices, for stall diagnostics.
    pub fn indices(&self) -> (u16, u16) {
        // SAFETY: reads of ring memory this queue owns.
        unsafe {
            (
                read_volatile(addr_of!(self.mem.driver.avail_idx)),
                read_volatile(addr_of!(self.mem.device.used_idx)),
            )
        }
    }

    fn alloc(&mut self) -> Result<u16, VirtQueueError> {
        let head = self.free_head;
        if head == FREE_LIST_END {
            return Err(VirtQueueError::DescriptorExhaustion);
        }
        self.free_head = self.mem.driver.desc[head as usize].next;
        self.num_free -= 1;
        Ok(head)
    }

    fn push_free(&mut self, idx: u16) {
        let desc = &mut self.mem.driver.desc[idx as usize];
        desc.flags = 0;
        desc.next = self.free_head;
        self.free_head = idx;
        self.num_free += 1;
    }

    /// Return every descriptor of the chain starting at `head` to the
    /// free list.
    fn free_chain(&mut self, head: u16) {
        let mut cur = head;
        loop {
            let desc = self.mem.driver.desc[cur as usize];
            let next = (desc.flags & DescriptorFlags::NEXT.bits() != 0).then_some(desc.next);
            self.push_free(cur);
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
    }

    /// Publish one request/response exchange: a device-readable buffer
    /// chained to a device-writable one.
    ///
    /// Descriptors and the ring slot are fully written and fenced before
    /// the availability index is published and fenced again, so the device
    /// never observes a partially-written request. The caller rings the
    /// doorbell immediately afterwards.
    ///
    /// Returns the chain's head index.
    pub fn submit(&mut self, out: &[u8], input: &mut [u8]) -> Result<u16, VirtQueueError> {
        let head = self.alloc()?;
        let tail = match self.alloc() {
            Ok(tail) => tail,
            Err(e) => {
                self.push_free(head);
                return Err(e);
            }
        };

        // SAFETY: head/tail come from the free list, so the writes stay
        // inside the descriptor table; the device reads this memory via
        // DMA, hence the volatile stores.
        unsafe {
            write_volatile(
                addr_of_mut!(self.mem.driver.desc[head as usize]),
                Descriptor {
                    addr: H::virt_to_phys(out.as_ptr() as usize),
                    len: out.len() as u32,
                    flags: DescriptorFlags::NEXT.bits(),
                    next: tail,
                },
            );
            write_volatile(
                addr_of_mut!(self.mem.driver.desc[tail as usize]),
                Descriptor {
                    addr: H::virt_to_phys(input.as_ptr() as usize),
                    len: input.len() as u32,
                    flags: DescriptorFlags::WRITE.bits(),
                    next: 0,
                },
            );

            let idx = read_volatile(addr_of!(self.mem.driver.avail_idx));
            let slot = (idx as usize) % N;
            write_volatile(addr_of_mut!(self.mem.driver.avail_ring[slot]), head);
            cpu::device_barrier();
            write_volatile(addr_of_mut!(self.mem.driver.avail_idx), idx.wrapping_add(1));
            cpu::device_barrier();
        }

        Ok(head)
    }

    /// Whether the device has published a completion we have not consumed.
    pub fn has_used(&self) -> bool {
        fence(Ordering::SeqCst);
        // SAFETY: the device writes this index via DMA; volatile read from
        // memory this queue owns.
        let used_idx = unsafe { read_volatile(addr_of!(self.mem.device.used_idx)) };
        used_idx != self.last_used
    }

    /// Consume one completion: advance the observed index and return the
    /// whole chain to the free list.
    ///
    /// Returns the chain head and the byte count the device wrote.
    pub fn pop_used(&mut self) -> Option<(u16, u32)> {
        if !self.has_used() {
            return None;
        }
        fence(Ordering::SeqCst);

        let slot = (self.last_used as usize) % N;
        // SAFETY: device-written entry inside memory this queue owns.
        let elem = unsafe { read_volatile(addr_of!(self.mem.device.used_ring[slot])) };
        self.last_used = self.last_used.wrapping_add(1);

        let head = elem.id as u16;
        self.free_chain(head);
        Some((head, elem.len))
    }
}
