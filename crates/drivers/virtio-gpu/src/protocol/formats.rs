//! Pixel formats per VirtIO 1.1 section 5.7.6.8.

/// 32-bit pixel formats the device understands.
///
/// Naming gives the component order from low to high memory address;
/// UNORM maps 0-255 to 0.0-1.0.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Blue, Green, Red, Alpha (QEMU's native scanout format).
    B8G8R8A8Unorm = 1,
    /// Blue, Green, Red, padding.
    B8G8R8X8Unorm = 2,
    /// Alpha, Red, Green, Blue.
    A8R8G8B8Unorm = 3,
    /// Padding, Red, Green, Blue.
    X8R8G8B8Unorm = 4,
    /// Red, Green, Blue, Alpha.
    R8G8B8A8Unorm = 67,
    /// Padding, Blue, Green, Red.
    X8B8G8R8Unorm = 68,
}

impl Format {
    /// Bytes per pixel; every supported format is 32-bit.
    pub const fn bytes_per_pixel(self) -> u32 {
        4
    }

    /// Backing-buffer size in bytes for a given resolution.
    pub const fn buffer_size(self, width: u32, height: u32) -> usize {
        (width * height * self.bytes_per_pixel()) as usize
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::B8G8R8A8Unorm
    }
}
