//! `embedded-graphics` surface over the renderer-owned backing buffer.

use embedded_graphics::Pixel;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, RgbColor, Size};

/// A borrowed BGRA8888 frame.
///
/// Wraps the backing buffer between renders; drawing through this type and
/// then calling [`crate::GpuDevice::present`] pushes the result to the
/// screen.
pub struct Frame<'a> {
    buf: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Frame<'a> {
    /// Borrow `buf` as a `width` x `height` frame.
    ///
    /// Returns `None` if the buffer cannot hold that many 4-byte pixels.
    pub fn new(buf: &'a mut [u8], width: u32, height: u32) -> Option<Self> {
        if buf.len() < (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self { buf, width, height })
    }

    /// Raw pixel bytes, BGRA order.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buf
    }
}

impl DrawTarget for Frame<'_> {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.x < self.width as i32
                && point.y >= 0
                && point.y < self.height as i32
            {
                let idx = (point.y as usize * self.width as usize + point.x as usize) * 4;
                self.buf[idx] = color.b();
                self.buf[idx + 1] = color.g();
                self.buf[idx + 2] = color.r();
                self.buf[idx + 3] = 255;
            }
        }
        Ok(())
    }
}

impl OriginDimensions for Frame<'_> {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
