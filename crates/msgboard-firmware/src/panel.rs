//! LCD panel behind an off-screen frame buffer
//!
//! All drawing lands in RAM; [`Surface::present`] pushes only the changed
//! rectangle over SPI.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use msgboard_core::display_manager::Surface;
use msgboard_core::framebuffer::FrameBuffer;

pub struct Panel<D> {
    frame: FrameBuffer,
    display: D,
}

impl<D> Panel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(display: D) -> Self {
        Self {
            frame: FrameBuffer::new(),
            display,
        }
    }
}

impl<D> OriginDimensions for Panel<D> {
    fn size(&self) -> Size {
        self.frame.size()
    }
}

impl<D> DrawTarget for Panel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    type Color = Rgb565;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.frame.draw_iter(pixels).map_err(|e| match e {})
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.frame.fill_solid(area, color).map_err(|e| match e {})
    }
}

impl<D> Surface for Panel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    fn present(&mut self) -> Result<(), Self::Error> {
        self.frame.flush(&mut self.display)
    }
}
