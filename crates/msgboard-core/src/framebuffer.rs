//! RAM framebuffer with change tracking
//!
//! The renderer draws regions into this buffer. Only pixels whose color
//! actually changed grow the pending bounding box, and [`FrameBuffer::flush`]
//! sends that box to the panel in one contiguous transfer.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::debug;

use crate::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};

const WIDTH: usize = DISPLAY_WIDTH_PX as usize;
const HEIGHT: usize = DISPLAY_HEIGHT_PX as usize;

/// Inclusive pixel bounds of everything changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Changed {
    left: usize,
    top: usize,
    right: usize,
    bottom: usize,
}

impl Changed {
    fn at(x: usize, y: usize) -> Self {
        Self {
            left: x,
            top: y,
            right: x,
            bottom: y,
        }
    }

    fn include(&mut self, x: usize, y: usize) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    fn width(&self) -> usize {
        self.right - self.left + 1
    }

    fn height(&self) -> usize {
        self.bottom - self.top + 1
    }

    fn rectangle(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.left as i32, self.top as i32),
            Size::new(self.width() as u32, self.height() as u32),
        )
    }
}

/// Full-screen `Rgb565` buffer (320x240x2 = 153,600 bytes on the heap).
pub struct FrameBuffer {
    pixels: Vec<Rgb565>,
    changed: Option<Changed>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Black buffer with nothing pending.
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgb565::BLACK; WIDTH * HEIGHT],
            changed: None,
        }
    }

    /// Color at a coordinate, `None` when off screen.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb565> {
        let (x, y) = Self::clip(x, y)?;
        Some(self.pixels[y * WIDTH + x])
    }

    /// Area the next flush would send.
    pub fn pending(&self) -> Option<Rectangle> {
        self.changed.map(|c| c.rectangle())
    }

    fn clip(x: i32, y: i32) -> Option<(usize, usize)> {
        let (x, y) = (usize::try_from(x).ok()?, usize::try_from(y).ok()?);
        (x < WIDTH && y < HEIGHT).then_some((x, y))
    }

    #[inline]
    fn put(&mut self, x: usize, y: usize, color: Rgb565) {
        let slot = &mut self.pixels[y * WIDTH + x];
        if *slot == color {
            return;
        }
        *slot = color;
        match &mut self.changed {
            Some(changed) => changed.include(x, y),
            None => self.changed = Some(Changed::at(x, y)),
        }
    }

    /// Send the pending area to `display` and clear it. No-op when nothing changed.
    pub fn flush<D>(&mut self, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let Some(changed) = self.changed.take() else {
            return Ok(());
        };
        let area = changed.rectangle();
        debug!(
            "Flushing {}x{} at ({}, {})",
            changed.width(),
            changed.height(),
            changed.left,
            changed.top
        );

        let pixels = &self.pixels;
        let rows = (changed.top..=changed.bottom).flat_map(move |y| {
            let start = y * WIDTH + changed.left;
            pixels[start..start + changed.width()].iter().copied()
        });
        display.fill_contiguous(&area, rows)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some((x, y)) = Self::clip(point.x, point.y) {
                self.put(x, y, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        for y in area.top_left.y..=bottom_right.y {
            for x in area.top_left.x..=bottom_right.x {
                self.put(x as usize, y as usize, color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mock_display::MockDisplay;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn test_starts_black_and_clean() {
        let fb = FrameBuffer::new();
        assert_eq!(fb.pixel(0, 0), Some(Rgb565::BLACK));
        assert_eq!(fb.pixel(319, 239), Some(Rgb565::BLACK));
        assert_eq!(fb.pixel(320, 0), None);
        assert_eq!(fb.pixel(-1, 0), None);
        assert_eq!(fb.pending(), None);
    }

    #[test]
    fn test_same_color_is_not_a_change() {
        let mut fb = FrameBuffer::new();
        fb.fill_solid(&Rectangle::new(Point::new(10, 10), Size::new(5, 5)), Rgb565::BLACK)
            .unwrap();
        assert_eq!(fb.pending(), None);
    }

    #[test]
    fn test_pending_area_grows() {
        let mut fb = FrameBuffer::new();
        Pixel(Point::new(5, 7), Rgb565::RED).draw(&mut fb).unwrap();
        Pixel(Point::new(20, 3), Rgb565::RED).draw(&mut fb).unwrap();
        assert_eq!(
            fb.pending(),
            Some(Rectangle::new(Point::new(5, 3), Size::new(16, 5)))
        );
    }

    #[test]
    fn test_fill_is_clipped_to_screen() {
        let mut fb = FrameBuffer::new();
        Rectangle::new(Point::new(310, 230), Size::new(40, 40))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::GREEN))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(319, 239), Some(Rgb565::GREEN));
        assert_eq!(fb.pixel(309, 239), Some(Rgb565::BLACK));
        assert_eq!(
            fb.pending(),
            Some(Rectangle::new(Point::new(310, 230), Size::new(10, 10)))
        );
    }

    #[test]
    fn test_flush_sends_only_changes() {
        let mut fb = FrameBuffer::new();
        fb.fill_solid(&Rectangle::new(Point::new(1, 1), Size::new(2, 2)), Rgb565::BLUE)
            .unwrap();

        let mut display = MockDisplay::<Rgb565>::new();
        fb.flush(&mut display).unwrap();
        assert_eq!(display.get_pixel(Point::new(1, 1)), Some(Rgb565::BLUE));
        assert_eq!(display.get_pixel(Point::new(2, 2)), Some(Rgb565::BLUE));
        assert_eq!(display.get_pixel(Point::new(0, 0)), None);
        assert_eq!(fb.pending(), None);

        // Nothing pending: nothing drawn.
        let mut display = MockDisplay::<Rgb565>::new();
        fb.flush(&mut display).unwrap();
        assert_eq!(display.get_pixel(Point::new(1, 1)), None);
    }
}
