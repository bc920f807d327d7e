//! Region renderer
//!
//! Paints the dirty regions of a [`ScreenModel`] onto any `Rgb565` draw
//! target. Each region is drawn clipped to its own rectangle: the background
//! first, then its text (if any) in the region's layout.
//!
//! Layouts:
//! - `ClockHourMinute`: large digits with the separator as its own glyph
//!   between the hour and minute groups.
//! - `ClockSeconds`: smaller digits aligned to the bottom of the large ones.
//! - `MainMessage` / `SubMessage`: wrapped text boxes. The main message is
//!   centered when it fits and starts at the top when it does not.
//! - `EnvInfo` / `ErrorBar` / `StatusBar`: one line of small text, cut off at
//!   the right edge of the region.
//!
//! Message and bar text use the u8g2 JIS fonts so the Japanese status
//! templates render; the clock digits stay on ProFont.
//! - `ButtonBar`: a marker above each physical button in that button's color.

use embedded_graphics::draw_target::DrawTargetExt;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use embedded_text::TextBox;
use embedded_text::alignment::{HorizontalAlignment, VerticalAlignment};
use embedded_text::style::TextBoxStyleBuilder;
use log::debug;
use profont::{PROFONT_18_POINT, PROFONT_24_POINT};
use u8g2_fonts::U8g2TextStyle;
use u8g2_fonts::fonts;

use crate::buttons::ButtonSlot;
use crate::clock::CLOCK_SEPARATOR;
use crate::region::{Content, Region, RegionSet, RegionState, ScreenModel};

/// Left edge of the hour digits.
const HOUR_LEFT_PX: i32 = 100;

/// Space on each side of the separator glyph.
const SEPARATOR_GAP_PX: i32 = 4;

/// Left inset of the seconds digits within their region.
const SECONDS_INSET_PX: i32 = 6;

/// Inset of one-line and wrapped text from the region edge.
const TEXT_INSET_PX: u32 = 2;

const CLOCK_FONT: &MonoFont = &PROFONT_24_POINT;
const SECONDS_FONT: &MonoFont = &PROFONT_18_POINT;

fn message_style(color: Rgb565) -> U8g2TextStyle<Rgb565> {
    U8g2TextStyle::new(fonts::u8g2_font_unifont_t_japanese3, color)
}

fn line_style(color: Rgb565) -> U8g2TextStyle<Rgb565> {
    U8g2TextStyle::new(fonts::u8g2_font_b12_t_japanese3, color)
}

/// A display the run loop can draw on and then push to the glass.
pub trait Surface: DrawTarget<Color = Rgb565> {
    /// Make everything drawn so far visible.
    fn present(&mut self) -> Result<(), Self::Error>;
}

/// Renders region state. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayManager;

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    /// Draw every dirty region and clear the dirty set.
    ///
    /// Returns the regions that were drawn. Clean regions are not touched.
    pub fn render<D>(&self, screen: &mut ScreenModel, target: &mut D) -> Result<RegionSet, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let dirty = screen.take_dirty();
        for region in dirty.iter() {
            self.draw_region(region, screen.get(region), target)?;
        }
        if !dirty.is_empty() {
            debug!("Rendered {} regions", dirty.len());
        }
        Ok(dirty)
    }

    fn draw_region<D>(&self, region: Region, state: &RegionState, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let bounds = region.bounds();
        let mut target = target.clipped(&bounds);
        bounds
            .into_styled(PrimitiveStyle::with_fill(state.background.into()))
            .draw(&mut target)?;

        if region == Region::ButtonBar && state.content != Content::Blank {
            for slot in ButtonSlot::ALL {
                slot.marker_bounds(bounds)
                    .into_styled(PrimitiveStyle::with_fill(slot.bar_color().into()))
                    .draw(&mut target)?;
            }
            return Ok(());
        }

        if state.content != Content::Text {
            return Ok(());
        }
        let color: Rgb565 = state.foreground.into();
        let text = state.text.as_str();

        match region {
            Region::ClockHourMinute => draw_hour_minute(text, bounds, color, &mut target),
            Region::ClockSeconds => {
                let style = MonoTextStyle::new(SECONDS_FONT, color);
                let top = bottom_aligned_top(bounds, CLOCK_FONT, SECONDS_FONT);
                Text::with_baseline(
                    text,
                    Point::new(bounds.top_left.x + SECONDS_INSET_PX, top),
                    style,
                    Baseline::Top,
                )
                .draw(&mut target)?;
                Ok(())
            }
            Region::MainMessage => draw_wrapped(
                text,
                bounds,
                message_style(color),
                HorizontalAlignment::Center,
                VerticalAlignment::Middle,
                &mut target,
            ),
            Region::SubMessage => draw_wrapped(
                text,
                bounds,
                message_style(color),
                HorizontalAlignment::Left,
                VerticalAlignment::Top,
                &mut target,
            ),
            Region::EnvInfo | Region::ErrorBar | Region::StatusBar | Region::ButtonBar => {
                draw_line(text, bounds, line_style(color), &mut target)
            }
        }
    }
}

/// Top of the large clock digits within the clock row.
fn clock_top(bounds: Rectangle) -> i32 {
    let slack = bounds.size.height.saturating_sub(CLOCK_FONT.character_size.height);
    bounds.top_left.y + (slack / 2) as i32
}

/// Top of `small` so that its bottom lines up with `large` in the clock row.
fn bottom_aligned_top(bounds: Rectangle, large: &MonoFont, small: &MonoFont) -> i32 {
    let offset = large.character_size.height.saturating_sub(small.character_size.height);
    clock_top(bounds) + offset as i32
}

fn glyph_advance(font: &MonoFont) -> i32 {
    (font.character_size.width + font.character_spacing) as i32
}

fn draw_hour_minute<D>(text: &str, bounds: Rectangle, color: Rgb565, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(CLOCK_FONT, color);
    let top = clock_top(bounds);
    let advance = glyph_advance(CLOCK_FONT);
    let mut x = bounds.top_left.x + HOUR_LEFT_PX;

    let Some((hour, minute)) = text.split_once(CLOCK_SEPARATOR) else {
        Text::with_baseline(text, Point::new(x, top), style, Baseline::Top).draw(target)?;
        return Ok(());
    };

    Text::with_baseline(hour, Point::new(x, top), style, Baseline::Top).draw(target)?;
    x += advance * hour.chars().count() as i32 + SEPARATOR_GAP_PX;

    let mut separator = [0u8; 4];
    let separator = CLOCK_SEPARATOR.encode_utf8(&mut separator);
    Text::with_baseline(separator, Point::new(x, top), style, Baseline::Top).draw(target)?;
    x += advance + SEPARATOR_GAP_PX;

    Text::with_baseline(minute, Point::new(x, top), style, Baseline::Top).draw(target)?;
    Ok(())
}

/// One line of text, vertically centered. Whatever does not fit is cut off
/// by the region clip rather than wrapped.
fn draw_line<D>(
    text: &str,
    bounds: Rectangle,
    style: U8g2TextStyle<Rgb565>,
    target: &mut D,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let origin = Point::new(
        bounds.top_left.x + TEXT_INSET_PX as i32,
        bounds.center().y,
    );
    Text::with_baseline(text, origin, style, Baseline::Middle).draw(target)?;
    Ok(())
}

/// Word-wrapped text inside the region. Text taller than the region falls
/// back to top alignment so its first lines stay visible.
fn draw_wrapped<D>(
    text: &str,
    bounds: Rectangle,
    style: U8g2TextStyle<Rgb565>,
    alignment: HorizontalAlignment,
    vertical_alignment: VerticalAlignment,
    target: &mut D,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let inner = bounds.offset(-(TEXT_INSET_PX as i32));
    let measured = TextBoxStyleBuilder::new()
        .alignment(alignment)
        .build()
        .measure_text_height(&style, text, inner.size.width);
    let vertical_alignment = if measured > inner.size.height {
        VerticalAlignment::Top
    } else {
        vertical_alignment
    };
    let textbox_style = TextBoxStyleBuilder::new()
        .alignment(alignment)
        .vertical_alignment(vertical_alignment)
        .build();
    TextBox::with_textbox_style(text, inner, style, textbox_style).draw(target)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::color::ColorValue;
    use crate::framebuffer::FrameBuffer;
    use crate::region::{ClockRegion, InputRegion, MessageRegion};
    use core::convert::Infallible;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct PresentFailed;

    /// Framebuffer that counts how often it was presented.
    #[derive(Default)]
    pub(crate) struct TestSurface {
        pub frame: FrameBuffer,
        pub presents: usize,
        /// Upcoming presents that fail.
        pub failing_presents: usize,
    }

    impl OriginDimensions for TestSurface {
        fn size(&self) -> Size {
            self.frame.size()
        }
    }

    impl DrawTarget for TestSurface {
        type Color = Rgb565;
        type Error = PresentFailed;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.frame.draw_iter(pixels).map_err(|e: Infallible| match e {})
        }
    }

    impl Surface for TestSurface {
        fn present(&mut self) -> Result<(), Self::Error> {
            self.presents += 1;
            if self.failing_presents > 0 {
                self.failing_presents -= 1;
                return Err(PresentFailed);
            }
            Ok(())
        }
    }

    fn colors_in(frame: &FrameBuffer, area: Rectangle) -> impl Iterator<Item = Rgb565> + '_ {
        area.points().filter_map(|p| frame.pixel(p.x, p.y))
    }

    fn count(frame: &FrameBuffer, area: Rectangle, color: Rgb565) -> usize {
        colors_in(frame, area).filter(|c| *c == color).count()
    }

    #[test]
    fn test_first_render_draws_everything() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let drawn = DisplayManager::new().render(&mut screen, &mut frame).unwrap();
        assert_eq!(drawn, RegionSet::all());
        assert!(screen.dirty().is_empty());
    }

    #[test]
    fn test_fill_paints_region_background() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let renderer = DisplayManager::new();
        renderer.render(&mut screen, &mut frame).unwrap();

        screen
            .partition::<InputRegion>()
            .apply_fill(InputRegion::StatusBar, ColorValue::YELLOW);
        let drawn = renderer.render(&mut screen, &mut frame).unwrap();
        assert_eq!(drawn.len(), 1);

        let bar = Region::StatusBar.bounds();
        let area = (bar.size.width * bar.size.height) as usize;
        assert_eq!(count(&frame, bar, ColorValue::YELLOW.into()), area);
        // Neighbours keep their black background.
        assert_eq!(frame.pixel(0, 219), Some(Rgb565::BLACK));
        assert_eq!(frame.pixel(0, 235), Some(Rgb565::BLACK));
    }

    #[test]
    fn test_clean_regions_are_not_repainted() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let renderer = DisplayManager::new();
        renderer.render(&mut screen, &mut frame).unwrap();

        Pixel(Point::new(5, 60), Rgb565::RED).draw(&mut frame).unwrap();
        screen
            .partition::<InputRegion>()
            .apply_fill(InputRegion::StatusBar, ColorValue::GREEN);
        renderer.render(&mut screen, &mut frame).unwrap();

        assert_eq!(frame.pixel(5, 60), Some(Rgb565::RED));
    }

    #[test]
    fn test_text_uses_region_colors() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        screen.partition::<MessageRegion>().apply_text(
            MessageRegion::Main,
            "HELLO",
            ColorValue::WHITE,
            ColorValue::BLUE,
        );
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        let main = Region::MainMessage.bounds();
        assert_eq!(frame.pixel(0, 50), Some(ColorValue::BLUE.into()));
        assert!(count(&frame, main, Rgb565::WHITE) > 0);
        assert!(colors_in(&frame, main).all(|c| c == Rgb565::WHITE || c == ColorValue::BLUE.into()));
    }

    #[test]
    fn test_text_stays_inside_region() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let long = "status text that is much too long to fit on one line of the error bar";
        screen.partition::<MessageRegion>().apply_text(
            MessageRegion::Error,
            long,
            ColorValue::RED,
            ColorValue::BLACK,
        );
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        for region in Region::ALL.into_iter().filter(|r| *r != Region::ErrorBar) {
            assert_eq!(count(&frame, region.bounds(), Rgb565::RED), 0, "{region:?}");
        }
        assert!(count(&frame, Region::ErrorBar.bounds(), Rgb565::RED) > 0);
    }

    #[test]
    fn test_wrapping_diagnostic_stays_visible() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let handler = crate::message::StatusMessageHandler::default();
        assert!(
            handler
                .apply(br#"{"textMain":"hello", "textSub":"#, &mut screen)
                .is_err()
        );
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        let bar = Region::ErrorBar.bounds();
        assert!(count(&frame, bar, Rgb565::RED) > 0);
        // The first glyphs of the prefix sit at the left edge.
        let head = Rectangle::new(bar.top_left, Size::new(40, bar.size.height));
        assert!(count(&frame, head, Rgb565::RED) > 0);
    }

    #[test]
    fn test_overflowing_main_message_starts_at_top() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        let long = "one two three four five six seven eight nine ten eleven twelve \
                    thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty \
                    twenty-one twenty-two twenty-three twenty-four twenty-five";
        screen.partition::<MessageRegion>().apply_text(
            MessageRegion::Main,
            long,
            ColorValue::WHITE,
            ColorValue::BLUE,
        );
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        let main = Region::MainMessage.bounds();
        let first_line = Rectangle::new(main.top_left, Size::new(main.size.width, 20));
        assert!(count(&frame, first_line, Rgb565::WHITE) > 0);
        assert_eq!(count(&frame, Region::SubMessage.bounds(), Rgb565::WHITE), 0);
    }

    #[test]
    fn test_japanese_templates_render_distinct_glyphs() {
        let render_main = |text: &str| {
            let mut screen = ScreenModel::new();
            let mut frame = FrameBuffer::new();
            screen.partition::<MessageRegion>().apply_text(
                MessageRegion::Main,
                text,
                ColorValue::WHITE,
                ColorValue::BLACK,
            );
            DisplayManager::new().render(&mut screen, &mut frame).unwrap();
            let main = Region::MainMessage.bounds();
            assert!(count(&frame, main, Rgb565::WHITE) > 0, "{text}");
            colors_in(&frame, main).collect::<Vec<_>>()
        };

        let meeting = render_main("会議中です");
        let working = render_main("仕事中です");
        let done = render_main("今日は仕事終わり");
        assert_ne!(meeting, working);
        assert_ne!(working, done);
    }

    #[test]
    fn test_clock_groups_and_separator() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        screen.partition::<ClockRegion>().apply_text(
            ClockRegion::HourMinute,
            "12:34",
            ColorValue::WHITE,
            ColorValue::BLACK,
        );
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        let row = Region::ClockHourMinute.bounds();
        let advance = glyph_advance(CLOCK_FONT);
        let column = |x: i32, glyphs: i32| {
            Rectangle::new(
                Point::new(x, row.top_left.y),
                Size::new((advance * glyphs) as u32, row.size.height),
            )
        };
        let hour_x = HOUR_LEFT_PX;
        let separator_x = hour_x + 2 * advance + SEPARATOR_GAP_PX;
        let minute_x = separator_x + advance + SEPARATOR_GAP_PX;

        assert!(count(&frame, column(hour_x, 2), Rgb565::WHITE) > 0);
        assert!(count(&frame, column(separator_x, 1), Rgb565::WHITE) > 0);
        assert!(count(&frame, column(minute_x, 2), Rgb565::WHITE) > 0);
        assert_eq!(count(&frame, column(0, 1), Rgb565::WHITE), 0);
    }

    #[test]
    fn test_button_bar_markers() {
        let mut screen = ScreenModel::new();
        let mut frame = FrameBuffer::new();
        crate::buttons::ButtonEventPublisher.draw_button_bar(&mut screen);
        DisplayManager::new().render(&mut screen, &mut frame).unwrap();

        let bar = Region::ButtonBar.bounds();
        for slot in ButtonSlot::ALL {
            let marker = slot.marker_bounds(bar);
            assert_eq!(
                frame.pixel(marker.top_left.x, marker.top_left.y),
                Some(slot.bar_color().into())
            );
        }
        assert_eq!(frame.pixel(0, 236), Some(Rgb565::BLACK));
    }

    #[test]
    fn test_surface_counts_presents() {
        let mut surface = TestSurface {
            failing_presents: 1,
            ..Default::default()
        };
        assert_eq!(surface.present(), Err(PresentFailed));
        surface.present().unwrap();
        assert_eq!(surface.presents, 2);
    }
}
