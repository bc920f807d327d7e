//! Button slots and the fixed status each one publishes
//!
//! Releasing a button sets the local status bar color and publishes one of
//! three fixed status messages. The message regions are never updated
//! locally; they change only when the broker echoes the publish back.

use embedded_graphics::geometry::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::color::ColorValue;
use crate::message::StatusMessage;
use crate::region::{InputRegion, ScreenModel};

/// Left edge of each slot's marker on the button bar.
const MARKER_X_PX: [i32; 3] = [35, 130, 225];

/// Width of each slot's marker on the button bar.
const MARKER_WIDTH_PX: u32 = 60;

/// Touches at or below this row count as button presses.
pub const TOUCH_ZONE_TOP_PX: u16 = 200;

/// The three physical buttons, left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonSlot {
    A,
    B,
    C,
}

impl ButtonSlot {
    pub const ALL: [ButtonSlot; 3] = [ButtonSlot::A, ButtonSlot::B, ButtonSlot::C];

    const fn index(self) -> usize {
        self as usize
    }

    /// Template published when this button is released.
    pub fn template(self) -> &'static StatusTemplate {
        &TEMPLATES[self.index()]
    }

    /// Color of the status bar after this button is released.
    pub fn bar_color(self) -> ColorValue {
        self.template().bar_color
    }

    /// Slot for a touch on a panel without physical buttons. The bottom
    /// strip of the screen is split into three equal columns.
    pub fn at_touch(x: u16, y: u16) -> Option<ButtonSlot> {
        if y < TOUCH_ZONE_TOP_PX || y >= crate::DISPLAY_HEIGHT_PX {
            return None;
        }
        match x as u32 * 3 / crate::DISPLAY_WIDTH_PX as u32 {
            0 => Some(ButtonSlot::A),
            1 => Some(ButtonSlot::B),
            2 => Some(ButtonSlot::C),
            _ => None,
        }
    }

    /// Marker rectangle drawn above the physical button.
    pub fn marker_bounds(self, bar: Rectangle) -> Rectangle {
        Rectangle::new(
            Point::new(MARKER_X_PX[self.index()], bar.top_left.y),
            Size::new(MARKER_WIDTH_PX, bar.size.height),
        )
    }
}

/// Compile-time status bound to a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTemplate {
    pub bar_color: ColorValue,
    pub foreground: &'static str,
    pub background: &'static str,
    pub main_text: &'static str,
    pub sub_text: &'static str,
}

impl StatusTemplate {
    pub fn to_message(&self) -> StatusMessage {
        StatusMessage {
            foreground_name: self.foreground.into(),
            background_name: self.background.into(),
            main_text: self.main_text.into(),
            sub_text: self.sub_text.into(),
            english_text: None,
        }
    }
}

static TEMPLATES: [StatusTemplate; 3] = [
    StatusTemplate {
        bar_color: ColorValue::RED,
        foreground: "WHITE",
        background: "RED",
        main_text: "会議中です",
        sub_text: "食事は会議が終わってから",
    },
    StatusTemplate {
        bar_color: ColorValue::YELLOW,
        foreground: "BLACK",
        background: "YELLOW",
        main_text: "仕事中",
        sub_text: "呼ばれたらきりのいいとこで降りていきます",
    },
    StatusTemplate {
        bar_color: ColorValue::GREEN,
        foreground: "BLACK",
        background: "GREEN",
        main_text: "今日は仕事終わり",
        sub_text: "呼ばれれば降りていきます",
    },
];

/// Maps button releases to a bar color and an outbound message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonEventPublisher;

impl ButtonEventPublisher {
    /// Pure mapping from a released slot to its bar color and payload.
    pub fn on_edge(&self, slot: ButtonSlot) -> (ColorValue, StatusMessage) {
        let template = slot.template();
        (template.bar_color, template.to_message())
    }

    /// Show the bar color locally. Message regions are left alone.
    pub fn apply_bar(&self, bar_color: ColorValue, screen: &mut ScreenModel) {
        screen
            .partition::<InputRegion>()
            .apply_fill(InputRegion::StatusBar, bar_color);
    }

    /// Mark the button bar for its first paint. The renderer draws the
    /// per-slot markers on top of the black fill.
    pub fn draw_button_bar(&self, screen: &mut ScreenModel) {
        screen
            .partition::<InputRegion>()
            .apply_fill(InputRegion::ButtonBar, ColorValue::BLACK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Content, Region};

    #[test]
    fn test_slot_colors() {
        let publisher = ButtonEventPublisher;
        assert_eq!(publisher.on_edge(ButtonSlot::A).0, ColorValue::RED);
        assert_eq!(publisher.on_edge(ButtonSlot::B).0, ColorValue::YELLOW);
        assert_eq!(publisher.on_edge(ButtonSlot::C).0, ColorValue::GREEN);
    }

    #[test]
    fn test_slot_a_template() {
        let (_, message) = ButtonEventPublisher.on_edge(ButtonSlot::A);
        assert_eq!(message.foreground_name, "WHITE");
        assert_eq!(message.background_name, "RED");
        assert_eq!(message.main_text, "会議中です");
        assert_eq!(message.sub_text, "食事は会議が終わってから");
    }

    #[test]
    fn test_mapping_ignores_prior_state() {
        let publisher = ButtonEventPublisher;
        let first = publisher.on_edge(ButtonSlot::A);
        publisher.on_edge(ButtonSlot::C);
        publisher.on_edge(ButtonSlot::B);
        assert_eq!(publisher.on_edge(ButtonSlot::A), first);
    }

    #[test]
    fn test_template_colors_resolve_to_bar_color() {
        for slot in ButtonSlot::ALL {
            let template = slot.template();
            assert_eq!(crate::color::resolve(template.background), template.bar_color);
        }
    }

    #[test]
    fn test_payload_parses_back() {
        for slot in ButtonSlot::ALL {
            let (_, message) = ButtonEventPublisher.on_edge(slot);
            let parsed = StatusMessage::parse(&message.to_payload()).unwrap();
            assert_eq!(parsed, message);
        }
    }

    #[test]
    fn test_apply_bar_touches_status_bar_only() {
        let mut screen = ScreenModel::new();
        screen.take_dirty();
        ButtonEventPublisher.apply_bar(ColorValue::YELLOW, &mut screen);

        let dirty = screen.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert!(dirty.contains(Region::StatusBar));
        let bar = screen.get(Region::StatusBar);
        assert_eq!(bar.background, ColorValue::YELLOW);
        assert_eq!(bar.content, Content::Fill);
        assert_eq!(screen.get(Region::MainMessage).content, Content::Blank);
    }

    #[test]
    fn test_touch_zones() {
        assert_eq!(ButtonSlot::at_touch(60, 230), Some(ButtonSlot::A));
        assert_eq!(ButtonSlot::at_touch(160, 200), Some(ButtonSlot::B));
        assert_eq!(ButtonSlot::at_touch(319, 239), Some(ButtonSlot::C));
        assert_eq!(ButtonSlot::at_touch(160, 199), None);
        assert_eq!(ButtonSlot::at_touch(160, 240), None);
        assert_eq!(ButtonSlot::at_touch(330, 230), None);
    }

    #[test]
    fn test_markers_sit_inside_the_bar() {
        let bar = Region::ButtonBar.bounds();
        for slot in ButtonSlot::ALL {
            let marker = slot.marker_bounds(bar);
            assert_eq!(marker.top_left.y, bar.top_left.y);
            assert_eq!(marker.size.height, bar.size.height);
            assert!(marker.top_left.x + marker.size.width as i32 <= 320);
        }
    }
}
