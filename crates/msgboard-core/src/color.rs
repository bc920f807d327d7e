//! Symbolic color names and the display color codes they resolve to
//!
//! Colors are carried around as raw RGB565 codes from the classic TFT
//! palette. Inbound messages name colors by string; [`resolve`] turns a
//! name into a [`ColorValue`] and never fails.
//!
//! # RGB565 Format
//! - Red: 5 bits (0-31)
//! - Green: 6 bits (0-63)
//! - Blue: 5 bits (0-31)

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::RawU16;

/// Opaque 16-bit display color code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorValue(u16);

impl ColorValue {
    pub const BLACK: Self = Self(0x0000);
    pub const NAVY: Self = Self(0x000F);
    pub const DARKCYAN: Self = Self(0x03EF);
    pub const BLUE: Self = Self(0x001F);
    pub const GREEN: Self = Self(0x07E0);
    pub const RED: Self = Self(0xF800);
    pub const CYAN: Self = Self(0x07FF);
    pub const MAGENTA: Self = Self(0xF81F);
    pub const YELLOW: Self = Self(0xFFE0);
    pub const WHITE: Self = Self(0xFFFF);

    /// Returned for any name outside the palette.
    pub const PURPLE: Self = Self(0x780F);

    /// Raw RGB565 code.
    pub const fn code(self) -> u16 {
        self.0
    }
}

impl From<ColorValue> for Rgb565 {
    fn from(value: ColorValue) -> Self {
        Rgb565::from(RawU16::new(value.0))
    }
}

/// Name table, matched exactly and case-sensitively.
const PALETTE: [(&str, ColorValue); 11] = [
    ("BLACK", ColorValue::BLACK),
    ("NAVY", ColorValue::NAVY),
    ("DARKBLUE", ColorValue::NAVY),
    ("DARKCYAN", ColorValue::DARKCYAN),
    ("BLUE", ColorValue::BLUE),
    ("GREEN", ColorValue::GREEN),
    ("RED", ColorValue::RED),
    ("CYAN", ColorValue::CYAN),
    ("MAGENTA", ColorValue::MAGENTA),
    ("YELLOW", ColorValue::YELLOW),
    ("WHITE", ColorValue::WHITE),
];

/// Resolve a color name to its display code.
///
/// Unknown names, the empty string and any casing other than the upper-case
/// table entries resolve to [`ColorValue::PURPLE`].
pub fn resolve(name: &str) -> ColorValue {
    PALETTE
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, color)| *color)
        .unwrap_or(ColorValue::PURPLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(resolve("BLACK"), ColorValue::BLACK);
        assert_eq!(resolve("NAVY").code(), 0x000F);
        assert_eq!(resolve("DARKCYAN").code(), 0x03EF);
        assert_eq!(resolve("BLUE").code(), 0x001F);
        assert_eq!(resolve("GREEN").code(), 0x07E0);
        assert_eq!(resolve("RED").code(), 0xF800);
        assert_eq!(resolve("CYAN").code(), 0x07FF);
        assert_eq!(resolve("MAGENTA").code(), 0xF81F);
        assert_eq!(resolve("YELLOW").code(), 0xFFE0);
        assert_eq!(resolve("WHITE").code(), 0xFFFF);
    }

    #[test]
    fn test_darkblue_is_navy() {
        assert_eq!(resolve("DARKBLUE"), resolve("NAVY"));
    }

    #[test]
    fn test_unknown_names_fall_back_to_purple() {
        for name in ["", "red", "Red", "PURPLE", " RED", "RED ", "ORANGE", "黒"] {
            assert_eq!(resolve(name), ColorValue::PURPLE, "name {name:?}");
        }
    }

    #[test]
    fn test_resolve_is_pure() {
        assert_eq!(resolve("CYAN"), resolve("CYAN"));
        assert_eq!(resolve("nope"), resolve("nope"));
    }

    #[test]
    fn test_rgb565_conversion() {
        assert_eq!(Rgb565::from(ColorValue::BLACK), Rgb565::BLACK);
        assert_eq!(Rgb565::from(ColorValue::WHITE), Rgb565::WHITE);
        assert_eq!(Rgb565::from(ColorValue::RED), Rgb565::RED);
        assert_eq!(Rgb565::from(ColorValue::GREEN), Rgb565::GREEN);
        assert_eq!(Rgb565::from(ColorValue::BLUE), Rgb565::BLUE);
    }
}
