//! Clock ticker
//!
//! Compares each wall-clock reading against the last one rendered and
//! rewrites only the clock regions that went stale: the seconds block on
//! every new second, and the `HH:MM` block (together with the seconds) when
//! the minute rolls over.

use core::fmt::Write;

use log::debug;

use crate::color::ColorValue;
use crate::region::{ClockRegion, Region, RegionSet, ScreenModel};

/// Separator drawn between the hour and minute digit groups.
pub const CLOCK_SEPARATOR: char = ':';

/// Wall-clock time of day. Not range checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockReading {
    pub const fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    /// Local time of day for a Unix timestamp shifted by `utc_offset_secs`.
    pub fn from_unix(unix_secs: u64, utc_offset_secs: i32) -> Self {
        let local = unix_secs as i64 + utc_offset_secs as i64;
        let secs_of_day = local.rem_euclid(86_400);
        Self {
            hour: (secs_of_day / 3600) as u8,
            minute: ((secs_of_day % 3600) / 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }
}

/// Two zero-padded decimal digits. Values above 99 pass through unchanged.
pub fn two_digits(value: u8) -> heapless::String<3> {
    let mut out = heapless::String::new();
    // A u8 never needs more than three digits.
    let _ = write!(out, "{value:02}");
    out
}

/// Text stored in the hour/minute region: hour digits, separator, minute digits.
pub fn hour_minute_text(hour: u8, minute: u8) -> heapless::String<8> {
    let mut out = heapless::String::new();
    let _ = out.push_str(&two_digits(hour));
    let _ = out.push(CLOCK_SEPARATOR);
    let _ = out.push_str(&two_digits(minute));
    out
}

/// Tracks the last rendered reading and redraws the stale clock regions.
///
/// Until the first tick nothing has been rendered, which compares unequal to
/// every reading (including out-of-range ones), so the first tick always
/// redraws both regions.
#[derive(Debug, Clone)]
pub struct ClockTicker {
    last: Option<ClockReading>,
    foreground: ColorValue,
    background: ColorValue,
}

impl Default for ClockTicker {
    fn default() -> Self {
        Self::new(ColorValue::WHITE, ColorValue::BLACK)
    }
}

impl ClockTicker {
    pub fn new(foreground: ColorValue, background: ColorValue) -> Self {
        Self {
            last: None,
            foreground,
            background,
        }
    }

    /// The last reading written to the screen.
    pub fn last_rendered(&self) -> Option<ClockReading> {
        self.last
    }

    /// Evaluate `reading` and rewrite the stale clock regions.
    ///
    /// Returns the regions that were written.
    pub fn tick(&mut self, reading: ClockReading, screen: &mut ScreenModel) -> RegionSet {
        let mut redrawn = RegionSet::empty();
        let (second_changed, minute_changed) = match self.last {
            Some(last) => (reading.second != last.second, reading.minute != last.minute),
            None => (true, true),
        };
        if !second_changed {
            return redrawn;
        }

        let mut clock = screen.partition::<ClockRegion>();
        if minute_changed {
            let hm = hour_minute_text(reading.hour, reading.minute);
            clock.apply_text(ClockRegion::HourMinute, &hm, self.foreground, self.background);
            redrawn.insert(Region::ClockHourMinute);
            debug!("Clock minute rollover to {}", hm);
        }

        clock.apply_text(
            ClockRegion::Seconds,
            &two_digits(reading.second),
            self.foreground,
            self.background,
        );
        redrawn.insert(Region::ClockSeconds);

        self.last = Some(reading);
        redrawn
    }
}
