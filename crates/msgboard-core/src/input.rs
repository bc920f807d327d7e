//! Release-edge detection for the physical buttons.

use crate::buttons::ButtonSlot;

/// Level changes closer together than this are contact bounce.
pub const DEBOUNCE_MS: u64 = 50;

/// Debounced detector that fires once per press → release transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseDetector {
    was_pressed: bool,
    last_change_ms: Option<u64>,
}

impl ReleaseDetector {
    pub const fn new() -> Self {
        Self {
            was_pressed: false,
            last_change_ms: None,
        }
    }

    /// Feed the current level. Returns true only on the release edge.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> bool {
        if pressed == self.was_pressed {
            return false;
        }

        if let Some(last) = self.last_change_ms
            && now_ms.saturating_sub(last) < DEBOUNCE_MS
        {
            return false;
        }

        self.was_pressed = pressed;
        self.last_change_ms = Some(now_ms);
        !pressed
    }
}

/// One detector per slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonPanel {
    detectors: [ReleaseDetector; 3],
}

impl ButtonPanel {
    pub const fn new() -> Self {
        Self {
            detectors: [ReleaseDetector::new(); 3],
        }
    }

    /// Feed all three levels (`true` = pressed) and return the first release.
    pub fn update(&mut self, pressed: [bool; 3], now_ms: u64) -> Option<ButtonSlot> {
        let mut released = None;
        for (slot, (detector, level)) in ButtonSlot::ALL
            .into_iter()
            .zip(self.detectors.iter_mut().zip(pressed))
        {
            if detector.update(level, now_ms) && released.is_none() {
                released = Some(slot);
            }
        }
        released
    }
}
