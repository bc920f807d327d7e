//! Hardware-independent core library for msgboard
//!
//! This crate contains all platform-agnostic logic for the MQTT status
//! display: the screen region model and its ownership partition, the clock
//! ticker, inbound status message handling, button publishing, the MQTT and
//! SNTP wire codecs, the region renderer and the cooperative run loop.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod buttons;
pub mod clock;
pub mod color;
pub mod config;
pub mod display_manager;
pub mod framebuffer;
pub mod input;
pub mod link;
pub mod message;
pub mod mqtt;
pub mod ntp;
pub mod region;
pub mod runtime;

/// Panel width in pixels.
pub const DISPLAY_WIDTH_PX: u16 = 320;

/// Panel height in pixels.
pub const DISPLAY_HEIGHT_PX: u16 = 240;
