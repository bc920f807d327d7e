//! ESP32-S3 firmware-specific modules for msgboard
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: power and GPIO expander bring-up, the touch controller, the LCD
//! panel, Wi-Fi association and the embassy-net sockets behind the core's
//! broker and time capabilities.

#![no_std]

extern crate alloc;

pub mod async_i2c_bus;
pub mod hardware;
pub mod net;
pub mod panel;
pub mod secrets;
pub mod touch;
