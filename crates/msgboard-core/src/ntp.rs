//! SNTP codec and network-synchronised wall clock
//!
//! The device has no real-time clock. After each successful SNTP exchange
//! the Unix time is anchored to the monotonic millisecond counter, and the
//! wall clock advances from that anchor until the next sync.

use log::{debug, info};
use thiserror_no_std::Error;

use crate::clock::ClockReading;
use crate::runtime::TimeSource;

pub const NTP_PORT: u16 = 123;

/// Size of an SNTP request and of the fixed part of a response.
pub const NTP_PACKET_LEN: usize = 48;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// Wall clock is refreshed from the network once an hour.
pub const RESYNC_INTERVAL_MS: u64 = 3_600_000;

/// Offset of the transmit timestamp (seconds part) in a response.
const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpError {
    #[error("NTP response too short")]
    ShortResponse,
    #[error("Wall clock not synchronised yet")]
    NotSynced,
}

/// Client request: LI = 0, VN = 3, Mode = 3.
pub fn request_packet() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Unix seconds from a server response's transmit timestamp.
pub fn parse_response(response: &[u8]) -> Result<u64, NtpError> {
    if response.len() < NTP_PACKET_LEN {
        return Err(NtpError::ShortResponse);
    }
    let ts = &response[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4];
    let secs = u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]) as u64;
    Ok(secs.saturating_sub(NTP_UNIX_OFFSET_SECS))
}

/// Unix time at a point on the monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    unix_secs: u64,
    at_ms: u64,
}

/// Wall clock that advances from the last network sync.
#[derive(Debug, Clone)]
pub struct NtpClock {
    anchor: Option<Anchor>,
    utc_offset_secs: i32,
}

impl NtpClock {
    pub fn new(utc_offset_secs: i32) -> Self {
        Self {
            anchor: None,
            utc_offset_secs,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Record a fresh network time taken at `now_ms`.
    pub fn sync(&mut self, unix_secs: u64, now_ms: u64) {
        info!("Wall clock synced to {} (utc offset {}s)", unix_secs, self.utc_offset_secs);
        self.anchor = Some(Anchor {
            unix_secs,
            at_ms: now_ms,
        });
    }

    /// True when the clock has never synced or the last sync is an hour old.
    pub fn needs_resync(&self, now_ms: u64) -> bool {
        match self.anchor {
            Some(anchor) => now_ms.saturating_sub(anchor.at_ms) >= RESYNC_INTERVAL_MS,
            None => true,
        }
    }

    pub fn unix_now(&self, now_ms: u64) -> Result<u64, NtpError> {
        let anchor = self.anchor.ok_or(NtpError::NotSynced)?;
        Ok(anchor.unix_secs + now_ms.saturating_sub(anchor.at_ms) / 1000)
    }

    /// Local time of day at `now_ms`.
    pub fn reading(&self, now_ms: u64) -> Result<ClockReading, NtpError> {
        let unix = self.unix_now(now_ms)?;
        Ok(ClockReading::from_unix(unix, self.utc_offset_secs))
    }
}

impl TimeSource for NtpClock {
    fn now(&mut self, now_ms: u64) -> Option<ClockReading> {
        match self.reading(now_ms) {
            Ok(reading) => Some(reading),
            Err(e) => {
                debug!("No clock reading: {}", e);
                None
            }
        }
    }
}
