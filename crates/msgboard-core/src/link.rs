//! Connectivity capabilities and policy
//!
//! The core never talks to the radio or the broker directly. The firmware
//! and the simulator provide implementations of [`Transport`] (broker
//! session) and [`WifiLink`] (network association); the run loop drives them
//! with the fixed timing below.

use alloc::vec::Vec;
use core::fmt::Write;
use core::future::Future;

use thiserror_no_std::Error;

/// Wait between failed broker connection attempts.
pub const RECONNECT_RETRY_DELAY_MS: u32 = 5_000;

/// Pause after painting the failure band, before the retry message appears.
pub const RECONNECT_FAILURE_FLASH_MS: u32 = 500;

/// How long "Connected" stays on screen after a successful reconnect.
pub const RECONNECT_SUCCESS_PAUSE_MS: u32 = 3_000;

/// Interval between association checks at startup.
pub const ASSOCIATION_POLL_MS: u32 = 2_000;

/// Association checks allowed before the device restarts.
pub const ASSOCIATION_MAX_POLLS: u32 = 20;

/// Pause after showing the address once associated.
pub const ASSOCIATION_SUCCESS_PAUSE_MS: u32 = 1_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("Not connected")]
    NotConnected,
    #[error("Timed out waiting for the broker")]
    Timeout,
    #[error("Connection lost")]
    ConnectionLost,
    #[error("Network connection failed")]
    ConnectFailed,
    #[error("Broker refused the connection (code {0})")]
    Refused(u8),
    #[error("Broker protocol violation")]
    Protocol,
    #[error("Network association attempts exhausted")]
    AssociationExhausted,
}

impl LinkError {
    /// Numeric state in the style of the classic Arduino MQTT client, shown
    /// on screen as `rc=<code>`.
    pub fn state_code(&self) -> i8 {
        match self {
            LinkError::Timeout => -4,
            LinkError::ConnectionLost => -3,
            LinkError::ConnectFailed | LinkError::AssociationExhausted => -2,
            LinkError::NotConnected => -1,
            LinkError::Refused(code) => *code as i8,
            LinkError::Protocol => 2,
        }
    }
}

/// Broker session on a single topic.
pub trait Transport {
    fn is_connected(&self) -> bool;

    /// Open a fresh session with the given client id.
    fn connect(&mut self, client_id: &str) -> impl Future<Output = Result<(), LinkError>>;

    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<(), LinkError>>;

    /// Return the next pending inbound payload without waiting for one.
    fn poll(&mut self, now_ms: u64) -> impl Future<Output = Result<Option<Vec<u8>>, LinkError>>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), LinkError>>;
}

/// Network association (Wi-Fi station).
pub trait WifiLink {
    /// Start associating. An error here is fatal at startup.
    fn begin(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    fn is_associated(&mut self) -> bool;

    /// Address to show once associated.
    fn local_address(&self) -> heapless::String<40>;
}

/// Client ids are `<prefix><hex>`; the suffix changes on every attempt.
#[derive(Debug, Clone)]
pub struct ClientIdGenerator {
    state: u32,
}

impl ClientIdGenerator {
    pub fn new(seed: u32) -> Self {
        // xorshift must not start at zero
        Self {
            state: seed.max(1),
        }
    }

    fn next_suffix(&mut self) -> u16 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x >> 16) as u16
    }

    pub fn next(&mut self, prefix: &str) -> heapless::String<32> {
        let mut id = heapless::String::new();
        let suffix = self.next_suffix();
        let _ = write!(id, "{prefix}{suffix:x}");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes() {
        assert_eq!(LinkError::Timeout.state_code(), -4);
        assert_eq!(LinkError::ConnectionLost.state_code(), -3);
        assert_eq!(LinkError::ConnectFailed.state_code(), -2);
        assert_eq!(LinkError::NotConnected.state_code(), -1);
        assert_eq!(LinkError::Refused(5).state_code(), 5);
    }

    #[test]
    fn test_client_ids_vary() {
        let mut ids = ClientIdGenerator::new(42);
        let first = ids.next("M5Stack-");
        let second = ids.next("M5Stack-");
        assert!(first.starts_with("M5Stack-"));
        assert!(first.len() > "M5Stack-".len());
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_seed_still_advances() {
        let mut ids = ClientIdGenerator::new(0);
        assert_ne!(ids.next("x"), ids.next("x"));
    }
}
