//! Credentials baked in at build time by `build.rs`.

pub const WIFI_SSID: &str = env!("MSGBOARD_WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("MSGBOARD_WIFI_PASSWORD");

/// Empty when unset; the configured default broker is used instead.
pub const BROKER_HOST: &str = env!("MSGBOARD_BROKER_HOST");

/// Static IPv4 settings; DHCP is used while `STATIC_IP` is empty.
pub const STATIC_IP: &str = env!("MSGBOARD_STATIC_IP");
pub const GATEWAY: &str = env!("MSGBOARD_GATEWAY");
pub const SUBNET_MASK: &str = env!("MSGBOARD_SUBNET_MASK");
/// Comma separated, primary first.
pub const DNS_SERVERS: &str = env!("MSGBOARD_DNS_SERVERS");
