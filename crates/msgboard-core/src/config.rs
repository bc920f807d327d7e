//! Device configuration
//!
//! Credentials are compiled in on hardware; the simulator can load the same
//! structure from a JSON file. Every section falls back to its defaults when
//! omitted.

use alloc::vec;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid IPv4 address in {0}")]
    InvalidAddress(&'static str),
    #[error("Subnet mask bits are not contiguous")]
    InvalidSubnetMask,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub broker: BrokerConfig<'a>,
    pub time: TimeConfig<'a>,
    pub variant: VariantConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// Fixed address instead of DHCP.
    #[serde(borrow)]
    pub static_ip: Option<StaticIpConfig<'a>>,
}

/// Static IPv4 settings as dotted quads.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct StaticIpConfig<'a> {
    pub address: &'a str,
    pub gateway: &'a str,
    pub subnet_mask: &'a str,
    /// Primary first.
    #[serde(borrow)]
    pub dns_servers: Vec<&'a str>,
}

/// [`StaticIpConfig`] after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpv4 {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
}

impl StaticIpConfig<'_> {
    pub fn parse(&self) -> Result<StaticIpv4, ConfigError> {
        let address = parse_address(self.address, "address")?;
        let gateway = parse_address(self.gateway, "gateway")?;
        let mask = u32::from(parse_address(self.subnet_mask, "subnet_mask")?);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ConfigError::InvalidSubnetMask);
        }
        let dns_servers = self
            .dns_servers
            .iter()
            .map(|server| parse_address(server, "dns_servers"))
            .collect::<Result<_, _>>()?;
        Ok(StaticIpv4 {
            address,
            prefix_len: mask.leading_ones() as u8,
            gateway,
            dns_servers,
        })
    }
}

fn parse_address(text: &str, field: &'static str) -> Result<Ipv4Addr, ConfigError> {
    text.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(field))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig<'a> {
    /// Host name or dotted IPv4 address.
    pub host: &'a str,
    pub port: u16,
    pub topic: &'a str,
    pub client_id_prefix: &'a str,
    /// Zero disables keep-alive pings.
    pub keep_alive_secs: u16,
}

impl Default for BrokerConfig<'_> {
    fn default() -> Self {
        Self {
            host: "192.168.1.10",
            port: 1883,
            topic: "mqttmsgboard1",
            client_id_prefix: "M5Stack-",
            keep_alive_secs: 15,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct TimeConfig<'a> {
    /// Tried in order until one answers.
    #[serde(borrow)]
    pub ntp_servers: Vec<&'a str>,
    pub utc_offset_secs: i32,
}

impl Default for TimeConfig<'_> {
    fn default() -> Self {
        Self {
            ntp_servers: vec!["time.google.com", "pool.ntp.org"],
            utc_offset_secs: 9 * 3600,
        }
    }
}

/// Behavior switches between device variants.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct VariantConfig {
    /// Show `textEng` in place of `textMain` when present.
    pub consume_english_text: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.topic, "mqttmsgboard1");
        assert_eq!(config.broker.client_id_prefix, "M5Stack-");
        assert_eq!(config.time.utc_offset_secs, 32_400);
        assert!(!config.variant.consume_english_text);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "internet": { "ssid": "home", "password": "secret" },
            "broker": { "host": "broker.local" },
            "variant": { "consume_english_text": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.internet.ssid, "home");
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.time, TimeConfig::default());
        assert!(config.variant.consume_english_text);
    }

    #[test]
    fn test_dhcp_by_default() {
        assert_eq!(Config::default().internet.static_ip, None);
    }

    #[test]
    fn test_static_ip_section() {
        let json = r#"{ "internet": { "ssid": "home", "static_ip": {
            "address": "192.168.1.10",
            "gateway": "192.168.1.1",
            "subnet_mask": "255.255.255.0",
            "dns_servers": ["192.168.1.1", "192.168.1.2"]
        } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let parsed = config.internet.static_ip.unwrap().parse().unwrap();
        assert_eq!(parsed.address, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(parsed.gateway, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(parsed.prefix_len, 24);
        assert_eq!(
            parsed.dns_servers,
            [Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn test_static_ip_rejects_bad_values() {
        let good = StaticIpConfig {
            address: "10.0.0.5",
            gateway: "10.0.0.1",
            subnet_mask: "255.255.0.0",
            dns_servers: vec![],
        };
        assert_eq!(good.parse().unwrap().prefix_len, 16);

        let bad_address = StaticIpConfig {
            address: "10.0.0",
            ..good.clone()
        };
        assert_eq!(
            bad_address.parse(),
            Err(ConfigError::InvalidAddress("address"))
        );

        let holey_mask = StaticIpConfig {
            subnet_mask: "255.0.255.0",
            ..good.clone()
        };
        assert_eq!(holey_mask.parse(), Err(ConfigError::InvalidSubnetMask));

        let bad_dns = StaticIpConfig {
            dns_servers: vec!["dns.example"],
            ..good
        };
        assert_eq!(
            bad_dns.parse(),
            Err(ConfigError::InvalidAddress("dns_servers"))
        );
    }

    #[test]
    fn test_ntp_server_list() {
        let json = r#"{ "time": { "ntp_servers": ["a.example", "b.example"], "utc_offset_secs": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.time.ntp_servers, ["a.example", "b.example"]);
        assert_eq!(config.time.utc_offset_secs, 0);
    }
}
