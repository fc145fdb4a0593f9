use crate::discovery::PlayerLocator;
use crate::sonos::DEFAULT_PORT;
use anyhow::{bail, Context, Result};
use std::env;
use std::net::IpAddr;
use std::time::Duration;
use url::Host;

const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 5;

/// Where to find the player, loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// A configured address wins over the serial number.
    pub locator: PlayerLocator,
    pub port: u16,
}

/// Serial numbers look like `5C-AA-FD-00-22-36:1`.
pub fn is_valid_serial(serial: &str) -> bool {
    let Some((mac, suffix)) = serial.split_once(':') else {
        return false;
    };
    let pairs: Vec<&str> = mac.split('-').collect();
    pairs.len() == 6
        && pairs
            .iter()
            .all(|pair| pair.len() == 2 && pair.bytes().all(|b| b.is_ascii_hexdigit()))
        && !suffix.is_empty()
        && suffix.bytes().all(|b| b.is_ascii_digit())
}

/// An IPv4/IPv6 literal or a hostname.
fn parse_address(address: &str) -> Result<String> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    match Host::parse(address) {
        Ok(Host::Domain(domain)) => Ok(domain),
        Ok(host) => Ok(host.to_string()),
        Err(e) => bail!("SONOS_IP_ADDRESS is not an IP address or hostname: {} ({})", address, e),
    }
}

impl Config {
    /// Load configuration from `SONOS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let address = value("SONOS_IP_ADDRESS").map(|a| parse_address(&a)).transpose()?;
        let serial = value("SONOS_SERIAL");
        if let Some(serial) = &serial {
            if !is_valid_serial(serial) {
                bail!("SONOS_SERIAL is not a valid serial number: {}", serial);
            }
        }
        let port = value("SONOS_PORT")
            .map(|port| port.parse::<u16>().context("SONOS_PORT is not a port number"))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let discovery_timeout = value("SONOS_DISCOVERY_TIMEOUT_SECS")
            .map(|secs| secs.parse::<u64>().context("SONOS_DISCOVERY_TIMEOUT_SECS is not a number"))
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS));

        let locator = match (address, serial) {
            (Some(address), _) => PlayerLocator::Address(address),
            (None, Some(serial)) => PlayerLocator::Serial {
                serial,
                timeout: discovery_timeout,
            },
            (None, None) => bail!("invalid configuration - missing SONOS_IP_ADDRESS or SONOS_SERIAL"),
        };
        Ok(Self { locator, port })
    }
}
