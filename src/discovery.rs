use crate::error::CommandError;
use anyhow::{Context, Result};
use futures::StreamExt;
use log::{debug, info};
use serde::Deserialize;
use ssdp_client::{SearchTarget, URN};
use std::time::Duration;

/// How to reach the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerLocator {
    /// Fixed network address.
    Address(String),
    /// Look the player up by serial number on every resolution.
    Serial { serial: String, timeout: Duration },
}

impl PlayerLocator {
    /// Current network address of the player.
    pub async fn resolve(&self) -> Result<String, CommandError> {
        match self {
            PlayerLocator::Address(address) => Ok(address.clone()),
            PlayerLocator::Serial { serial, timeout } => match discover_by_serial(serial, *timeout).await {
                Ok(Some(address)) => Ok(address),
                Ok(None) => Err(CommandError::AddressResolution(format!(
                    "could not find any player by serial {}",
                    serial
                ))),
                Err(e) => Err(CommandError::AddressResolution(format!("discovery failed: {:#}", e))),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescriptionRoot {
    device: DeviceDescription,
}

#[derive(Debug, Deserialize)]
struct DeviceDescription {
    #[serde(rename = "serialNum", default)]
    serial_num: Option<String>,
}

/// Serial number from a UPnP device description document.
fn serial_from_description(xml: &str) -> Result<Option<String>> {
    let root: DescriptionRoot = quick_xml::de::from_str(xml).context("Failed to parse device description")?;
    Ok(root.device.serial_num.map(|s| s.trim().to_string()))
}

async fn fetch_serial(client: &reqwest::Client, location: &str) -> Result<Option<String>> {
    let body = client
        .get(location)
        .send()
        .await
        .with_context(|| format!("Failed to fetch device description from {}", location))?
        .text()
        .await?;
    serial_from_description(&body)
}

/// Searches the local network for ZonePlayers and returns the host of the one
/// whose serial number matches.
async fn discover_by_serial(serial: &str, timeout: Duration) -> Result<Option<String>> {
    info!("Starting Sonos player discovery for serial {}", serial);
    let search_target = SearchTarget::URN(URN::device("schemas-upnp-org", "ZonePlayer", 1));
    let responses = ssdp_client::search(&search_target, timeout, 2)
        .await
        .context("Failed to perform SSDP search")?
        .collect::<Vec<_>>()
        .await;

    let client = reqwest::Client::new();
    for response in responses {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                debug!("Error processing SSDP response: {}", e);
                continue;
            }
        };
        let location = response.location();
        let Some(host) = url::Url::parse(location)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
        else {
            continue;
        };

        match fetch_serial(&client, location).await {
            Ok(Some(found)) if found.eq_ignore_ascii_case(serial) => {
                info!("Found player with serial {} at {}", serial, host);
                return Ok(Some(host.trim_matches(|c| c == '[' || c == ']').to_string()));
            }
            Ok(found) => debug!("Skipping player at {} with serial {:?}", host, found),
            Err(e) => debug!("Skipping player at {}: {:#}", host, e),
        }
    }
    Ok(None)
}
