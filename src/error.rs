use thiserror::Error;

/// Everything that can stop a command before or during its device calls.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid payload {0}")]
    InvalidPayload(String),
    #[error("msg.topic is undefined or empty")]
    MissingTopic,
    #[error("volume is out of range {min} ... {max}: {value}")]
    VolumeOutOfRange { value: i64, min: i64, max: i64 },
    #[error("volume is not a valid number: {0}")]
    VolumeNotANumber(String),
    #[error("invalid msg.filter - mediaType and serviceName must be non-empty strings: {0}")]
    InvalidFilter(String),
    #[error("could not find any My Sonos items")]
    EmptyCatalog,
    #[error("no My Sonos item matching >>{0}<<")]
    NoMatchFound(String),
    #[error("could not resolve player address: {0}")]
    AddressResolution(String),
    #[error(transparent)]
    DeviceRpcFailure(#[from] anyhow::Error),
}
