use crate::error::CommandError;
use log::{debug, warn};
use std::num::IntErrorKind;

/// Volume used for notifications when `msg.volume` is missing or unusable.
pub const DEFAULT_NOTIFICATION_VOLUME: u8 = 40;

const VOLUME_MIN: i64 = 1;
const VOLUME_MAX: i64 = 99;
const ADJUST_MIN: i64 = -29;
const ADJUST_MAX: i64 = 29;

/// Absolute player volume, always within 1 ..= 99.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume(u8);

impl Volume {
    pub fn get(self) -> u8 {
        self.0
    }
}

/// Relative volume change, always within -29 ..= 29.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDelta(i8);

impl VolumeDelta {
    pub fn get(self) -> i8 {
        self.0
    }
}

/// Parses an integer token, leading sign allowed. Digit strings too long for
/// an `i64` are reported as out of range, not as non-numeric.
fn parse_integer(token: &str, min: i64, max: i64) -> Result<i64, CommandError> {
    let trimmed = token.trim();
    match trimmed.parse::<i64>() {
        Ok(value) if (min..=max).contains(&value) => {
            debug!("is in range: {}", value);
            Ok(value)
        }
        Ok(value) => Err(CommandError::VolumeOutOfRange { value, min, max }),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Err(CommandError::VolumeOutOfRange {
                value: i64::MAX,
                min,
                max,
            }),
            IntErrorKind::NegOverflow => Err(CommandError::VolumeOutOfRange {
                value: i64::MIN,
                min,
                max,
            }),
            _ => Err(CommandError::VolumeNotANumber(token.to_string())),
        },
    }
}

/// Strict absolute volume: anything outside 1 ..= 99 aborts the action.
pub fn parse_volume(token: &str) -> Result<Volume, CommandError> {
    let value = parse_integer(token, VOLUME_MIN, VOLUME_MAX)?;
    // range checked above
    Ok(Volume(value as u8))
}

/// Strict relative volume, such as `+15` or `-5`.
pub fn parse_volume_delta(token: &str) -> Result<VolumeDelta, CommandError> {
    let value = parse_integer(token, ADJUST_MIN, ADJUST_MAX)?;
    Ok(VolumeDelta(value as i8))
}

/// Lenient volume for notifications.
///
/// Unlike [`parse_volume`] this never fails: a missing token yields the
/// default silently, an invalid one yields the default with a warning.
pub fn notification_volume(token: Option<&str>) -> Volume {
    let Some(token) = token else {
        return Volume(DEFAULT_NOTIFICATION_VOLUME);
    };
    match parse_volume(token) {
        Ok(volume) => volume,
        Err(CommandError::VolumeOutOfRange { value, .. }) => {
            warn!("volume value out of range ({}) - set to default", value);
            Volume(DEFAULT_NOTIFICATION_VOLUME)
        }
        Err(_) => {
            warn!("invalid volume >>{}<< - corrected to default", token);
            Volume(DEFAULT_NOTIFICATION_VOLUME)
        }
    }
}
