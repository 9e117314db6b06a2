//! Tag keys and tag-value codecs for the boxkeeper tagging contract.
//!
//! Tags are the sole persistent representation of a box: there is no auxiliary
//! database. Every key here has an explicit parse function with a malformed
//! branch so the inventory never assumes presence or well-formedness.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::TagParseError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The management tag. An instance without this tag is invisible to every
/// boxkeeper operation, including the reaper.
pub const TAG_MANAGED: &str = "boxkeeper:managed";

/// The value carried by the management tag.
pub const MANAGED_TAG_VALUE: &str = "true";

/// The tag holding the owning user's identity.
pub const TAG_USER: &str = "boxkeeper:user";

/// The tag holding the creation time as epoch seconds.
pub const TAG_CREATED_AT: &str = "boxkeeper:created-at";

/// The tag holding the image alias the box was created from.
pub const TAG_IMAGE_ALIAS: &str = "boxkeeper:image-alias";

/// The tag holding the time-to-live in seconds.
pub const TAG_TTL: &str = "boxkeeper:ttl";

/// The provider's display-name tag.
pub const TAG_NAME: &str = "Name";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Formats a timestamp as the epoch-seconds string stored in the created-at tag.
pub fn epoch_string(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// Parses a created-at tag value. Accepts integral and fractional epoch seconds.
pub fn parse_created_at(value: &str) -> Result<DateTime<Utc>, TagParseError> {
    let epoch = value
        .parse::<f64>()
        .map_err(|_| TagParseError::InvalidCreatedAt(value.to_string()))?;
    if !epoch.is_finite() {
        return Err(TagParseError::InvalidCreatedAt(value.to_string()));
    }

    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| TagParseError::InvalidCreatedAt(value.to_string()))
}

/// Parses a ttl tag value as whole seconds.
pub fn parse_ttl(value: &str) -> Result<TimeDelta, TagParseError> {
    let secs = value
        .parse::<i64>()
        .map_err(|_| TagParseError::InvalidTtl(value.to_string()))?;
    Ok(TimeDelta::seconds(secs))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
