//! The box record parsed from a provider instance's tag set.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use getset::Getters;
use serde::Serialize;

use crate::{
    error::TagParseError,
    provider::{InstanceState, ProviderInstance},
};

use super::tags::{self, TAG_CREATED_AT, TAG_IMAGE_ALIAS, TAG_NAME, TAG_TTL, TAG_USER};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One leased compute instance, as derived from provider tags.
///
/// The owner and TTL fields are parsed out of the tag set on every listing;
/// nothing here is cached or stored anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BoxLease {
    /// The provider-assigned instance id.
    pub(crate) instance_id: String,

    /// The display name given at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,

    /// The authenticated identity that created the box.
    pub(crate) owner: String,

    /// The image alias supplied at creation time, retained for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) image_alias: Option<String>,

    /// The id of the boot image the box was launched from.
    pub(crate) image_id: String,

    /// The instance type.
    pub(crate) instance_type: String,

    /// When the box was created.
    pub(crate) created_at: DateTime<Utc>,

    /// Time-to-live in seconds, if the ttl tag was present and well-formed.
    /// Callers fall back to the configured default otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ttl_secs: Option<i64>,

    /// The provider-reported lifecycle state.
    pub(crate) state: InstanceState,

    /// The public IP address, if one is assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) public_ip: Option<String>,

    /// The public DNS name, if one is assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) public_dns_name: Option<String>,

    /// The full tag set, the sole persistent representation of the box.
    pub(crate) tags: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxLease {
    /// Parses a provider instance's tag set into a box record.
    ///
    /// Owner and created-at are required; a box without them cannot be scoped
    /// or aged and is treated as malformed. A missing or malformed ttl tag
    /// yields `None` so the configured default still applies and a corrupted
    /// tag cannot leak an instance forever.
    pub fn from_instance(instance: &ProviderInstance) -> Result<Self, TagParseError> {
        let owner = instance
            .tags
            .get(TAG_USER)
            .filter(|v| !v.is_empty())
            .ok_or(TagParseError::MissingOwner)?
            .clone();

        let created_at = tags::parse_created_at(
            instance
                .tags
                .get(TAG_CREATED_AT)
                .ok_or(TagParseError::MissingCreatedAt)?,
        )?;

        let ttl_secs = match instance.tags.get(TAG_TTL) {
            None => None,
            Some(value) => match tags::parse_ttl(value) {
                Ok(ttl) => Some(ttl.num_seconds()),
                Err(_) => {
                    tracing::debug!(
                        "ignoring malformed ttl tag {:?} on instance {}",
                        value,
                        instance.instance_id
                    );
                    None
                }
            },
        };

        Ok(Self {
            instance_id: instance.instance_id.clone(),
            name: instance.tags.get(TAG_NAME).cloned(),
            owner,
            image_alias: instance.tags.get(TAG_IMAGE_ALIAS).cloned(),
            image_id: instance.image_id.clone(),
            instance_type: instance.instance_type.clone(),
            created_at,
            ttl_secs,
            state: instance.state,
            public_ip: instance.public_ip.clone(),
            public_dns_name: instance.public_dns_name.clone(),
            tags: instance.tags.clone(),
        })
    }

    /// The box's ttl, if one was tagged.
    pub fn ttl(&self) -> Option<TimeDelta> {
        self.ttl_secs.map(TimeDelta::seconds)
    }

    /// Whether the box's age has reached its ttl as of `now`. The threshold is
    /// inclusive: a box exactly as old as its ttl is expired.
    pub fn is_expired(&self, now: DateTime<Utc>, default_ttl: TimeDelta) -> bool {
        let ttl = self.ttl().unwrap_or(default_ttl);
        now.signed_duration_since(self.created_at) >= ttl
    }

    /// Human-readable age, e.g. `2d4h0m13s`.
    pub fn age(&self, now: DateTime<Utc>) -> String {
        let delta = now.signed_duration_since(self.created_at);
        let days = delta.num_days();
        let hours = delta.num_hours() - days * 24;
        let minutes = delta.num_minutes() - delta.num_hours() * 60;
        let seconds = delta.num_seconds() - delta.num_minutes() * 60;
        format!("{}d{}h{}m{}s", days, hours, minutes, seconds)
    }

    /// The key listings are sorted by: the display name, falling back to the
    /// instance id.
    pub fn sort_key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.instance_id)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::managed_instance;

    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_from_instance_parses_full_tag_set() {
        let instance = managed_instance(
            "i-0001",
            "alice",
            "boxkeeper-alice-ubuntu-20",
            "ubuntu-20",
            base_time(),
            Some(3600),
        );
        let lease = BoxLease::from_instance(&instance).unwrap();
        assert_eq!(lease.get_instance_id(), "i-0001");
        assert_eq!(lease.get_owner(), "alice");
        assert_eq!(lease.get_image_alias().as_deref(), Some("ubuntu-20"));
        assert_eq!(lease.get_name().as_deref(), Some("boxkeeper-alice-ubuntu-20"));
        assert_eq!(*lease.get_created_at(), base_time());
        assert_eq!(lease.ttl(), Some(TimeDelta::seconds(3600)));
    }

    #[test]
    fn test_from_instance_requires_owner_and_created_at() {
        let mut instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        instance.tags.remove(TAG_USER);
        assert_eq!(
            BoxLease::from_instance(&instance),
            Err(TagParseError::MissingOwner)
        );

        let mut instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        instance.tags.remove(TAG_CREATED_AT);
        assert_eq!(
            BoxLease::from_instance(&instance),
            Err(TagParseError::MissingCreatedAt)
        );

        let mut instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        instance
            .tags
            .insert(TAG_CREATED_AT.to_string(), "not-a-time".to_string());
        assert!(BoxLease::from_instance(&instance).is_err());
    }

    #[test]
    fn test_malformed_ttl_falls_back_to_none() {
        let mut instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        instance
            .tags
            .insert(TAG_TTL.to_string(), "four hours".to_string());
        let lease = BoxLease::from_instance(&instance).unwrap();
        assert_eq!(lease.ttl(), None);
    }

    #[test]
    fn test_is_expired_threshold_is_inclusive() {
        let ttl = TimeDelta::seconds(3600);
        let instance = managed_instance("i-0001", "alice", "b", "a", base_time(), Some(3600));
        let lease = BoxLease::from_instance(&instance).unwrap();

        let exactly = base_time() + ttl;
        assert!(lease.is_expired(exactly, TimeDelta::seconds(999_999)));
        assert!(!lease.is_expired(exactly - TimeDelta::seconds(1), TimeDelta::seconds(999_999)));
        assert!(lease.is_expired(exactly + TimeDelta::seconds(1), TimeDelta::seconds(999_999)));
    }

    #[test]
    fn test_is_expired_uses_default_ttl_when_untagged() {
        let instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        let lease = BoxLease::from_instance(&instance).unwrap();
        let default_ttl = TimeDelta::seconds(600);
        assert!(lease.is_expired(base_time() + TimeDelta::seconds(600), default_ttl));
        assert!(!lease.is_expired(base_time() + TimeDelta::seconds(599), default_ttl));
    }

    #[test]
    fn test_age_formatting() {
        let instance = managed_instance("i-0001", "alice", "b", "a", base_time(), None);
        let lease = BoxLease::from_instance(&instance).unwrap();
        let now = base_time()
            + TimeDelta::days(2)
            + TimeDelta::hours(4)
            + TimeDelta::seconds(13);
        assert_eq!(lease.age(now), "2d4h0m13s");
    }
}
