//! Core types shared by compute provider implementations.

use std::{collections::HashMap, fmt, str::FromStr};

use getset::Getters;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use typed_builder::TypedBuilder;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Provider error codes that indicate a request was throttled or otherwise rejected
/// before any state change took place. Only these are safe to retry.
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
];

/// Provider error codes that indicate the referenced instance no longer exists.
pub const INSTANCE_MISSING_ERROR_CODES: &[&str] =
    &["InvalidInstanceID.NotFound", "InstanceNotFound"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The provider-reported lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    /// The instance is being provisioned.
    Pending,

    /// The instance is running.
    Running,

    /// The instance is shutting down prior to termination.
    ShuttingDown,

    /// The instance is stopping.
    Stopping,

    /// The instance is stopped.
    Stopped,

    /// The instance has been terminated.
    Terminated,
}

/// An instance as reported by the compute provider.
///
/// This is the raw provider view. Instances that carry boxkeeper's management
/// tags get parsed into [`BoxLease`](crate::inventory::BoxLease) records by the
/// inventory.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ProviderInstance {
    /// The provider-assigned instance id.
    pub(crate) instance_id: String,

    /// The id of the boot image the instance was launched from.
    pub(crate) image_id: String,

    /// The instance type.
    pub(crate) instance_type: String,

    /// The provider-reported lifecycle state.
    pub(crate) state: InstanceState,

    /// The public IP address, if one is assigned.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) public_ip: Option<String>,

    /// The public DNS name, if one is assigned.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) public_dns_name: Option<String>,

    /// The full tag set attached to the instance.
    #[serde(default)]
    pub(crate) tags: HashMap<String, String>,
}

/// A key pair as reported by the compute provider.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct KeyPairInfo {
    /// The provider-side key pair name.
    pub(crate) name: String,

    /// The fingerprint of the public key material.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) fingerprint: Option<String>,
}

/// A name/values filter applied to a describe-instances call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    /// The filter name, e.g. `tag:boxkeeper:user` or `instance-state-name`.
    pub name: String,

    /// The values any one of which must match.
    pub values: Vec<String>,
}

/// The specification for a single run-instance call.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct RunInstanceSpec {
    /// The id of the boot image to launch from.
    #[builder(setter(transform = |id: impl AsRef<str>| id.as_ref().to_string()))]
    pub(crate) image_id: String,

    /// The instance type to launch.
    #[builder(setter(transform = |ty: impl AsRef<str>| ty.as_ref().to_string()))]
    pub(crate) instance_type: String,

    /// The name of the key pair to attach.
    #[builder(setter(transform = |name: impl AsRef<str>| name.as_ref().to_string()))]
    pub(crate) key_name: String,

    /// Client-assigned idempotency token, so a retried request cannot
    /// double-provision.
    #[builder(setter(transform = |token: impl AsRef<str>| token.as_ref().to_string()))]
    pub(crate) client_token: String,

    /// The tags to attach to the instance at launch.
    #[builder(default)]
    pub(crate) tags: HashMap<String, String>,
}

/// An error response from the compute provider, including the provider's own
/// error code and message.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderApiError {
    /// The provider's error code.
    pub code: String,

    /// The provider's diagnostic message.
    pub message: String,

    /// Whether the request was rejected before any state change took place,
    /// making it safe to retry.
    #[serde(default)]
    pub transient: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Filter {
    /// Creates a filter matching instances that carry `key` with the exact `value`.
    pub fn tag(key: &str, value: &str) -> Self {
        Self {
            name: format!("tag:{}", key),
            values: vec![value.to_string()],
        }
    }

    /// Creates a filter matching instances that carry the tag key at all.
    pub fn tag_key(key: &str) -> Self {
        Self {
            name: "tag-key".to_string(),
            values: vec![key.to_string()],
        }
    }

    /// Creates a filter matching instances in any of the given lifecycle states.
    pub fn instance_state(states: &[InstanceState]) -> Self {
        Self {
            name: "instance-state-name".to_string(),
            values: states.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a filter matching a single instance id.
    pub fn instance_id(id: &str) -> Self {
        Self {
            name: "instance-id".to_string(),
            values: vec![id.to_string()],
        }
    }
}

impl ProviderApiError {
    /// Returns true if the error is safe to retry with backoff.
    pub fn is_transient(&self) -> bool {
        self.transient || TRANSIENT_ERROR_CODES.contains(&self.code.as_str())
    }

    /// Returns true if the error means the referenced instance no longer exists.
    pub fn is_instance_missing(&self) -> bool {
        INSTANCE_MISSING_ERROR_CODES.contains(&self.code.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstanceState::Pending),
            "running" => Ok(InstanceState::Running),
            "shutting-down" => Ok(InstanceState::ShuttingDown),
            "stopping" => Ok(InstanceState::Stopping),
            "stopped" => Ok(InstanceState::Stopped),
            "terminated" => Ok(InstanceState::Terminated),
            other => Err(format!("unknown instance state: {}", other)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_state_round_trip() {
        for state in [
            InstanceState::Pending,
            InstanceState::Running,
            InstanceState::ShuttingDown,
            InstanceState::Stopping,
            InstanceState::Stopped,
            InstanceState::Terminated,
        ] {
            assert_eq!(state.to_string().parse::<InstanceState>().unwrap(), state);
        }
        assert!("paused".parse::<InstanceState>().is_err());
    }

    #[test]
    fn test_provider_api_error_transient_classification() {
        let throttled = ProviderApiError {
            code: "RequestLimitExceeded".to_string(),
            message: "rate exceeded".to_string(),
            transient: false,
        };
        assert!(throttled.is_transient());
        assert!(!throttled.is_instance_missing());

        let missing = ProviderApiError {
            code: "InvalidInstanceID.NotFound".to_string(),
            message: "the instance id does not exist".to_string(),
            transient: false,
        };
        assert!(missing.is_instance_missing());
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_filter_constructors() {
        let f = Filter::tag("boxkeeper:user", "alice");
        assert_eq!(f.name, "tag:boxkeeper:user");
        assert_eq!(f.values, vec!["alice".to_string()]);

        let f = Filter::instance_state(&[InstanceState::Pending, InstanceState::Running]);
        assert_eq!(f.name, "instance-state-name");
        assert_eq!(f.values, vec!["pending".to_string(), "running".to_string()]);
    }
}
