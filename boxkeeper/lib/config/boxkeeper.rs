//! Boxkeeper configuration types and helpers.

use std::{collections::HashMap, path::Path, time::Duration};

use chrono::TimeDelta;
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::{BoxkeeperError, BoxkeeperResult};

use super::{
    DEFAULT_INSTANCE_TYPE, DEFAULT_KEY_NAME_PREFIX, DEFAULT_REAP_INTERVAL_SECS, DEFAULT_TTL_SECS,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The boxkeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters, Setters)]
#[getset(get = "pub with_prefix")]
pub struct BoxkeeperConfig {
    /// The base URL of the compute provider gateway.
    #[builder(setter(transform = |endpoint: impl AsRef<str>| endpoint.as_ref().to_string()))]
    pub(crate) provider_endpoint: String,

    /// The bearer token presented to the provider gateway. Usually supplied
    /// through the environment rather than the config file.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub(crate) provider_token: Option<String>,

    /// The ttl in seconds applied to boxes created without an explicit ttl and
    /// to boxes whose ttl tag cannot be parsed.
    #[serde(default = "BoxkeeperConfig::default_ttl_secs")]
    #[builder(default = DEFAULT_TTL_SECS)]
    pub(crate) default_ttl_secs: i64,

    /// The instance type boxes are launched as.
    #[serde(default = "BoxkeeperConfig::default_instance_type")]
    #[builder(default = DEFAULT_INSTANCE_TYPE.to_string())]
    pub(crate) default_instance_type: String,

    /// The prefix prepended to an owner's identity to form their key pair name.
    #[serde(default = "BoxkeeperConfig::default_key_name_prefix")]
    #[builder(default = DEFAULT_KEY_NAME_PREFIX.to_string())]
    pub(crate) key_name_prefix: String,

    /// The interval in seconds between reaping passes.
    #[serde(default = "BoxkeeperConfig::default_reap_interval_secs")]
    #[builder(default = DEFAULT_REAP_INTERVAL_SECS)]
    #[getset(set = "pub")]
    pub(crate) reap_interval_secs: u64,

    /// The image alias table, mapping human-chosen names to boot image ids.
    /// Managed out-of-band; the lifecycle engine only reads it.
    #[serde(default)]
    #[builder(default)]
    pub(crate) image_aliases: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxkeeperConfig {
    /// Loads a configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> BoxkeeperResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// The default ttl as a duration.
    pub fn default_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(self.default_ttl_secs)
    }

    /// The reap interval as a duration.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Validates the configuration, collecting all problems rather than
    /// stopping at the first.
    pub fn validate(&self) -> BoxkeeperResult<()> {
        let mut errors = Vec::new();

        if self.provider_endpoint.trim().is_empty() {
            errors.push("provider_endpoint must not be empty".to_string());
        }

        if self.default_ttl_secs <= 0 {
            errors.push(format!(
                "default_ttl_secs must be positive, got {}",
                self.default_ttl_secs
            ));
        }

        if self.default_instance_type.trim().is_empty() {
            errors.push("default_instance_type must not be empty".to_string());
        }

        if self.key_name_prefix.trim().is_empty() {
            errors.push("key_name_prefix must not be empty".to_string());
        }

        for (alias, image_id) in &self.image_aliases {
            if alias.trim().is_empty() || image_id.trim().is_empty() {
                errors.push(format!(
                    "image alias entries must be non-empty, got {:?} -> {:?}",
                    alias, image_id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BoxkeeperError::ConfigValidationErrors(errors))
        }
    }

    fn default_ttl_secs() -> i64 {
        DEFAULT_TTL_SECS
    }

    fn default_instance_type() -> String {
        DEFAULT_INSTANCE_TYPE.to_string()
    }

    fn default_key_name_prefix() -> String {
        DEFAULT_KEY_NAME_PREFIX.to_string()
    }

    fn default_reap_interval_secs() -> u64 {
        DEFAULT_REAP_INTERVAL_SECS
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_applies_defaults() {
        let config = BoxkeeperConfig::builder()
            .provider_endpoint("https://compute.example.test")
            .build();
        assert_eq!(config.default_ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(config.default_instance_type, DEFAULT_INSTANCE_TYPE);
        assert_eq!(config.key_name_prefix, DEFAULT_KEY_NAME_PREFIX);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "provider_endpoint: https://compute.example.test\nimage_aliases:\n  ubuntu-20: ami-0aabbccdd"
        )
        .unwrap();

        let config = BoxkeeperConfig::load(file.path()).await.unwrap();
        assert_eq!(config.get_provider_endpoint(), "https://compute.example.test");
        assert_eq!(config.default_ttl(), TimeDelta::seconds(DEFAULT_TTL_SECS));
        assert_eq!(
            config.get_image_aliases().get("ubuntu-20").unwrap(),
            "ami-0aabbccdd"
        );
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = BoxkeeperConfig::builder()
            .provider_endpoint("")
            .default_ttl_secs(0)
            .default_instance_type(String::new())
            .build();
        match config.validate() {
            Err(BoxkeeperError::ConfigValidationErrors(errors)) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }
}
