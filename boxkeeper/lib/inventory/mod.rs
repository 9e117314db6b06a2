//! The read path over the provider's tagged-instance inventory.
//!
//! Listings are always read fresh from the provider; there is no local cache
//! to drift from the cloud's truth. An instance is discoverable if and only if
//! it carries the management tag.

use std::sync::Arc;

use crate::{
    config::DEFAULT_PROVIDER_RETRY_ATTEMPTS,
    provider::{ComputeProvider, Filter, InstanceState},
    utils::retry_on_transient,
    BoxkeeperResult,
};

mod lease;
pub mod tags;

use tags::{MANAGED_TAG_VALUE, TAG_MANAGED, TAG_USER};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use lease::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The lifecycle states a leased box can be observed in. Terminated instances
/// fall out of every listing naturally.
const LEASE_STATES: [InstanceState; 4] = [
    InstanceState::Pending,
    InstanceState::Running,
    InstanceState::Stopping,
    InstanceState::Stopped,
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Owner-scoped, read-only views over the managed box inventory.
pub struct BoxInventory {
    /// The compute provider queried on every call.
    provider: Arc<dyn ComputeProvider>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxInventory {
    /// Creates an inventory over the given provider.
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self { provider }
    }

    /// Lists managed boxes, optionally scoped to a single owner.
    ///
    /// Issues one describe call filtered by the management tag. An instance
    /// whose tags cannot be parsed is logged and skipped; one malformed
    /// instance must not hide the rest of the inventory.
    pub async fn list_boxes(&self, owner: Option<&str>) -> BoxkeeperResult<Vec<BoxLease>> {
        let mut filters = vec![
            Filter::tag(TAG_MANAGED, MANAGED_TAG_VALUE),
            Filter::instance_state(&LEASE_STATES),
        ];
        if let Some(owner) = owner {
            filters.push(Filter::tag(TAG_USER, owner));
        }

        let instances = retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
            self.provider.describe_instances(&filters)
        })
        .await?;

        let mut leases = Vec::with_capacity(instances.len());
        for instance in &instances {
            match BoxLease::from_instance(instance) {
                Ok(lease) => leases.push(lease),
                Err(e) => {
                    tracing::warn!(
                        "skipping instance {} with unparsable tags: {}",
                        instance.instance_id,
                        e
                    );
                }
            }
        }

        leases.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
        Ok(leases)
    }

    /// Fetches a single managed box by instance id, fresh from the provider.
    ///
    /// Returns `None` for instances that are absent, unmanaged, already
    /// terminated, or unparsable. Mutation paths use this to re-verify
    /// ownership against current provider state rather than any caller claim.
    pub async fn get_box(&self, instance_id: &str) -> BoxkeeperResult<Option<BoxLease>> {
        let filters = vec![
            Filter::instance_id(instance_id),
            Filter::tag(TAG_MANAGED, MANAGED_TAG_VALUE),
            Filter::instance_state(&LEASE_STATES),
        ];

        let instances = retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
            self.provider.describe_instances(&filters)
        })
        .await?;

        match instances.first() {
            None => Ok(None),
            Some(instance) => match BoxLease::from_instance(instance) {
                Ok(lease) => Ok(Some(lease)),
                Err(e) => {
                    tracing::warn!(
                        "instance {} is managed but has unparsable tags: {}",
                        instance.instance_id,
                        e
                    );
                    Ok(None)
                }
            },
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::{managed_instance, MockComputeProvider};
    use chrono::{DateTime, Utc};

    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn seeded_provider() -> Arc<MockComputeProvider> {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_instance(managed_instance(
            "i-alice",
            "alice",
            "boxkeeper-alice-ubuntu-20",
            "ubuntu-20",
            base_time(),
            Some(3600),
        ));
        provider.push_instance(managed_instance(
            "i-bob",
            "bob",
            "boxkeeper-bob-debian-12",
            "debian-12",
            base_time(),
            Some(3600),
        ));
        provider
    }

    #[tokio::test]
    async fn test_list_boxes_excludes_unmanaged_instances() {
        let provider = seeded_provider();
        let mut unmanaged =
            managed_instance("i-other", "carol", "unrelated", "ubuntu-20", base_time(), None);
        unmanaged.tags.remove(TAG_MANAGED);
        provider.push_instance(unmanaged);

        let inventory = BoxInventory::new(provider);
        let leases = inventory.list_boxes(None).await.unwrap();
        let ids: Vec<_> = leases.iter().map(|l| l.get_instance_id().clone()).collect();
        assert_eq!(ids, vec!["i-alice".to_string(), "i-bob".to_string()]);
    }

    #[tokio::test]
    async fn test_list_boxes_scopes_to_owner() {
        let inventory = BoxInventory::new(seeded_provider());
        let leases = inventory.list_boxes(Some("alice")).await.unwrap();
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].get_owner(), "alice");
        assert_eq!(leases[0].get_instance_id(), "i-alice");
    }

    #[tokio::test]
    async fn test_list_boxes_skips_malformed_instances() {
        let provider = seeded_provider();
        let mut malformed =
            managed_instance("i-broken", "dave", "broken", "ubuntu-20", base_time(), None);
        malformed.tags.remove(TAG_USER);
        provider.push_instance(malformed);

        let inventory = BoxInventory::new(provider);
        let leases = inventory.list_boxes(None).await.unwrap();
        assert_eq!(leases.len(), 2);
        assert!(leases.iter().all(|l| l.get_instance_id() != "i-broken"));
    }

    #[tokio::test]
    async fn test_list_boxes_sorted_by_name() {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_instance(managed_instance(
            "i-2", "alice", "zebra", "ubuntu-20", base_time(), None,
        ));
        provider.push_instance(managed_instance(
            "i-1", "alice", "aardvark", "ubuntu-20", base_time(), None,
        ));

        let inventory = BoxInventory::new(provider);
        let leases = inventory.list_boxes(None).await.unwrap();
        let names: Vec<_> = leases
            .iter()
            .map(|l| l.get_name().clone().unwrap())
            .collect();
        assert_eq!(names, vec!["aardvark".to_string(), "zebra".to_string()]);
    }

    #[tokio::test]
    async fn test_get_box_fetches_fresh_state() {
        let inventory = BoxInventory::new(seeded_provider());
        let lease = inventory.get_box("i-alice").await.unwrap().unwrap();
        assert_eq!(lease.get_owner(), "alice");

        assert!(inventory.get_box("i-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_box_ignores_unmanaged_instances() {
        let provider = Arc::new(MockComputeProvider::new());
        let mut unmanaged =
            managed_instance("i-other", "carol", "unrelated", "ubuntu-20", base_time(), None);
        unmanaged.tags.remove(TAG_MANAGED);
        provider.push_instance(unmanaged);

        let inventory = BoxInventory::new(provider);
        assert!(inventory.get_box("i-other").await.unwrap().is_none());
    }
}
