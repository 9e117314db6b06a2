//! Scheduled reconciliation of expired boxes.
//!
//! The reaper is the one component allowed to act across all tenants. Each
//! pass lists every managed box, terminates the ones whose age has reached
//! their ttl, and reports what happened. Nothing is remembered between
//! passes; the next pass re-evaluates from a fresh listing, so a partially
//! failed pass simply retries the survivors.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::Serialize;

use crate::{
    config::{BoxkeeperConfig, DEFAULT_PROVIDER_RETRY_ATTEMPTS},
    inventory::BoxInventory,
    provider::ComputeProvider,
    utils::retry_on_transient,
    BoxkeeperError, BoxkeeperResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The outcome of one reaping pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReapReport {
    /// The instance ids terminated this pass.
    pub reaped: Vec<String>,

    /// The instance ids whose termination failed, with the error text.
    pub failed: Vec<(String, String)>,
}

/// Terminates boxes whose time-to-live has elapsed.
pub struct Reaper {
    /// The compute provider terminations are issued against.
    provider: Arc<dyn ComputeProvider>,

    /// The inventory listed at the start of every pass.
    inventory: BoxInventory,

    /// The ttl applied to boxes without a parsable ttl tag.
    default_ttl: TimeDelta,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ReapReport {
    /// Whether every expired box was terminated.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Folds a partially failed pass into a [`BoxkeeperError::PartialFailure`].
    pub fn into_result(self) -> BoxkeeperResult<Vec<String>> {
        if self.failed.is_empty() {
            Ok(self.reaped)
        } else {
            Err(BoxkeeperError::PartialFailure {
                succeeded: self.reaped,
                failed: self.failed.into_iter().map(|(id, _)| id).collect(),
            })
        }
    }
}

impl Reaper {
    /// Creates a reaper over the given provider and configuration.
    pub fn new(provider: Arc<dyn ComputeProvider>, config: &BoxkeeperConfig) -> Self {
        let inventory = BoxInventory::new(provider.clone());
        Self {
            provider,
            inventory,
            default_ttl: config.default_ttl(),
        }
    }

    /// Runs one reconciliation pass over every managed box, regardless of owner.
    ///
    /// The expiry threshold is inclusive, and a box without a parsable ttl tag
    /// is aged against the default ttl rather than skipped, so tag corruption
    /// cannot leak an instance forever. A single box's termination failure is
    /// recorded and the pass continues through the remaining candidates.
    pub async fn reap(&self) -> BoxkeeperResult<ReapReport> {
        let now = Utc::now();
        let boxes = self.inventory.list_boxes(None).await?;
        let candidates = boxes.len();
        let mut report = ReapReport::default();

        for lease in boxes {
            if !lease.is_expired(now, self.default_ttl) {
                continue;
            }

            let instance_id = lease.get_instance_id().clone();
            tracing::info!(
                "reaping box {} owned by {} aged {}",
                instance_id,
                lease.get_owner(),
                lease.age(now)
            );

            match retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
                self.provider.terminate_instance(&instance_id)
            })
            .await
            {
                Ok(()) => report.reaped.push(instance_id),
                Err(BoxkeeperError::Provider(e)) if e.is_instance_missing() => {
                    // Someone deleted it between the listing and the
                    // terminate call; it is gone either way.
                    tracing::debug!("box {} disappeared before reaping", instance_id);
                    report.reaped.push(instance_id);
                }
                Err(e) => {
                    tracing::warn!("failed to reap box {}: {}", instance_id, e);
                    report.failed.push((instance_id, e.to_string()));
                }
            }
        }

        tracing::info!(
            "reap pass complete: {} candidates, {} reaped, {} failed",
            candidates,
            report.reaped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TTL_SECS;
    use crate::inventory::tags::TAG_TTL;
    use crate::provider::mock::{managed_instance, throttling_error, MockComputeProvider};

    fn reaper_over(provider: Arc<MockComputeProvider>) -> Reaper {
        let config = BoxkeeperConfig::builder()
            .provider_endpoint("https://compute.example.test")
            .build();
        Reaper::new(provider, &config)
    }

    #[test_log::test(tokio::test)]
    async fn test_reap_terminates_only_expired_boxes() {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_instance(managed_instance(
            "i-old",
            "alice",
            "old",
            "ubuntu-20",
            Utc::now() - TimeDelta::hours(2),
            Some(3600),
        ));
        provider.push_instance(managed_instance(
            "i-fresh",
            "bob",
            "fresh",
            "ubuntu-20",
            Utc::now(),
            Some(3600),
        ));

        let report = reaper_over(provider.clone()).reap().await.unwrap();
        assert_eq!(report.reaped, vec!["i-old".to_string()]);
        assert!(report.is_clean());
        assert!(provider.instance("i-fresh").is_some());
        assert_eq!(provider.terminate_calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_reap_applies_default_ttl_to_untagged_and_malformed_boxes() {
        let provider = Arc::new(MockComputeProvider::new());
        let old = Utc::now() - TimeDelta::seconds(DEFAULT_TTL_SECS + 60);
        provider.push_instance(managed_instance(
            "i-untagged", "alice", "untagged", "ubuntu-20", old, None,
        ));
        let mut corrupted = managed_instance(
            "i-corrupted", "bob", "corrupted", "ubuntu-20", old, None,
        );
        corrupted
            .tags
            .insert(TAG_TTL.to_string(), "soon".to_string());
        provider.push_instance(corrupted);
        provider.push_instance(managed_instance(
            "i-young",
            "carol",
            "young",
            "ubuntu-20",
            Utc::now() - TimeDelta::hours(1),
            None,
        ));

        let mut report = reaper_over(provider).reap().await.unwrap();
        report.reaped.sort();
        assert_eq!(
            report.reaped,
            vec!["i-corrupted".to_string(), "i-untagged".to_string()]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_reap_is_idempotent() {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_instance(managed_instance(
            "i-old",
            "alice",
            "old",
            "ubuntu-20",
            Utc::now() - TimeDelta::hours(5),
            Some(3600),
        ));

        let reaper = reaper_over(provider);
        let first = reaper.reap().await.unwrap();
        assert_eq!(first.reaped, vec!["i-old".to_string()]);

        // The terminated box has fallen out of the listing; nothing is left.
        let second = reaper.reap().await.unwrap();
        assert!(second.reaped.is_empty());
        assert!(second.is_clean());
    }

    #[test_log::test(tokio::test)]
    async fn test_reap_records_failures_and_continues() {
        let provider = Arc::new(MockComputeProvider::new());
        let old = Utc::now() - TimeDelta::hours(5);
        for id in ["i-a", "i-b", "i-c"] {
            provider.push_instance(managed_instance(
                id, "alice", id, "ubuntu-20", old, Some(3600),
            ));
        }
        // The second box throttles until retries are exhausted.
        for _ in 0..DEFAULT_PROVIDER_RETRY_ATTEMPTS {
            provider.fail_terminate("i-b", throttling_error());
        }

        let report = reaper_over(provider.clone()).reap().await.unwrap();
        assert_eq!(report.reaped, vec!["i-a".to_string(), "i-c".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "i-b");

        match report.into_result() {
            Err(BoxkeeperError::PartialFailure { succeeded, failed }) => {
                assert_eq!(succeeded.len(), 2);
                assert_eq!(failed, vec!["i-b".to_string()]);
            }
            other => panic!("expected PartialFailure, got {:?}", other),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_reap_retries_transient_terminate_failures() {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_instance(managed_instance(
            "i-old",
            "alice",
            "old",
            "ubuntu-20",
            Utc::now() - TimeDelta::hours(5),
            Some(3600),
        ));
        // One throttle, then the retry succeeds.
        provider.fail_terminate("i-old", throttling_error());

        let report = reaper_over(provider.clone()).reap().await.unwrap();
        assert_eq!(report.reaped, vec!["i-old".to_string()]);
        assert_eq!(provider.terminate_calls(), 2);
    }
}
