use crate::BoxkeeperResult;

use super::{Filter, KeyPairInfo, ProviderInstance, RunInstanceSpec};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Trait defining the calls boxkeeper makes against a compute provider.
///
/// The provider's tag-queryable inventory is the sole source of truth for box
/// state; implementations must never cache listings across calls. Mutating
/// calls (`run_instance`, `terminate_instance`) are expected to be idempotent
/// at the provider, keyed by client token or instance id.
#[async_trait::async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Lists instances matching all of the given filters.
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> BoxkeeperResult<Vec<ProviderInstance>>;

    /// Launches a single instance according to the given spec and returns the
    /// provider's view of it.
    async fn run_instance(&self, spec: &RunInstanceSpec) -> BoxkeeperResult<ProviderInstance>;

    /// Terminates the given instance.
    async fn terminate_instance(&self, instance_id: &str) -> BoxkeeperResult<()>;

    /// Reboots the given instance.
    async fn reboot_instance(&self, instance_id: &str) -> BoxkeeperResult<()>;

    /// Lists all key pairs known to the provider.
    async fn describe_key_pairs(&self) -> BoxkeeperResult<Vec<KeyPairInfo>>;

    /// Imports public key material under the given key pair name.
    async fn import_key_pair(
        &self,
        name: &str,
        public_key_material: &str,
    ) -> BoxkeeperResult<KeyPairInfo>;
}
