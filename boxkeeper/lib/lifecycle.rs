//! The write path of the box lifecycle.
//!
//! Creates boxes from image aliases and performs owner-scoped delete and
//! reboot. Every mutation re-verifies ownership against freshly fetched
//! provider state, never against a caller-supplied claim, to close the gap
//! between authentication and the mutating call.

use std::{collections::HashMap, sync::Arc};

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use crate::{
    alias::ImageAliasResolver,
    config::{BoxkeeperConfig, DEFAULT_PROVIDER_RETRY_ATTEMPTS},
    inventory::{
        tags::{
            self, MANAGED_TAG_VALUE, TAG_CREATED_AT, TAG_IMAGE_ALIAS, TAG_MANAGED, TAG_NAME,
            TAG_TTL, TAG_USER,
        },
        BoxInventory, BoxLease,
    },
    keys::KeyMaterialManager,
    provider::{ComputeProvider, RunInstanceSpec},
    utils::retry_on_transient,
    BoxkeeperError, BoxkeeperResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The prefix of generated box display names.
const BOX_NAME_PREFIX: &str = "boxkeeper";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Creates, deletes and reboots boxes on behalf of authenticated owners.
pub struct LifecycleController {
    /// The compute provider mutations are issued against.
    provider: Arc<dyn ComputeProvider>,

    /// The boxkeeper configuration.
    config: BoxkeeperConfig,

    /// The image alias table.
    resolver: ImageAliasResolver,

    /// The key material manager consulted before the first launch per owner.
    keys: KeyMaterialManager,

    /// The inventory used for fresh-state lookups.
    inventory: BoxInventory,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LifecycleController {
    /// Creates a lifecycle controller over the given provider and configuration.
    pub fn new(provider: Arc<dyn ComputeProvider>, config: BoxkeeperConfig) -> Self {
        let resolver = ImageAliasResolver::from_config(&config);
        let keys = KeyMaterialManager::new(provider.clone(), config.get_key_name_prefix().clone());
        let inventory = BoxInventory::new(provider.clone());
        Self {
            provider,
            config,
            resolver,
            keys,
            inventory,
        }
    }

    /// The inventory, for the read path.
    pub fn inventory(&self) -> &BoxInventory {
        &self.inventory
    }

    /// The image alias resolver, for display.
    pub fn resolver(&self) -> &ImageAliasResolver {
        &self.resolver
    }

    /// Creates a box for `owner` from the named image alias.
    ///
    /// Alias resolution and key pair setup both happen before the provider
    /// run call, so their failures leave no cloud-side effect. The run call
    /// itself is issued exactly once; it carries a client token so a
    /// transport-level retry cannot double-provision. If a step after the run
    /// call fails, the error reports the created instance id rather than
    /// silently losing track of a running resource.
    pub async fn create(
        &self,
        owner: &str,
        alias: &str,
        ttl: Option<TimeDelta>,
        key_material: Option<&str>,
    ) -> BoxkeeperResult<BoxLease> {
        let image_id = self.resolver.resolve(alias)?.to_string();
        let key_name = self.keys.ensure_key_pair(owner, key_material).await?;
        let name = format!("{}-{}-{}", BOX_NAME_PREFIX, owner, alias);

        // An owner re-requesting a live alias gets their existing box back
        // instead of a second instance.
        if let Some(existing) = self
            .inventory
            .list_boxes(Some(owner))
            .await?
            .into_iter()
            .find(|lease| lease.get_name().as_deref() == Some(name.as_str()))
        {
            tracing::info!("box {} already exists for owner {}", name, owner);
            return Ok(existing);
        }

        let created_at = Utc::now();
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let box_tags = HashMap::from([
            (TAG_NAME.to_string(), name),
            (TAG_MANAGED.to_string(), MANAGED_TAG_VALUE.to_string()),
            (TAG_USER.to_string(), owner.to_string()),
            (TAG_CREATED_AT.to_string(), tags::epoch_string(created_at)),
            (TAG_IMAGE_ALIAS.to_string(), alias.to_string()),
            (TAG_TTL.to_string(), ttl.num_seconds().to_string()),
        ]);

        let spec = RunInstanceSpec::builder()
            .image_id(image_id)
            .instance_type(self.config.get_default_instance_type())
            .key_name(key_name)
            .client_token(Uuid::new_v4().to_string())
            .tags(box_tags)
            .build();

        let instance = self.provider.run_instance(&spec).await?;
        tracing::info!(
            "created box {} for owner {} from alias {}",
            instance.get_instance_id(),
            owner,
            alias
        );

        BoxLease::from_instance(&instance).map_err(|e| BoxkeeperError::CreateIncomplete {
            instance_id: instance.get_instance_id().clone(),
            reason: e.to_string(),
        })
    }

    /// Terminates a box owned by `owner`.
    ///
    /// A box that disappears between the ownership check and the terminate
    /// call (the reaper got there first) is treated as already deleted.
    pub async fn delete(&self, owner: &str, instance_id: &str) -> BoxkeeperResult<()> {
        let lease = self.require_owned(owner, instance_id).await?;

        match retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
            self.provider.terminate_instance(lease.get_instance_id())
        })
        .await
        {
            Err(BoxkeeperError::Provider(e)) if e.is_instance_missing() => {
                tracing::debug!("box {} already gone, nothing to terminate", instance_id);
                Ok(())
            }
            Err(e) => Err(e),
            _ => {
                tracing::info!("terminated box {} for owner {}", instance_id, owner);
                Ok(())
            }
        }
    }

    /// Reboots a box owned by `owner`.
    pub async fn reboot(&self, owner: &str, instance_id: &str) -> BoxkeeperResult<()> {
        self.require_owned(owner, instance_id).await?;

        match retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
            self.provider.reboot_instance(instance_id)
        })
        .await
        {
            Err(BoxkeeperError::Provider(e)) if e.is_instance_missing() => {
                Err(BoxkeeperError::NotFound(instance_id.to_string()))
            }
            Err(e) => Err(e),
            _ => {
                tracing::info!("rebooted box {} for owner {}", instance_id, owner);
                Ok(())
            }
        }
    }

    /// Fetches the box fresh from the provider and checks ownership.
    async fn require_owned(&self, owner: &str, instance_id: &str) -> BoxkeeperResult<BoxLease> {
        let lease = self
            .inventory
            .get_box(instance_id)
            .await?
            .ok_or_else(|| BoxkeeperError::NotFound(instance_id.to_string()))?;
        authorize_owner(owner, &lease)?;
        Ok(lease)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The single authorization predicate shared by every mutating operation.
///
/// The comparison is exact and case-sensitive: ownership is not an identity a
/// caller can spoof through casing, unlike key pair naming.
fn authorize_owner(requester: &str, lease: &BoxLease) -> BoxkeeperResult<()> {
    if lease.get_owner() == requester {
        Ok(())
    } else {
        Err(BoxkeeperError::Forbidden(lease.get_instance_id().clone()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
