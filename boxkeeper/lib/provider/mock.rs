//! In-memory compute provider used by tests.
//!
//! Interprets the same filter grammar as the real provider so inventory and
//! lifecycle code paths run unmodified. Supports injecting per-instance
//! terminate failures and counts mutating calls so tests can assert on exact
//! provider traffic.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, Utc};

use crate::{
    inventory::tags::{
        epoch_string, MANAGED_TAG_VALUE, TAG_CREATED_AT, TAG_IMAGE_ALIAS, TAG_MANAGED, TAG_NAME,
        TAG_TTL, TAG_USER,
    },
    BoxkeeperResult,
};

use super::{
    ComputeProvider, Filter, InstanceState, KeyPairInfo, ProviderApiError, ProviderInstance,
    RunInstanceSpec,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockComputeProvider {
    instances: Mutex<Vec<ProviderInstance>>,
    key_pairs: Mutex<Vec<KeyPairInfo>>,
    terminate_failures: Mutex<HashMap<String, VecDeque<ProviderApiError>>>,
    run_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
    reboot_calls: AtomicUsize,
    import_calls: AtomicUsize,
    next_id: AtomicUsize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MockComputeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_instance(&self, instance: ProviderInstance) {
        self.instances.lock().unwrap().push(instance);
    }

    pub(crate) fn push_key_pair(&self, name: &str) {
        self.key_pairs.lock().unwrap().push(KeyPairInfo {
            name: name.to_string(),
            fingerprint: Some("SHA256:mockfingerprint".to_string()),
        });
    }

    /// Queues an error to be returned by the next terminate call for `instance_id`.
    pub(crate) fn fail_terminate(&self, instance_id: &str, error: ProviderApiError) {
        self.terminate_failures
            .lock()
            .unwrap()
            .entry(instance_id.to_string())
            .or_default()
            .push_back(error);
    }

    pub(crate) fn instance(&self, instance_id: &str) -> Option<ProviderInstance> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.instance_id == instance_id)
            .cloned()
    }

    pub(crate) fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reboot_calls(&self) -> usize {
        self.reboot_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a provider instance carrying the full boxkeeper tag set.
pub(crate) fn managed_instance(
    instance_id: &str,
    owner: &str,
    name: &str,
    image_alias: &str,
    created_at: DateTime<Utc>,
    ttl_secs: Option<i64>,
) -> ProviderInstance {
    let mut tags = HashMap::from([
        (TAG_MANAGED.to_string(), MANAGED_TAG_VALUE.to_string()),
        (TAG_USER.to_string(), owner.to_string()),
        (TAG_CREATED_AT.to_string(), epoch_string(created_at)),
        (TAG_IMAGE_ALIAS.to_string(), image_alias.to_string()),
        (TAG_NAME.to_string(), name.to_string()),
    ]);
    if let Some(secs) = ttl_secs {
        tags.insert(TAG_TTL.to_string(), secs.to_string());
    }

    ProviderInstance {
        instance_id: instance_id.to_string(),
        image_id: "ami-fafafafa".to_string(),
        instance_type: "t3.small".to_string(),
        state: InstanceState::Running,
        public_ip: None,
        public_dns_name: None,
        tags,
    }
}

pub(crate) fn instance_missing_error(instance_id: &str) -> ProviderApiError {
    ProviderApiError {
        code: "InvalidInstanceID.NotFound".to_string(),
        message: format!("the instance id '{}' does not exist", instance_id),
        transient: false,
    }
}

pub(crate) fn throttling_error() -> ProviderApiError {
    ProviderApiError {
        code: "Throttling".to_string(),
        message: "rate exceeded".to_string(),
        transient: true,
    }
}

fn matches_filters(instance: &ProviderInstance, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter.name.as_str() {
        "instance-state-name" => filter.values.contains(&instance.state.to_string()),
        "instance-id" => filter.values.contains(&instance.instance_id),
        "tag-key" => filter.values.iter().any(|k| instance.tags.contains_key(k)),
        name => match name.strip_prefix("tag:") {
            Some(key) => instance
                .tags
                .get(key)
                .is_some_and(|v| filter.values.contains(v)),
            None => panic!("unsupported mock filter: {}", name),
        },
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ComputeProvider for MockComputeProvider {
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> BoxkeeperResult<Vec<ProviderInstance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| matches_filters(i, filters))
            .cloned()
            .collect())
    }

    async fn run_instance(&self, spec: &RunInstanceSpec) -> BoxkeeperResult<ProviderInstance> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let instance = ProviderInstance {
            instance_id: format!("i-mock{:04}", seq),
            image_id: spec.image_id.clone(),
            instance_type: spec.instance_type.clone(),
            state: InstanceState::Pending,
            public_ip: None,
            public_dns_name: None,
            tags: spec.tags.clone(),
        };
        self.instances.lock().unwrap().push(instance.clone());
        Ok(instance)
    }

    async fn terminate_instance(&self, instance_id: &str) -> BoxkeeperResult<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .terminate_failures
            .lock()
            .unwrap()
            .get_mut(instance_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error.into());
        }

        let mut instances = self.instances.lock().unwrap();
        match instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
        {
            Some(instance) => {
                instance.state = InstanceState::Terminated;
                Ok(())
            }
            None => Err(instance_missing_error(instance_id).into()),
        }
    }

    async fn reboot_instance(&self, instance_id: &str) -> BoxkeeperResult<()> {
        self.reboot_calls.fetch_add(1, Ordering::SeqCst);
        let instances = self.instances.lock().unwrap();
        match instances.iter().find(|i| i.instance_id == instance_id) {
            Some(_) => Ok(()),
            None => Err(instance_missing_error(instance_id).into()),
        }
    }

    async fn describe_key_pairs(&self) -> BoxkeeperResult<Vec<KeyPairInfo>> {
        Ok(self.key_pairs.lock().unwrap().clone())
    }

    async fn import_key_pair(
        &self,
        name: &str,
        _public_key_material: &str,
    ) -> BoxkeeperResult<KeyPairInfo> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        let key_pair = KeyPairInfo {
            name: name.to_string(),
            fingerprint: Some("SHA256:mockfingerprint".to_string()),
        };
        self.key_pairs.lock().unwrap().push(key_pair.clone());
        Ok(key_pair)
    }
}
