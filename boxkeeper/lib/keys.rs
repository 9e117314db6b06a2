//! SSH key material management.
//!
//! Ensures a usable key pair exists for a user before their first box is
//! launched. Key pair names are derived deterministically from the owner's
//! identity and matched case-insensitively against the provider, so owners
//! cannot end up with duplicate imports differing only in casing.

use std::sync::Arc;

use crate::{
    config::DEFAULT_PROVIDER_RETRY_ATTEMPTS, provider::ComputeProvider, utils::retry_on_transient,
    BoxkeeperError, BoxkeeperResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The only key algorithm the provider import path accepts.
const RSA_KEY_TYPE: &str = "ssh-rsa";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Ensures SSH key pairs exist provider-side for box owners.
pub struct KeyMaterialManager {
    /// The compute provider key pairs are listed from and imported into.
    provider: Arc<dyn ComputeProvider>,

    /// The prefix prepended to an owner's identity to form their key pair name.
    key_name_prefix: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KeyMaterialManager {
    /// Creates a key material manager.
    pub fn new(provider: Arc<dyn ComputeProvider>, key_name_prefix: impl Into<String>) -> Self {
        Self {
            provider,
            key_name_prefix: key_name_prefix.into(),
        }
    }

    /// The deterministic key pair name for an owner.
    pub fn key_pair_name(&self, owner: &str) -> String {
        format!("{}{}", self.key_name_prefix, owner)
    }

    /// Ensures a key pair exists for `owner`, returning its provider-side name.
    ///
    /// An existing pair whose name matches case-insensitively is reused as-is.
    /// Otherwise the supplied public key material is imported; only RSA
    /// material is accepted, so a provider-side import rejection never has to
    /// surface as an opaque failure. Idempotent across repeated calls once the
    /// pair exists.
    pub async fn ensure_key_pair(
        &self,
        owner: &str,
        public_key_material: Option<&str>,
    ) -> BoxkeeperResult<String> {
        let desired = self.key_pair_name(owner);

        let existing = retry_on_transient(DEFAULT_PROVIDER_RETRY_ATTEMPTS, || {
            self.provider.describe_key_pairs()
        })
        .await?;
        if let Some(pair) = existing
            .iter()
            .find(|p| p.get_name().eq_ignore_ascii_case(&desired))
        {
            tracing::debug!(
                "reusing existing key pair {} for owner {}",
                pair.get_name(),
                owner
            );
            return Ok(pair.get_name().clone());
        }

        let material = public_key_material
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| BoxkeeperError::MissingKeyMaterial(owner.to_string()))?;

        let algorithm = material.split_whitespace().next().unwrap_or_default();
        if algorithm != RSA_KEY_TYPE {
            return Err(BoxkeeperError::UnsupportedKeyType(algorithm.to_string()));
        }

        let imported = self.provider.import_key_pair(&desired, material).await?;
        tracing::debug!("imported public key material for owner {}", owner);
        Ok(imported.get_name().clone())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockComputeProvider;

    const PUBKEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABgQDf alice@example";

    #[tokio::test]
    async fn test_import_on_first_use_then_reuse() {
        let provider = Arc::new(MockComputeProvider::new());
        let manager = KeyMaterialManager::new(provider.clone(), "boxkeeper-");

        let name = manager
            .ensure_key_pair("alice", Some(PUBKEY))
            .await
            .unwrap();
        assert_eq!(name, "boxkeeper-alice");
        assert_eq!(provider.import_calls(), 1);

        // A second call finds the pair and does not import again.
        let name = manager
            .ensure_key_pair("alice", Some(PUBKEY))
            .await
            .unwrap();
        assert_eq!(name, "boxkeeper-alice");
        assert_eq!(provider.import_calls(), 1);
    }

    #[tokio::test]
    async fn test_reuses_existing_pair_case_insensitively() {
        let provider = Arc::new(MockComputeProvider::new());
        provider.push_key_pair("Boxkeeper-ALICE");
        let manager = KeyMaterialManager::new(provider.clone(), "boxkeeper-");

        let name = manager.ensure_key_pair("alice", None).await.unwrap();
        assert_eq!(name, "Boxkeeper-ALICE");
        assert_eq!(provider.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_material() {
        let provider = Arc::new(MockComputeProvider::new());
        let manager = KeyMaterialManager::new(provider.clone(), "boxkeeper-");

        for material in [None, Some(""), Some("   ")] {
            match manager.ensure_key_pair("alice", material).await {
                Err(BoxkeeperError::MissingKeyMaterial(owner)) => assert_eq!(owner, "alice"),
                other => panic!("expected MissingKeyMaterial, got {:?}", other),
            }
        }
        assert_eq!(provider.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_rsa_material() {
        let provider = Arc::new(MockComputeProvider::new());
        let manager = KeyMaterialManager::new(provider.clone(), "boxkeeper-");

        let material = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIDf alice@example";
        match manager.ensure_key_pair("alice", Some(material)).await {
            Err(BoxkeeperError::UnsupportedKeyType(algorithm)) => {
                assert_eq!(algorithm, "ssh-ed25519");
            }
            other => panic!("expected UnsupportedKeyType, got {:?}", other),
        }
        assert_eq!(provider.import_calls(), 0);
    }
}
