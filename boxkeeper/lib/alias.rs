//! Image alias resolution.
//!
//! Maps human-chosen names to concrete boot image ids. The table is managed
//! out-of-band and read into memory at startup; resolution has no side
//! effects and is always consulted before any provider run-instance call.

use std::collections::HashMap;

use crate::{config::BoxkeeperConfig, BoxkeeperError, BoxkeeperResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Resolves image aliases to boot image ids.
pub struct ImageAliasResolver {
    /// The alias table.
    aliases: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageAliasResolver {
    /// Creates a resolver over the given alias table.
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Creates a resolver from the alias table in a configuration.
    pub fn from_config(config: &BoxkeeperConfig) -> Self {
        Self::new(config.get_image_aliases().clone())
    }

    /// Resolves an alias to its image id.
    pub fn resolve(&self, alias: &str) -> BoxkeeperResult<&str> {
        self.aliases
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| BoxkeeperError::UnknownAlias(alias.to_string()))
    }

    /// The full alias table, for display.
    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_alias() {
        let resolver = ImageAliasResolver::new(HashMap::from([(
            "ubuntu-20".to_string(),
            "ami-0aabbccdd".to_string(),
        )]));
        assert_eq!(resolver.resolve("ubuntu-20").unwrap(), "ami-0aabbccdd");
    }

    #[test]
    fn test_resolve_unknown_alias() {
        let resolver = ImageAliasResolver::new(HashMap::new());
        match resolver.resolve("bad-alias") {
            Err(BoxkeeperError::UnknownAlias(alias)) => assert_eq!(alias, "bad-alias"),
            other => panic!("expected UnknownAlias, got {:?}", other),
        }
    }
}
