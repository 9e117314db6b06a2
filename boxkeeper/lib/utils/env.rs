use std::env;

use crate::config::BoxkeeperConfig;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the provider gateway endpoint.
pub const BOXKEEPER_PROVIDER_ENDPOINT_ENV_VAR: &str = "BOXKEEPER_PROVIDER_ENDPOINT";

/// Environment variable holding the provider gateway bearer token.
pub const BOXKEEPER_PROVIDER_TOKEN_ENV_VAR: &str = "BOXKEEPER_PROVIDER_TOKEN";

/// Environment variable overriding the default box ttl in seconds.
pub const BOXKEEPER_DEFAULT_TTL_ENV_VAR: &str = "BOXKEEPER_DEFAULT_TTL_SECS";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Applies `BOXKEEPER_*` environment overrides on top of a loaded configuration.
///
/// The token in particular is expected to come from the environment rather
/// than the config file.
pub fn apply_env_overrides(config: &mut BoxkeeperConfig) {
    if let Ok(endpoint) = env::var(BOXKEEPER_PROVIDER_ENDPOINT_ENV_VAR) {
        config.provider_endpoint = endpoint;
    }

    if let Ok(token) = env::var(BOXKEEPER_PROVIDER_TOKEN_ENV_VAR) {
        config.provider_token = Some(token);
    }

    if let Ok(ttl) = env::var(BOXKEEPER_DEFAULT_TTL_ENV_VAR) {
        match ttl.parse::<i64>() {
            Ok(secs) => config.default_ttl_secs = secs,
            Err(_) => {
                tracing::warn!(
                    "{} is not a number of seconds, ignoring: {}",
                    BOXKEEPER_DEFAULT_TTL_ENV_VAR,
                    ttl
                );
            }
        }
    }
}
