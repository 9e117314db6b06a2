//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default time-to-live applied to boxes created without an explicit ttl,
/// and to boxes whose ttl tag is missing or malformed.
pub const DEFAULT_TTL_SECS: i64 = 4 * 60 * 60;

/// The default instance type boxes are launched as.
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.small";

/// The prefix prepended to an owner's identity to form their key pair name.
pub const DEFAULT_KEY_NAME_PREFIX: &str = "boxkeeper-";

/// The default interval between reaping passes.
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 600;

/// How many times a transient-classified provider call is attempted before
/// the error surfaces.
pub const DEFAULT_PROVIDER_RETRY_ATTEMPTS: u32 = 3;

/// The default boxkeeper config filename.
pub const DEFAULT_CONFIG_FILENAME: &str = "boxkeeper.yaml";
