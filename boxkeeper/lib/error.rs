use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

use crate::provider::ProviderApiError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a boxkeeper-related operation.
pub type BoxkeeperResult<T> = Result<T, BoxkeeperError>;

/// An error that occurred during a box lifecycle operation.
#[derive(Debug, Error)]
pub enum BoxkeeperError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error returned by the compute provider, with the provider's own
    /// diagnostic detail preserved.
    #[error("compute provider error: {0}")]
    Provider(#[from] ProviderApiError),

    /// An error that occurred when an image alias was not present in the alias table.
    #[error("unknown image alias: {0}")]
    UnknownAlias(String),

    /// An error that occurred when no key pair exists for an owner and no key material was supplied.
    #[error("no key material available for owner: {0}")]
    MissingKeyMaterial(String),

    /// An error that occurred when supplied key material is not an RSA public key.
    #[error("unsupported key type: {0}, only RSA key material can be imported")]
    UnsupportedKeyType(String),

    /// An error that occurred when a box could not be found.
    #[error("box not found: {0}")]
    NotFound(String),

    /// An error that occurred when a caller attempted to mutate a box it does not own.
    #[error("box is not owned by caller: {0}")]
    Forbidden(String),

    /// An error that occurred when a box was created provider-side but a later step failed.
    /// Carries the created instance id so the caller can retry deletion instead of
    /// losing track of a running resource.
    #[error("box creation incomplete for instance {instance_id}: {reason}")]
    CreateIncomplete {
        /// The id of the instance the provider reported as created.
        instance_id: String,

        /// What went wrong after the create call.
        reason: String,
    },

    /// An error that occurred when a batch operation partially failed.
    #[error("partial failure: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialFailure {
        /// The instance ids the operation succeeded for.
        succeeded: Vec<String>,

        /// The instance ids the operation failed for.
        failed: Vec<String>,
    },

    /// An error that occurred when a JSON (de)serialization operation failed.
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error that occurred when a YAML (de)serialization operation failed.
    #[error("serde yaml error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    /// Errors collected while validating a boxkeeper configuration.
    #[error("config validation errors: {}", .0.join(", "))]
    ConfigValidationErrors(Vec<String>),

    /// An error that occurred when an instance's tag set could not be parsed into a box record.
    #[error("malformed box tags: {0}")]
    MalformedTags(#[from] TagParseError),
}

/// An error that occurred when parsing a provider instance's tag set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagParseError {
    /// The owner tag is missing or empty.
    #[error("owner tag is missing or empty")]
    MissingOwner,

    /// The created-at tag is missing.
    #[error("created-at tag is missing")]
    MissingCreatedAt,

    /// The created-at tag could not be parsed as an epoch timestamp.
    #[error("invalid created-at tag: {0}")]
    InvalidCreatedAt(String),

    /// The ttl tag could not be parsed as a number of seconds.
    #[error("invalid ttl tag: {0}")]
    InvalidTtl(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxkeeperError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> BoxkeeperError {
        BoxkeeperError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `BoxkeeperResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> BoxkeeperResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
