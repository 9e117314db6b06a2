//! REST client for a compute provider API.
//!
//! This is the production [`ComputeProvider`] implementation. It talks to a
//! provider gateway over HTTPS with a bearer token, retrying transport-level
//! transient failures (connection resets, 5xx) through retry middleware.
//! Application-level retry policy stays with the callers, which know whether a
//! given call is safe to re-issue.

use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::BoxkeeperResult;

use super::{
    ComputeProvider, Filter, KeyPairInfo, ProviderApiError, ProviderInstance, RunInstanceSpec,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A compute provider client speaking the provider's REST API.
pub struct RestComputeProvider {
    /// The HTTP client used to communicate with the provider gateway.
    client: ClientWithMiddleware,

    /// The base URL of the provider gateway.
    base_url: String,

    /// The bearer token presented on every request.
    auth_token: Option<String>,
}

/// The body of a describe-instances request.
#[derive(Debug, Serialize)]
struct DescribeInstancesRequest<'a> {
    filters: &'a [Filter],
}

/// The body of an import-key-pair request.
#[derive(Debug, Serialize)]
struct ImportKeyPairRequest<'a> {
    name: &'a str,
    public_key_material: &'a str,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    instances: Vec<ProviderInstance>,
}

#[derive(Debug, Deserialize)]
struct InstanceResponse {
    instance: ProviderInstance,
}

#[derive(Debug, Deserialize)]
struct KeyPairsResponse {
    key_pairs: Vec<KeyPairInfo>,
}

#[derive(Debug, Deserialize)]
struct KeyPairResponse {
    key_pair: KeyPairInfo,
}

/// The error body the provider gateway returns alongside a non-2xx status.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    code: String,
    message: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RestComputeProvider {
    /// Creates a new REST provider client for the given gateway endpoint.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client_builder = ClientBuilder::new(Client::new());
        let client = client_builder
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Executes a request and deserializes the success body, converting a
    /// non-2xx response into a [`ProviderApiError`] that preserves the
    /// provider's own code and message.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> BoxkeeperResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        Err(error_from_response(status, response.text().await.ok()).into())
    }

    /// Executes a request whose success response carries no body.
    async fn execute_empty(&self, request: RequestBuilder) -> BoxkeeperResult<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(error_from_response(status, response.text().await.ok()).into())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a [`ProviderApiError`] from a non-2xx response, falling back to the
/// raw body text when the gateway did not return a structured error.
fn error_from_response(status: StatusCode, body: Option<String>) -> ProviderApiError {
    let transient = is_transient_status(status);
    match body
        .as_deref()
        .and_then(|text| serde_json::from_str::<ProviderErrorBody>(text).ok())
    {
        Some(parsed) => ProviderApiError {
            code: parsed.code,
            message: parsed.message,
            transient,
        },
        None => ProviderApiError {
            code: format!("Http{}", status.as_u16()),
            message: body.unwrap_or_default(),
            transient,
        },
    }
}

/// Whether an HTTP status indicates the request was rejected without any state
/// change and is safe to retry.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ComputeProvider for RestComputeProvider {
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> BoxkeeperResult<Vec<ProviderInstance>> {
        let response: InstancesResponse = self
            .execute(
                self.post("/instances/describe")
                    .json(&DescribeInstancesRequest { filters }),
            )
            .await?;
        Ok(response.instances)
    }

    async fn run_instance(&self, spec: &RunInstanceSpec) -> BoxkeeperResult<ProviderInstance> {
        let response: InstanceResponse = self.execute(self.post("/instances/run").json(spec)).await?;
        Ok(response.instance)
    }

    async fn terminate_instance(&self, instance_id: &str) -> BoxkeeperResult<()> {
        self.execute_empty(self.post(&format!("/instances/{}/terminate", instance_id)))
            .await
    }

    async fn reboot_instance(&self, instance_id: &str) -> BoxkeeperResult<()> {
        self.execute_empty(self.post(&format!("/instances/{}/reboot", instance_id)))
            .await
    }

    async fn describe_key_pairs(&self) -> BoxkeeperResult<Vec<KeyPairInfo>> {
        let response: KeyPairsResponse = self.execute(self.get("/key-pairs")).await?;
        Ok(response.key_pairs)
    }

    async fn import_key_pair(
        &self,
        name: &str,
        public_key_material: &str,
    ) -> BoxkeeperResult<KeyPairInfo> {
        let response: KeyPairResponse = self
            .execute(self.post("/key-pairs").json(&ImportKeyPairRequest {
                name,
                public_key_material,
            }))
            .await?;
        Ok(response.key_pair)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_response_preserves_provider_detail() {
        let body = r#"{"code": "InstanceLimitExceeded", "message": "quota reached"}"#;
        let err = error_from_response(StatusCode::BAD_REQUEST, Some(body.to_string()));
        assert_eq!(err.code, "InstanceLimitExceeded");
        assert_eq!(err.message, "quota reached");
        assert!(!err.transient);
    }

    #[test]
    fn test_error_from_response_classifies_throttling_as_transient() {
        let body = r#"{"code": "RequestLimitExceeded", "message": "slow down"}"#;
        let err = error_from_response(StatusCode::TOO_MANY_REQUESTS, Some(body.to_string()));
        assert!(err.transient);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_from_response_with_unstructured_body() {
        let err = error_from_response(StatusCode::BAD_GATEWAY, Some("upstream sad".to_string()));
        assert_eq!(err.code, "Http502");
        assert_eq!(err.message, "upstream sad");
        assert!(err.transient);
    }
}
