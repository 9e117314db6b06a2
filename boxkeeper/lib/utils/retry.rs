use std::{future::Future, time::Duration};

use crate::{BoxkeeperError, BoxkeeperResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Base delay before the first retry; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs `operation` up to `max_attempts` times, backing off between attempts.
///
/// Only provider errors classified as transient are retried; a transient
/// rejection (throttling) means the provider refused the request before acting
/// on it, so re-issuing cannot double-apply a mutation. Every other error
/// surfaces immediately.
pub async fn retry_on_transient<T, F, Fut>(max_attempts: u32, mut operation: F) -> BoxkeeperResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BoxkeeperResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(BoxkeeperError::Provider(e)) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                tracing::debug!(
                    "transient provider error ({}), retrying in {:?}: {}",
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient_error() -> BoxkeeperError {
        ProviderApiError {
            code: "Throttling".to_string(),
            message: "rate exceeded".to_string(),
            transient: true,
        }
        .into()
    }

    fn fatal_error() -> BoxkeeperError {
        ProviderApiError {
            code: "InstanceLimitExceeded".to_string(),
            message: "quota reached".to_string(),
            transient: false,
        }
        .into()
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_transient(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient_error())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: BoxkeeperResult<()> = retry_on_transient(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient_error()) }
        })
        .await;
        assert!(matches!(result, Err(BoxkeeperError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: BoxkeeperResult<()> = retry_on_transient(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(fatal_error()) }
        })
        .await;
        assert!(matches!(result, Err(BoxkeeperError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
