pub mod booking;
pub mod cancellation;
pub mod info;
pub mod ingest;
pub mod intent;
pub mod orchestrator;
pub mod retrieve;
pub mod sessions;

use std::future::Future;
use std::time::Duration;

use concierge_core::StoreError;

/// Run a store call under a deadline; elapsing maps to `StoreError::Timeout`.
pub(crate) async fn bounded<T, F>(timeout_seconds: u64, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout_seconds)),
    }
}
