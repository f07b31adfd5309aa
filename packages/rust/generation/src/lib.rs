//! Generation Service adapters.
//!
//! The pipeline only sees [`GenerationService`]: one instruction in, one
//! text response out. Retry and concurrency limits live in the adapter.

pub mod http;
pub mod retry;

use async_trait::async_trait;

use penflow_shared::ServiceError;

pub use http::HttpGenerationService;
pub use retry::RetryPolicy;

/// A text generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Send `instruction` as the sole prompt and return the full response text.
    async fn generate(&self, instruction: &str) -> Result<String, ServiceError>;

    /// Model identifier, recorded in run metrics.
    fn model_name(&self) -> &str;
}
