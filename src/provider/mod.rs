//! Image provider integration
//!
//! Trait seam over the external image-generation service, plus:
//! - OpenAI Images API client (the production backend)
//! - Scripted mock for tests

mod mock;
mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiImages;

use async_trait::async_trait;
use thiserror::Error;

/// Provider failures, classified for user-facing reporting
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider API key not configured")]
    NotConfigured,

    #[error("provider error: {0}")]
    Unknown(String),
}

/// Provider output: raw image bytes plus the prompt the provider actually
/// used, when it rewrites one.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub revised_prompt: Option<String>,
}

/// The external image-generation service
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Text-to-image
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ProviderError>;

    /// Transform a source image according to a prompt
    async fn transform(&self, image: &[u8], prompt: &str)
        -> Result<GeneratedImage, ProviderError>;
}
