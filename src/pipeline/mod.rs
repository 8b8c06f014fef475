//! Image request orchestration
//!
//! Runs the two provider-backed operations end to end: call the provider,
//! commit the output to the asset store, then update the user's counters.
//! The caller has already passed the rate limiter, so a provider failure
//! still costs the user their cooldown slot.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::provider::{ImageProvider, ProviderError};
use crate::session::{SessionManager, UserId};
use crate::store::{AssetStore, ImageKind, StorageError, StoredImage};

/// Pipeline failures, preserving the source classification
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A committed pipeline result
#[derive(Debug)]
pub struct Outcome {
    pub image: StoredImage,
    /// The prompt the provider actually used, when it rewrites one
    pub revised_prompt: Option<String>,
}

/// Orchestrates generate and transform requests
pub struct ImagePipeline {
    provider: Arc<dyn ImageProvider>,
    store: Arc<AssetStore>,
    sessions: Arc<SessionManager>,
}

impl ImagePipeline {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        store: Arc<AssetStore>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            provider,
            store,
            sessions,
        }
    }

    /// Text-to-image: provider call, store as Generated, bump the counter.
    pub async fn generate(&self, user_id: UserId, prompt: &str) -> Result<Outcome, PipelineError> {
        debug!(user_id, "requesting image generation");
        let generated = self.provider.generate(prompt).await?;

        let image = self
            .store
            .save(user_id, ImageKind::Generated, &generated.bytes)
            .await?;
        self.record_generated(user_id).await;

        info!(user_id, path = %image.path.display(), "generated image stored");
        Ok(Outcome {
            image,
            revised_prompt: generated.revised_prompt,
        })
    }

    /// Image + prompt: provider call, store the result as Generated.
    pub async fn transform(
        &self,
        user_id: UserId,
        source: &[u8],
        prompt: &str,
    ) -> Result<Outcome, PipelineError> {
        debug!(user_id, source_size = source.len(), "requesting image transformation");
        let generated = self.provider.transform(source, prompt).await?;

        let image = self
            .store
            .save(user_id, ImageKind::Generated, &generated.bytes)
            .await?;
        self.record_generated(user_id).await;

        info!(user_id, path = %image.path.display(), "transformed image stored");
        Ok(Outcome {
            image,
            revised_prompt: generated.revised_prompt,
        })
    }

    async fn record_generated(&self, user_id: UserId) {
        let session = self.sessions.session(user_id).await;
        session.lock().await.generated_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use tempfile::TempDir;

    fn test_pipeline() -> (TempDir, Arc<MockProvider>, Arc<SessionManager>, ImagePipeline) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(AssetStore::new(
            dir.path().join("generated"),
            dir.path().join("uploaded"),
        ));
        let sessions = Arc::new(SessionManager::new());
        let provider = Arc::new(MockProvider::new());
        let pipeline = ImagePipeline::new(provider.clone(), store, sessions.clone());
        (dir, provider, sessions, pipeline)
    }

    #[tokio::test]
    async fn test_generate_stores_and_counts() {
        let (_dir, provider, sessions, pipeline) = test_pipeline();

        let outcome = pipeline.generate(1, "a red bicycle").await.expect("generate");

        assert_eq!(outcome.image.kind, ImageKind::Generated);
        assert!(outcome.image.path.exists());
        assert_eq!(provider.generate_calls(), 1);

        let session = sessions.session(1).await;
        assert_eq!(session.lock().await.generated_count, 1);
    }

    #[tokio::test]
    async fn test_transform_stores_result_as_generated() {
        let (_dir, provider, _sessions, pipeline) = test_pipeline();

        let outcome = pipeline
            .transform(1, b"source", "make it night")
            .await
            .expect("transform");

        assert_eq!(outcome.image.kind, ImageKind::Generated);
        assert_eq!(provider.transform_calls(), 1);
        assert_eq!(provider.last_source().as_deref(), Some(b"source".as_ref()));
    }

    #[tokio::test]
    async fn test_provider_failure_stores_nothing() {
        let (_dir, provider, sessions, pipeline) = test_pipeline();
        provider.push_error(ProviderError::Timeout);

        let err = pipeline.generate(1, "a cat").await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider(ProviderError::Timeout)));

        let session = sessions.session(1).await;
        assert_eq!(session.lock().await.generated_count, 0);
    }
}
