//! Scripted provider for testing
//!
//! Succeeds with fixed bytes by default; queued errors let tests drive
//! specific provider failures. Records calls so tests can assert which
//! image and prompt actually reached the provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GeneratedImage, ImageProvider, ProviderError};

/// Scripted image provider
#[derive(Default)]
pub struct MockProvider {
    /// Errors to return, one per call, before succeeding again
    scripted_errors: Mutex<VecDeque<ProviderError>>,
    generate_calls: AtomicUsize,
    transform_calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_source: Mutex<Option<Vec<u8>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next provider call
    pub fn push_error(&self, error: ProviderError) {
        self.scripted_errors.lock().unwrap().push_back(error);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn transform_calls(&self) -> usize {
        self.transform_calls.load(Ordering::SeqCst)
    }

    /// Prompt seen by the most recent call
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    /// Source image seen by the most recent transform call
    pub fn last_source(&self) -> Option<Vec<u8>> {
        self.last_source.lock().unwrap().clone()
    }

    fn next_result(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        if let Some(error) = self.scripted_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(GeneratedImage {
            bytes: format!("mock image for: {}", prompt).into_bytes(),
            revised_prompt: None,
        })
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        self.next_result(prompt)
    }

    async fn transform(
        &self,
        image: &[u8],
        prompt: &str,
    ) -> Result<GeneratedImage, ProviderError> {
        self.transform_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.last_source.lock().unwrap() = Some(image.to_vec());
        self.next_result(prompt)
    }
}
