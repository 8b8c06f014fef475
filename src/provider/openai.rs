//! OpenAI Images API client
//!
//! Speaks to two endpoints:
//! - `POST /images/generations` (dall-e-3) for text-to-image
//! - `POST /images/edits` (dall-e-2, multipart) for image transformation
//!
//! Responses are requested as base64 so image bytes come back in one round
//! trip. HTTP failures are classified into the [`ProviderError`] taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GeneratedImage, ImageProvider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const GENERATION_MODEL: &str = "dall-e-3";
// The edits endpoint does not accept dall-e-3
const EDIT_MODEL: &str = "dall-e-2";
const IMAGE_SIZE: &str = "1024x1024";

/// Image generation request
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

/// Image response, shared by both endpoints
#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// OpenAI Images API client
#[derive(Debug)]
pub struct OpenAiImages {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiImages {
    /// Create a new client. A missing key is allowed; requests then fail
    /// with [`ProviderError::NotConfigured`].
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Check if an API key is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::NotConfigured)
    }

    /// Map a transport-level failure onto the error taxonomy
    fn classify_request_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Unavailable(e.to_string())
        } else {
            ProviderError::Unknown(e.to_string())
        }
    }

    /// Map a non-2xx response onto the error taxonomy
    fn classify_status(status: StatusCode, body: &str) -> ProviderError {
        let api_error = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|r| r.error)
            .ok();
        let message = api_error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {}", status));

        let policy_rejected = api_error
            .as_ref()
            .map(|e| {
                e.code.as_deref() == Some("content_policy_violation")
                    || e.kind.as_deref() == Some("image_generation_user_error")
                    || e.message.contains("safety system")
            })
            .unwrap_or(false);

        if policy_rejected {
            ProviderError::ContentPolicy(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ProviderError::Unavailable(message)
        } else {
            ProviderError::Unknown(message)
        }
    }

    /// Read the single image out of a successful response
    async fn decode_response(response: reqwest::Response) -> Result<GeneratedImage, ProviderError> {
        let images: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("failed to parse response: {}", e)))?;

        let payload = images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Unknown("no image in response".to_string()))?;

        let b64 = payload
            .b64_json
            .ok_or_else(|| ProviderError::Unknown("missing image payload".to_string()))?;
        let bytes = BASE64
            .decode(b64)
            .map_err(|e| ProviderError::Unknown(format!("invalid image encoding: {}", e)))?;

        Ok(GeneratedImage {
            bytes,
            revised_prompt: payload.revised_prompt,
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let api_key = self.api_key()?;

        let request = GenerationRequest {
            model: GENERATION_MODEL,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            response_format: "b64_json",
        };

        debug!(model = GENERATION_MODEL, "requesting image generation");

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::classify_request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(Self::classify_status(status, &body));
        }

        Self::decode_response(response).await
    }

    async fn transform(
        &self,
        image: &[u8],
        prompt: &str,
    ) -> Result<GeneratedImage, ProviderError> {
        let api_key = self.api_key()?;

        let part = Part::bytes(image.to_vec())
            .file_name("source.png")
            .mime_str("image/png")
            .map_err(|e| ProviderError::Unknown(e.to_string()))?;
        let form = Form::new()
            .text("model", EDIT_MODEL)
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", IMAGE_SIZE)
            .text("response_format", "b64_json")
            .part("image", part);

        debug!(model = EDIT_MODEL, "requesting image transformation");

        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::classify_request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(Self::classify_status(status, &body));
        }

        Self::decode_response(response).await
    }
}
