//! Telegram Bot API client
//!
//! Minimal long-polling client covering just the methods the bot
//! exercises: getUpdates, sendMessage, sendPhoto, deleteMessage, and
//! getFile plus the file download host. Types mirror the Bot API JSON.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram API error: {0}")]
    Api(String),
}

/// One long-poll update
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// An inbound chat message
#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Same photo in several resolutions, smallest first
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

/// getFile result
#[derive(Debug, Deserialize)]
pub struct File {
    pub file_path: Option<String>,
}

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteMessageRequest {
    chat_id: i64,
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct GetFileRequest<'a> {
    file_id: &'a str,
}

/// Telegram Bot API client
#[derive(Debug)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// Create a client for the given bot token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            // Long polls block server-side; leave generous headroom
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .unwrap(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        }
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: &impl Serialize,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(request)
            .send()
            .await?;

        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let body = response.text().await?;

        // The API reports failures as ok=false with a description, also
        // on non-2xx statuses
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(api) if api.ok => api
                .result
                .ok_or_else(|| TransportError::Api(format!("{}: missing result", method))),
            Ok(api) => {
                let description = api
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status));
                warn!("telegram {} failed: {}", method, description);
                Err(TransportError::Api(description))
            }
            Err(_) => {
                warn!("telegram {} returned unparseable body ({})", method, status);
                Err(TransportError::Api(format!("{}: HTTP {}", method, status)))
            }
        }
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &GetUpdatesRequest {
                offset,
                timeout: timeout_secs,
                allowed_updates: &["message"],
            },
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TransportError> {
        self.call("sendMessage", &SendMessageRequest { chat_id, text })
            .await
    }

    pub async fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &DeleteMessageRequest {
                    chat_id,
                    message_id,
                },
            )
            .await?;
        Ok(())
    }

    /// Upload a photo with a caption
    pub async fn send_photo(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<Message, TransportError> {
        let part = Part::bytes(bytes)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;

        Self::unwrap_response("sendPhoto", response).await
    }

    /// Resolve a file id to a download path
    pub async fn get_file(&self, file_id: &str) -> Result<File, TransportError> {
        self.call("getFile", &GetFileRequest { file_id }).await
    }

    /// Download a file by the path returned from [`Self::get_file`]
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        debug!("downloading telegram file {}", file_path);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Api(format!(
                "file download failed: HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Pick the highest-resolution rendition of a photo
pub fn best_photo(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| p.width * p.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_photo_picks_largest() {
        let photos = vec![
            PhotoSize {
                file_id: "small".to_string(),
                width: 90,
                height: 90,
            },
            PhotoSize {
                file_id: "large".to_string(),
                width: 800,
                height: 800,
            },
            PhotoSize {
                file_id: "medium".to_string(),
                width: 320,
                height: 320,
            },
        ];
        assert_eq!(best_photo(&photos).map(|p| p.file_id.as_str()), Some("large"));
    }

    #[test]
    fn test_best_photo_empty() {
        assert!(best_photo(&[]).is_none());
    }

    #[test]
    fn test_update_deserializes_photo_message() {
        let json = r#"{
            "update_id": 10,
            "message": {
                "message_id": 44,
                "from": {"id": 7, "first_name": "Ada"},
                "chat": {"id": 7},
                "caption": "make it watercolor",
                "photo": [
                    {"file_id": "a", "file_unique_id": "ua", "width": 90, "height": 90},
                    {"file_id": "b", "file_unique_id": "ub", "width": 800, "height": 800}
                ]
            }
        }"#;
        let update: Update = serde_json::from_str(json).expect("deserialize");
        let message = update.message.expect("message");
        assert_eq!(message.photo.len(), 2);
        assert_eq!(message.caption.as_deref(), Some("make it watercolor"));
        assert!(message.text.is_none());
    }

    #[test]
    fn test_update_deserializes_text_message() {
        let json = r#"{
            "update_id": 11,
            "message": {
                "message_id": 45,
                "from": {"id": 7, "first_name": "Ada"},
                "chat": {"id": 7},
                "text": "/stats"
            }
        }"#;
        let update: Update = serde_json::from_str(json).expect("deserialize");
        let message = update.message.expect("message");
        assert_eq!(message.text.as_deref(), Some("/stats"));
        assert!(message.photo.is_empty());
    }
}
