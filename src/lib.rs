//! imgbot - Telegram image generation bot daemon
//!
//! Turns chat messages into calls against an external image-generation
//! provider, persisting results per user.

pub mod config;
pub mod dispatch;
pub mod limiter;
pub mod pipeline;
pub mod provider;
pub mod session;
pub mod store;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use config::Config;
use dispatch::{Command, Dispatcher, Event, EventPayload, Reply};
use limiter::CooldownLimiter;
use pipeline::ImagePipeline;
use provider::{ImageProvider, OpenAiImages};
use session::SessionManager;
use store::AssetStore;
use telegram::{best_photo, Message, TelegramClient};

const STATUS_TEXT: &str = "Generating image... this usually takes 10-30 seconds.";
const FAILURE_TEXT: &str = "Something went wrong handling that message. Please try again.";

/// The bot instance: transport on one side, dispatcher on the other
pub struct Bot {
    config: Config,
    telegram: Arc<TelegramClient>,
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    /// Create a bot backed by the OpenAI Images API
    pub fn new(config: Config) -> Self {
        let provider: Arc<dyn ImageProvider> =
            Arc::new(OpenAiImages::new(config.openai_api_key.clone()));
        Self::with_provider(config, provider)
    }

    /// Create a bot over any provider implementation
    pub fn with_provider(config: Config, provider: Arc<dyn ImageProvider>) -> Self {
        let store = Arc::new(AssetStore::new(
            config.generated_dir.clone(),
            config.uploaded_dir.clone(),
        ));
        let sessions = Arc::new(SessionManager::new());
        let limiter = CooldownLimiter::new(Duration::from_secs(config.cooldown_secs));
        let pipeline = ImagePipeline::new(provider, store.clone(), sessions.clone());
        let dispatcher = Arc::new(Dispatcher::new(limiter, sessions, pipeline, store));
        let telegram = Arc::new(TelegramClient::new(config.telegram_token.clone()));

        Self {
            config,
            telegram,
            dispatcher,
        }
    }

    /// Long-poll for updates until the process is stopped.
    ///
    /// Each update is handled on its own task so one user's provider
    /// call never delays another user's events. Transport errors are
    /// logged and retried; nothing here is fatal.
    pub async fn run(&self) -> Result<()> {
        info!("imgbot polling for updates");
        let mut offset = 0i64;

        loop {
            let updates = match self
                .telegram
                .get_updates(offset, self.config.poll_timeout_secs)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("getUpdates failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };

                let telegram = self.telegram.clone();
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let chat_id = message.chat.id;
                    if let Err(e) = handle_message(&telegram, &dispatcher, message).await {
                        error!("update handling failed: {}", e);
                        let _ = telegram.send_message(chat_id, FAILURE_TEXT).await;
                    }
                });
            }
        }
    }
}

/// Convert one inbound message into an event, dispatch it, and send the
/// reply back to the chat.
async fn handle_message(
    telegram: &TelegramClient,
    dispatcher: &Dispatcher,
    message: Message,
) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(user) = message.from else {
        // Channel posts and service messages carry no sender
        return Ok(());
    };

    let event = if let Some(photo) = best_photo(&message.photo) {
        let file = telegram.get_file(&photo.file_id).await?;
        let Some(file_path) = file.file_path else {
            telegram
                .send_message(chat_id, "Couldn't fetch that photo. Please resend it.")
                .await?;
            return Ok(());
        };
        let bytes = telegram.download_file(&file_path).await?;
        let caption = message
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Event {
            user_id: user.id,
            payload: EventPayload::Image { bytes, caption },
        }
    } else if let Some(text) = message.text {
        let payload = match Command::parse(&text) {
            Some(command) => EventPayload::Command(command),
            None => EventPayload::Text(text),
        };
        Event {
            user_id: user.id,
            payload,
        }
    } else {
        // Stickers, voice notes, documents: rejected locally
        telegram
            .send_message(chat_id, "Send me a text prompt or a photo.")
            .await?;
        return Ok(());
    };

    // Mirror the provider wait with a status message, removed once the
    // real reply is out
    let status = match &event.payload {
        EventPayload::Text(_) | EventPayload::Image { caption: Some(_), .. } => {
            telegram.send_message(chat_id, STATUS_TEXT).await.ok()
        }
        _ => None,
    };

    let reply = dispatcher.handle(event).await;
    match reply {
        Reply::Text(text) => {
            telegram.send_message(chat_id, &text).await?;
        }
        Reply::Photo { image, caption } => {
            let bytes = tokio::fs::read(&image.path).await?;
            telegram.send_photo(chat_id, bytes, &caption).await?;
        }
    }

    if let Some(status) = status {
        let _ = telegram.delete_message(chat_id, status.message_id).await;
    }

    Ok(())
}
