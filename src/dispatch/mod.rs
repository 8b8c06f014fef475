//! Event routing
//!
//! The dispatcher is the single entry point for inbound chat events and
//! the only place that orders the checks the rest of the system relies
//! on: input validation, then the rate limiter, then the session state
//! machine, then the pipeline. Every failure is converted into a
//! user-visible reply here; nothing propagates to the dispatch loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::limiter::{CooldownLimiter, Verdict};
use crate::pipeline::{ImagePipeline, Outcome, PipelineError};
use crate::provider::ProviderError;
use crate::session::{SessionManager, SessionState, UserId};
use crate::store::{AssetStore, ImageKind, StoredImage};

/// Fixed bot commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Stats,
    Gallery,
    Clear,
}

impl Command {
    /// Parse a command from message text. Accepts the `/name@botname`
    /// form that group chats deliver.
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "stats" => Some(Command::Stats),
            "gallery" => Some(Command::Gallery),
            "clear" => Some(Command::Clear),
            _ => None,
        }
    }
}

/// An inbound chat event, already stripped of transport details
#[derive(Debug)]
pub struct Event {
    pub user_id: UserId,
    pub payload: EventPayload,
}

#[derive(Debug)]
pub enum EventPayload {
    Command(Command),
    /// Free-text message: a generation or transformation prompt
    Text(String),
    /// Image attachment, optionally captioned with a prompt
    Image {
        bytes: Vec<u8>,
        caption: Option<String>,
    },
}

/// Outbound reply, rendered by the transport
#[derive(Debug)]
pub enum Reply {
    Text(String),
    Photo {
        image: StoredImage,
        caption: String,
    },
}

const WELCOME_TEXT: &str = "AI Image Generator Bot\n\n\
    Send me a text prompt and I'll generate an image for you.\n\
    Send me a photo and I'll await a prompt to transform it.\n\n\
    Commands:\n\
    /help - usage tips\n\
    /stats - your usage statistics\n\
    /gallery - your stored images\n\
    /clear - discard a pending photo";

const HELP_TEXT: &str = "Usage:\n\
    - Text message: generates an image from your prompt\n\
    - Photo: held until you send a prompt, then transformed\n\
    - Photo with caption: transformed right away using the caption\n\n\
    Tips: be specific, include style and mood, describe colors and lighting.";

/// Routes inbound events through limiter, session state, and pipeline
pub struct Dispatcher {
    limiter: CooldownLimiter,
    sessions: Arc<SessionManager>,
    pipeline: ImagePipeline,
    store: Arc<AssetStore>,
}

impl Dispatcher {
    pub fn new(
        limiter: CooldownLimiter,
        sessions: Arc<SessionManager>,
        pipeline: ImagePipeline,
        store: Arc<AssetStore>,
    ) -> Self {
        Self {
            limiter,
            sessions,
            pipeline,
            store,
        }
    }

    /// Handle one event. Infallible by design: every error becomes a reply.
    pub async fn handle(&self, event: Event) -> Reply {
        let request_id = Uuid::new_v4();
        let user_id = event.user_id;
        match event.payload {
            EventPayload::Command(command) => {
                self.handle_command(request_id, user_id, command).await
            }
            EventPayload::Text(text) => self.handle_text(request_id, user_id, &text).await,
            EventPayload::Image { bytes, caption } => {
                self.handle_image(request_id, user_id, bytes, caption).await
            }
        }
    }

    async fn handle_command(
        &self,
        request_id: Uuid,
        user_id: UserId,
        command: Command,
    ) -> Reply {
        match command {
            Command::Start => {
                info!(%request_id, user_id, action = "start", outcome = "ok", "command");
                Reply::Text(WELCOME_TEXT.to_string())
            }
            Command::Help => {
                info!(%request_id, user_id, action = "help", outcome = "ok", "command");
                Reply::Text(HELP_TEXT.to_string())
            }
            Command::Stats => self.handle_stats(request_id, user_id).await,
            Command::Gallery => self.handle_gallery(request_id, user_id).await,
            Command::Clear => self.handle_clear(request_id, user_id).await,
        }
    }

    /// Read-only: session counters. Never touches the rate limiter.
    async fn handle_stats(&self, request_id: Uuid, user_id: UserId) -> Reply {
        let session = self.sessions.session(user_id).await;
        let session = session.lock().await;

        info!(%request_id, user_id, action = "stats", outcome = "ok", "command");
        Reply::Text(format!(
            "Your statistics\n\n\
            Images generated: {}\n\
            Images uploaded: {}\n\
            Pending photo: {}",
            session.generated_count,
            session.uploaded_count,
            if session.is_awaiting_prompt() { "yes" } else { "no" }
        ))
    }

    /// Read-only: asset store listing. Never touches the rate limiter.
    async fn handle_gallery(&self, request_id: Uuid, user_id: UserId) -> Reply {
        let images = match self.store.list(user_id).await {
            Ok(images) => images,
            Err(e) => {
                error!(%request_id, user_id, action = "gallery", outcome = "storage_error", error = %e, "command failed");
                return Reply::Text("Couldn't read your gallery right now.".to_string());
            }
        };

        info!(%request_id, user_id, action = "gallery", outcome = "ok", count = images.len(), "command");

        if images.is_empty() {
            return Reply::Text("Your gallery is empty. Send a prompt to get started.".to_string());
        }

        let generated = images
            .iter()
            .filter(|i| i.kind == ImageKind::Generated)
            .count();
        let uploaded = images.len() - generated;
        let mut text = format!(
            "Your gallery: {} generated, {} uploaded\n",
            generated, uploaded
        );
        // Show the most recent few; the full tree stays on disk
        for image in images.iter().rev().take(5) {
            if let Some(name) = image.path.file_name().and_then(|n| n.to_str()) {
                text.push_str(&format!("- [{}] {}\n", image.kind.label(), name));
            }
        }
        Reply::Text(text)
    }

    /// State-mutating, so it pays the cooldown like any other mutation.
    async fn handle_clear(&self, request_id: Uuid, user_id: UserId) -> Reply {
        if let Some(reply) = self.check_rate_limit(request_id, user_id, "clear").await {
            return reply;
        }

        let session = self.sessions.session(user_id).await;
        let had_pending = session.lock().await.clear_pending();

        info!(%request_id, user_id, action = "clear", outcome = "ok", had_pending, "command");
        Reply::Text(if had_pending {
            "Pending photo discarded.".to_string()
        } else {
            "Nothing to clear.".to_string()
        })
    }

    async fn handle_text(&self, request_id: Uuid, user_id: UserId, text: &str) -> Reply {
        let prompt = text.trim();
        // Rejected locally: no cooldown consumed
        if prompt.is_empty() {
            info!(%request_id, user_id, action = "prompt", outcome = "invalid_input", "empty prompt");
            return Reply::Text("Send a non-empty prompt.".to_string());
        }

        if let Some(reply) = self.check_rate_limit(request_id, user_id, "prompt").await {
            return reply;
        }

        // Take any pending image under the lock, then release it before
        // the provider call so quick commands from this user are not
        // blocked behind the network.
        let pending = {
            let session = self.sessions.session(user_id).await;
            let mut session = session.lock().await;
            session.take_pending()
        };

        match pending {
            Some(image) => {
                self.run_transform(request_id, user_id, image, prompt)
                    .await
            }
            None => self.run_generate(request_id, user_id, prompt).await,
        }
    }

    async fn handle_image(
        &self,
        request_id: Uuid,
        user_id: UserId,
        bytes: Vec<u8>,
        caption: Option<String>,
    ) -> Reply {
        // Rejected locally: no cooldown consumed
        if bytes.is_empty() {
            info!(%request_id, user_id, action = "upload", outcome = "invalid_input", "empty attachment");
            return Reply::Text("That attachment looks empty. Send a photo.".to_string());
        }

        if let Some(reply) = self.check_rate_limit(request_id, user_id, "upload").await {
            return reply;
        }

        // Uploads are persisted on receipt, independent of whether a
        // transform ever happens.
        let saved = self
            .store
            .save(user_id, ImageKind::Uploaded, &bytes)
            .await;
        match &saved {
            Ok(stored) => {
                let session = self.sessions.session(user_id).await;
                session.lock().await.uploaded_count += 1;
                info!(%request_id, user_id, action = "upload", outcome = "ok", path = %stored.path.display(), "upload stored");
            }
            Err(e) => {
                // The in-memory copy still drives the transform flow, so
                // the user is not stuck; the request is reported failed.
                error!(%request_id, user_id, action = "upload", outcome = "storage_error", error = %e, "upload not persisted");
            }
        }

        let prompt = caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        match prompt {
            // Caption present: upload + prompt combined into one transform.
            // The new image supersedes any pending one.
            Some(prompt) => {
                {
                    let session = self.sessions.session(user_id).await;
                    session.lock().await.clear_pending();
                }
                self.run_transform(request_id, user_id, bytes, &prompt)
                    .await
            }
            None => {
                let session = self.sessions.session(user_id).await;
                session.lock().await.set_pending(bytes);

                if saved.is_err() {
                    return Reply::Text(
                        "Something went wrong saving your photo, but I'm holding onto it. \
                        Send a prompt to transform it."
                            .to_string(),
                    );
                }
                Reply::Text(
                    "Got your photo. Send a prompt describing how to transform it, \
                    or /clear to discard it."
                        .to_string(),
                )
            }
        }
    }

    async fn run_generate(&self, request_id: Uuid, user_id: UserId, prompt: &str) -> Reply {
        match self.pipeline.generate(user_id, prompt).await {
            Ok(outcome) => {
                info!(%request_id, user_id, action = "generate", outcome = "ok", "image generated");
                Reply::Photo {
                    caption: success_caption(prompt, &outcome),
                    image: outcome.image,
                }
            }
            Err(e) => {
                log_pipeline_error(request_id, user_id, "generate", &e);
                Reply::Text(pipeline_error_reply(&e))
            }
        }
    }

    async fn run_transform(
        &self,
        request_id: Uuid,
        user_id: UserId,
        source: Vec<u8>,
        prompt: &str,
    ) -> Reply {
        match self.pipeline.transform(user_id, &source, prompt).await {
            Ok(outcome) => {
                info!(%request_id, user_id, action = "transform", outcome = "ok", "image transformed");
                Reply::Photo {
                    caption: success_caption(prompt, &outcome),
                    image: outcome.image,
                }
            }
            Err(e) => {
                log_pipeline_error(request_id, user_id, "transform", &e);
                // Provider failures keep the source available for another
                // try; storage failures advance to Idle so the user is
                // not wedged on a broken disk.
                if matches!(e, PipelineError::Provider(_)) {
                    self.restore_pending(user_id, source).await;
                }
                Reply::Text(pipeline_error_reply(&e))
            }
        }
    }

    /// Put a transform source back, unless a newer upload took its place
    /// while the provider call was in flight.
    async fn restore_pending(&self, user_id: UserId, image: Vec<u8>) {
        let session = self.sessions.session(user_id).await;
        let mut session = session.lock().await;
        if matches!(session.state, SessionState::Idle) {
            session.set_pending(image);
        }
    }

    /// Returns the denial reply if the user is still cooling down.
    async fn check_rate_limit(
        &self,
        request_id: Uuid,
        user_id: UserId,
        action: &'static str,
    ) -> Option<Reply> {
        match self
            .limiter
            .check_and_update(user_id, Instant::now())
            .await
        {
            Verdict::Allowed => None,
            Verdict::Denied { retry_after_secs } => {
                info!(%request_id, user_id, action, outcome = "rate_limited", retry_after_secs, "request denied");
                Some(Reply::Text(format!(
                    "Easy there! Please wait {} more second{} and try again.",
                    retry_after_secs,
                    if retry_after_secs == 1 { "" } else { "s" }
                )))
            }
        }
    }
}

fn success_caption(prompt: &str, outcome: &Outcome) -> String {
    match &outcome.revised_prompt {
        Some(revised) => format!(
            "Your prompt: {}\nEnhanced prompt: {}",
            prompt, revised
        ),
        None => format!("Your prompt: {}", prompt),
    }
}

fn log_pipeline_error(request_id: Uuid, user_id: UserId, action: &'static str, e: &PipelineError) {
    match e {
        PipelineError::Provider(cause) => {
            warn!(%request_id, user_id, action, outcome = "provider_error", error = %cause, "request failed");
        }
        PipelineError::Storage(cause) => {
            error!(%request_id, user_id, action, outcome = "storage_error", error = %cause, "request failed");
        }
    }
}

fn pipeline_error_reply(e: &PipelineError) -> String {
    match e {
        PipelineError::Provider(ProviderError::Timeout) => {
            "The image service took too long. Please try again.".to_string()
        }
        PipelineError::Provider(ProviderError::ContentPolicy(_)) => {
            "That prompt was rejected by the content policy. Try rephrasing it.".to_string()
        }
        PipelineError::Provider(ProviderError::Unavailable(_)) => {
            "The image service is unavailable right now. Please try again later.".to_string()
        }
        PipelineError::Provider(_) => {
            "Image generation failed. Please try again.".to_string()
        }
        PipelineError::Storage(_) => {
            "Something went wrong saving the image. Please try again.".to_string()
        }
    }
}
