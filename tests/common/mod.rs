//! Common test utilities - BotTest harness driving the dispatcher directly

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use imgbot::dispatch::{Command, Dispatcher, Event, EventPayload, Reply};
use imgbot::limiter::CooldownLimiter;
use imgbot::pipeline::ImagePipeline;
use imgbot::provider::MockProvider;
use imgbot::session::{SessionManager, UserId};
use imgbot::store::{AssetStore, ImageKind};
use tempfile::TempDir;

/// Test harness wiring a dispatcher over a scripted provider and a
/// tempdir-backed store
pub struct BotTest {
    pub dispatcher: Dispatcher,
    pub provider: Arc<MockProvider>,
    pub store: Arc<AssetStore>,
    pub sessions: Arc<SessionManager>,
    _dir: TempDir,
}

impl BotTest {
    /// Start with no cooldown, so sequential events are never throttled
    pub fn start() -> Self {
        Self::with_cooldown(Duration::ZERO)
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let generated = dir.path().join("generated");
        let uploaded = dir.path().join("uploaded");
        Self::build(dir, generated, uploaded, cooldown)
    }

    /// Point the store at arbitrary roots, e.g. unwritable ones
    pub fn with_store_roots(generated: PathBuf, uploaded: PathBuf, cooldown: Duration) -> Self {
        let dir = TempDir::new().expect("tempdir");
        Self::build(dir, generated, uploaded, cooldown)
    }

    fn build(dir: TempDir, generated: PathBuf, uploaded: PathBuf, cooldown: Duration) -> Self {
        let store = Arc::new(AssetStore::new(generated, uploaded));
        let sessions = Arc::new(SessionManager::new());
        let provider = Arc::new(MockProvider::new());
        let pipeline = ImagePipeline::new(provider.clone(), store.clone(), sessions.clone());
        let limiter = CooldownLimiter::new(cooldown);
        let dispatcher = Dispatcher::new(limiter, sessions.clone(), pipeline, store.clone());

        Self {
            dispatcher,
            provider,
            store,
            sessions,
            _dir: dir,
        }
    }

    pub async fn text(&self, user_id: UserId, text: &str) -> Reply {
        self.dispatcher
            .handle(Event {
                user_id,
                payload: EventPayload::Text(text.to_string()),
            })
            .await
    }

    pub async fn command(&self, user_id: UserId, command: Command) -> Reply {
        self.dispatcher
            .handle(Event {
                user_id,
                payload: EventPayload::Command(command),
            })
            .await
    }

    pub async fn image(&self, user_id: UserId, bytes: &[u8], caption: Option<&str>) -> Reply {
        self.dispatcher
            .handle(Event {
                user_id,
                payload: EventPayload::Image {
                    bytes: bytes.to_vec(),
                    caption: caption.map(str::to_string),
                },
            })
            .await
    }

    pub async fn generated_count(&self, user_id: UserId) -> u64 {
        let session = self.sessions.session(user_id).await;
        let session = session.lock().await;
        session.generated_count
    }

    pub async fn uploaded_count(&self, user_id: UserId) -> u64 {
        let session = self.sessions.session(user_id).await;
        let session = session.lock().await;
        session.uploaded_count
    }

    pub async fn awaiting_prompt(&self, user_id: UserId) -> bool {
        let session = self.sessions.session(user_id).await;
        let session = session.lock().await;
        session.is_awaiting_prompt()
    }

    /// Count committed store entries of one kind for a user
    pub async fn stored(&self, user_id: UserId, kind: ImageKind) -> usize {
        self.store
            .list(user_id)
            .await
            .expect("list")
            .iter()
            .filter(|i| i.kind == kind)
            .count()
    }
}

/// Unwrap a text reply
pub fn reply_text(reply: &Reply) -> &str {
    match reply {
        Reply::Text(text) => text,
        Reply::Photo { .. } => panic!("expected text reply, got photo"),
    }
}

/// True when the reply is a delivered photo
pub fn is_photo(reply: &Reply) -> bool {
    matches!(reply, Reply::Photo { .. })
}
