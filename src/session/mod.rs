//! Per-user session state
//!
//! Tracks, for each user, the pending-image state machine and usage
//! counters. Sessions are created lazily on first interaction and live for
//! the process lifetime. All mutation happens under the per-user lock
//! handed out by [`SessionManager::session`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

/// Stable chat-platform user identifier
pub type UserId = i64;

/// Pending-image state for a user
///
/// An uploaded image is held here until a transformation prompt arrives,
/// the user clears it, or a newer upload replaces it. Holding the bytes
/// inside the variant means a pending image can only exist while awaiting
/// a prompt.
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingPrompt {
        image: Vec<u8>,
    },
}

/// Mutable per-user state
#[derive(Debug)]
pub struct UserSession {
    pub user_id: UserId,
    pub state: SessionState,
    pub generated_count: u64,
    pub uploaded_count: u64,
}

impl UserSession {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: SessionState::Idle,
            generated_count: 0,
            uploaded_count: 0,
        }
    }

    /// True while an uploaded image is waiting for a prompt
    pub fn is_awaiting_prompt(&self) -> bool {
        matches!(self.state, SessionState::AwaitingPrompt { .. })
    }

    /// Hold an uploaded image, replacing any previous pending image.
    pub fn set_pending(&mut self, image: Vec<u8>) {
        self.state = SessionState::AwaitingPrompt { image };
    }

    /// Take the pending image out, leaving the session Idle.
    pub fn take_pending(&mut self) -> Option<Vec<u8>> {
        match std::mem::take(&mut self.state) {
            SessionState::AwaitingPrompt { image } => Some(image),
            SessionState::Idle => None,
        }
    }

    /// Discard any pending image. Returns whether one was held.
    pub fn clear_pending(&mut self) -> bool {
        self.take_pending().is_some()
    }
}

/// All user sessions, one lock per user
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<UserId, Arc<Mutex<UserSession>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session for a user, creating it on first interaction.
    ///
    /// Callers lock the returned handle only around state reads and
    /// writes, never across a provider call.
    pub async fn session(&self, user_id: UserId) -> Arc<Mutex<UserSession>> {
        // Fast path: session already exists
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&user_id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(UserSession::new(user_id))))
            .clone()
    }
}
