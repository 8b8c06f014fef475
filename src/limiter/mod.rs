//! Per-user request throttling
//!
//! Enforces a fixed cooldown between consecutive processed requests for
//! each user. The timestamp is written only when a request is allowed, so
//! a denied request never resets the window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::session::UserId;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Request may proceed; the cooldown window has been restarted
    Allowed,
    /// Request must wait; seconds remaining, rounded up
    Denied { retry_after_secs: u64 },
}

/// Fixed-cooldown rate limiter keyed by user
#[derive(Debug)]
pub struct CooldownLimiter {
    /// Last allowed request per user
    last_request: RwLock<HashMap<UserId, Instant>>,
    /// Minimum time between allowed requests
    cooldown: Duration,
}

impl CooldownLimiter {
    /// Create a limiter with the given cooldown window
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_request: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    /// Check whether a request from `user_id` at `now` may proceed.
    ///
    /// Check and update happen under a single write lock, so two
    /// near-simultaneous requests from the same user cannot both pass.
    pub async fn check_and_update(&self, user_id: UserId, now: Instant) -> Verdict {
        let mut last_request = self.last_request.write().await;

        if let Some(last) = last_request.get(&user_id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                let retry_after_secs = remaining.as_secs_f64().ceil() as u64;
                debug!(user_id, retry_after_secs, "request denied by cooldown");
                return Verdict::Denied { retry_after_secs };
            }
        }

        last_request.insert(user_id, now);
        Verdict::Allowed
    }
}
