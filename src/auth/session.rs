//! Ephemeral store for pending OTP challenges.
//!
//! Records are keyed by `session_id` and never mutated in place: a resend
//! deletes the old record and stores a new one. `validate_session` burns the
//! record on any failed check, so a session that has been deleted can never
//! validate again.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use super::outcome::EntryPoint;

#[derive(Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub session_id: String,
    pub user_id: Uuid,
    pub otp_code: String,
    pub entry_point: EntryPoint,
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    #[must_use]
    pub fn new(session_id: String, user_id: Uuid, otp_code: String, entry_point: EntryPoint) -> Self {
        Self {
            session_id,
            user_id,
            otp_code,
            entry_point,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.created_at + ttl_delta(ttl)
    }
}

// Keep the code out of logs.
impl fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLogin")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("otp_code", &"********")
            .field("entry_point", &self.entry_point)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Keyed store of pending logins. Each operation is atomic for its key.
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record stored under `session_id`.
    fn set_session(&self, session_id: &str, record: PendingLogin);

    fn get_session(&self, session_id: &str) -> Option<PendingLogin>;

    /// Idempotent.
    fn delete_session(&self, session_id: &str);

    /// Remove and return the record. Of several concurrent callers at most
    /// one receives it.
    fn take_session(&self, session_id: &str) -> Option<PendingLogin>;

    /// Return the record only if it exists, is not older than `ttl` and is
    /// bound to `expected_user_id`. Any failed check deletes the record.
    fn validate_session(
        &self,
        session_id: &str,
        expected_user_id: Uuid,
        ttl: Duration,
    ) -> Option<PendingLogin>;

    /// Delete every record older than `ttl`, returning how many were removed.
    fn clear_expired_sessions(&self, ttl: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}

/// `now - created_at <= ttl` is still live; only strictly older records expire.
pub(crate) fn is_expired(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) > ttl_delta(ttl)
}

/// In-process session store. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, PendingLogin>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingLogin>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn set_session(&self, session_id: &str, record: PendingLogin) {
        self.lock().insert(session_id.to_string(), record);
    }

    fn get_session(&self, session_id: &str) -> Option<PendingLogin> {
        self.lock().get(session_id).cloned()
    }

    fn delete_session(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    fn take_session(&self, session_id: &str) -> Option<PendingLogin> {
        self.lock().remove(session_id)
    }

    fn validate_session(
        &self,
        session_id: &str,
        expected_user_id: Uuid,
        ttl: Duration,
    ) -> Option<PendingLogin> {
        let mut sessions = self.lock();
        let record = sessions.remove(session_id)?;

        if is_expired(record.created_at, ttl, Utc::now()) {
            debug!(session_id, "session expired");
            return None;
        }
        if record.user_id != expected_user_id {
            debug!(session_id, "session bound to a different user");
            return None;
        }

        sessions.insert(session_id.to_string(), record.clone());
        Some(record)
    }

    fn clear_expired_sessions(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, record| !is_expired(record.created_at, ttl, now));
        before - sessions.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Sweep expired sessions every `every`, independent of request traffic.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.clear_expired_sessions(ttl);
            if removed > 0 {
                info!(removed, remaining = store.len(), "expired sessions swept");
            }
        }
    })
}
