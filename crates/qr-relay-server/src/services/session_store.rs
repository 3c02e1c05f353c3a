use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Session, SessionId, SessionStatus};
use crate::utils::{cookies, CookieMap, RelayError};

/// In-memory session records with TTL expiry and a per-user creation
/// cooldown.
///
/// Every mutation happens under one mutex; callers get clones back so the
/// guard is never held across an upstream call.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    ttl: Duration,
    cooldown: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration, cooldown: Duration) -> Self {
        info!(
            "Initializing session store: ttl={}s, cooldown={}s",
            ttl.as_secs(),
            cooldown.as_secs()
        );
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            cooldown,
        }
    }

    /// Fails with `Cooldown` while `user_key` owns a live session younger
    /// than the cooldown.
    pub fn ensure_cooldown_elapsed(&self, user_key: &str) -> Result<(), RelayError> {
        let sessions = self.sessions.lock();
        self.check_cooldown(&sessions, user_key)
    }

    /// Stores a new session for `user_key`. The cooldown is re-checked under
    /// the same lock as the insert, so two racing creates cannot both win.
    pub fn create(&self, user_key: &str, qr_id: &str) -> Result<Session, RelayError> {
        if qr_id.trim().is_empty() {
            return Err(RelayError::InvalidSession("empty qr id".to_string()));
        }

        let mut sessions = self.sessions.lock();
        self.check_cooldown(&sessions, user_key)?;

        let session = Session::new(
            Uuid::new_v4().simple().to_string(),
            user_key.to_string(),
            qr_id.to_string(),
        );
        sessions.insert(session.id.clone(), session.clone());

        debug!("Created session {} for user {}", session.id, user_key);
        Ok(session)
    }

    /// Returns a snapshot of a live session.
    pub fn get(&self, id: &str) -> Result<Session, RelayError> {
        let sessions = self.sessions.lock();
        sessions
            .get(id)
            .filter(|s| !s.is_expired(self.ttl))
            .cloned()
            .ok_or(RelayError::NotFound)
    }

    pub fn merge_cookies(&self, id: &str, incoming: &CookieMap) {
        if incoming.is_empty() {
            return;
        }
        self.update(id, |session| cookies::merge(&mut session.cookies, incoming));
    }

    /// Empty tokens are ignored.
    pub fn set_token(&self, id: &str, token: &str) {
        if token.is_empty() {
            return;
        }
        self.update(id, |session| session.qr_token = Some(token.to_string()));
    }

    pub fn set_status(&self, id: &str, status: SessionStatus) {
        self.update(id, |session| {
            // a finished login is terminal
            if session.status != SessionStatus::LoggedIn {
                session.status = status;
            }
        });
    }

    pub fn set_result(&self, id: &str, cookie: &str) {
        self.update(id, |session| {
            session.result_cookie = Some(cookie.to_string());
            session.status = SessionStatus::LoggedIn;
        });
    }

    /// Drops every session older than the TTL. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl));
        let removed = before.saturating_sub(sessions.len());

        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }

    /// Physically stored sessions, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(id).filter(|s| !s.is_expired(self.ttl)) {
            f(session);
        }
    }

    fn check_cooldown(
        &self,
        sessions: &HashMap<SessionId, Session>,
        user_key: &str,
    ) -> Result<(), RelayError> {
        let youngest = sessions
            .values()
            .filter(|s| s.user_key == user_key && !s.is_expired(self.ttl))
            .map(|s| s.age())
            .min();

        match youngest {
            Some(age) if age < self.cooldown => {
                let remaining = self.cooldown - age;
                Err(RelayError::Cooldown {
                    retry_after_secs: remaining.as_secs().max(1),
                })
            }
            _ => Ok(()),
        }
    }
}
