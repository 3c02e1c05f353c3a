use serde::Serialize;
use tokio::time::Instant;

use crate::utils::CookieMap;

pub type SessionId = String;

/// Lifecycle of one QR login attempt as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Created,
    New,
    Pending,
    Scanned,
    Confirmed,
    Expired,
    LoggedIn,
}

impl SessionStatus {
    /// Maps the provider's status string. Unknown or missing values are
    /// treated as "still waiting".
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("NEW") => Self::New,
            Some(s) if s.eq_ignore_ascii_case("SCANNED") => Self::Scanned,
            Some(s) if s.eq_ignore_ascii_case("CONFIRMED") => Self::Confirmed,
            Some(s) if s.eq_ignore_ascii_case("EXPIRED") => Self::Expired,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::New => "NEW",
            Self::Pending => "PENDING",
            Self::Scanned => "SCANNED",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
            Self::LoggedIn => "LOGGED_IN",
        }
    }
}

/// Relay-side record tying a provider QR code to the cookies and token
/// collected while the user scans it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_key: String,
    /// Provider QR id. Never empty.
    pub qr_id: String,
    pub qr_token: Option<String>,
    pub cookies: CookieMap,
    pub created_at: Instant,
    pub result_cookie: Option<String>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(id: SessionId, user_key: String, qr_id: String) -> Self {
        Self {
            id,
            user_key,
            qr_id,
            qr_token: None,
            cookies: CookieMap::new(),
            created_at: Instant::now(),
            result_cookie: None,
            status: SessionStatus::Created,
        }
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Strictly older than `ttl`.
    pub fn is_expired(&self, ttl: std::time::Duration) -> bool {
        self.age() > ttl
    }

    pub fn has_token(&self) -> bool {
        self.qr_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}
