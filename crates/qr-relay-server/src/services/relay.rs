use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::models::{SessionId, SessionStatus};
use crate::services::rate_limiter::RateLimiter;
use crate::services::session_store::SessionStore;
use crate::services::upstream::QrProvider;
use crate::utils::{cookies, CookieMap, RelayError};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub qr_image: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub status: SessionStatus,
    pub has_token: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    /// `NAME=value` of the auth cookie.
    pub cookie: String,
    pub cookies: CookieMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CookieSnapshot {
    pub cookies: CookieMap,
    pub has_auth_cookie: bool,
}

/// Drives create -> poll -> login for each relayed QR login.
pub struct RelayService {
    store: SessionStore,
    limiter: RateLimiter,
    provider: Arc<dyn QrProvider>,
    config: RelayConfig,
}

impl RelayService {
    pub fn new(provider: Arc<dyn QrProvider>, config: RelayConfig) -> Self {
        Self {
            store: SessionStore::new(config.session_ttl(), config.qr_cooldown()),
            limiter: RateLimiter::new(config.rate_window()),
            provider,
            config,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn default_user_key(&self) -> &str {
        &self.config.default_user_key
    }

    /// Expired sessions and idle rate windows. Cheap enough to run before
    /// every request.
    pub fn sweep(&self) -> (usize, usize) {
        (self.store.sweep_expired(), self.limiter.cleanup())
    }

    pub async fn create(&self, user_key: &str, client_key: &str) -> Result<CreatedSession, RelayError> {
        self.store.sweep_expired();

        if !self.limiter.check(client_key, self.config.rate_limit_per_window) {
            warn!("Rate limit hit by {}", client_key);
            return Err(RelayError::RateLimited);
        }
        self.store.ensure_cooldown_elapsed(user_key)?;

        let qr = self.provider.generate_qr().await?;

        let session = self.store.create(user_key, &qr.qr_id)?;
        self.store.merge_cookies(&session.id, &qr.cookies);

        info!("Session {} created for user {} (qr {})", session.id, user_key, qr.qr_id);

        Ok(CreatedSession {
            session_id: session.id,
            qr_image: Self::data_url(&qr.qr_image_base64),
        })
    }

    pub async fn poll(&self, session_id: &str) -> Result<PollOutcome, RelayError> {
        self.store.sweep_expired();
        let session = self.store.get(session_id)?;

        if session.status == SessionStatus::LoggedIn {
            return Ok(PollOutcome {
                status: SessionStatus::LoggedIn,
                has_token: session.has_token(),
            });
        }

        let observed = self.provider.check_status(&session.qr_id, &session.cookies).await?;

        self.store.merge_cookies(session_id, &observed.cookies);
        if let Some(token) = observed.token.as_deref() {
            self.store.set_token(session_id, token);
        }
        self.store.set_status(session_id, observed.status);

        let has_token = session.has_token() || observed.token.as_deref().is_some_and(|t| !t.is_empty());
        debug!("Session {} polled: {} (token: {})", session_id, observed.status.as_str(), has_token);

        Ok(PollOutcome {
            status: observed.status,
            has_token,
        })
    }

    pub async fn login(&self, session_id: &str) -> Result<LoginOutcome, RelayError> {
        self.store.sweep_expired();
        let session = self.store.get(session_id)?;

        let token = session
            .qr_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RelayError::TokenNotReady)?;

        let exchange = self.provider.exchange_token(token, &session.cookies).await?;

        self.store.merge_cookies(session_id, &exchange.cookies);
        let cookie = format!("{}={}", self.provider.auth_cookie_name(), exchange.auth_value);
        self.store.set_result(session_id, &cookie);

        let mut all = session.cookies;
        cookies::merge(&mut all, &exchange.cookies);
        all.insert(self.provider.auth_cookie_name().to_string(), exchange.auth_value);

        info!("Session {} logged in", session_id);

        Ok(LoginOutcome { cookie, cookies: all })
    }

    pub fn cookies(&self, session_id: &str) -> Result<CookieSnapshot, RelayError> {
        let session = self.store.get(session_id)?;
        let has_auth_cookie = session
            .cookies
            .get(self.provider.auth_cookie_name())
            .is_some_and(|v| !v.is_empty())
            || session.result_cookie.is_some();

        let mut cookies = session.cookies;
        if let Some((name, value)) = session.result_cookie.as_deref().and_then(|c| c.split_once('=')) {
            cookies.entry(name.to_string()).or_insert_with(|| value.to_string());
        }

        Ok(CookieSnapshot {
            cookies,
            has_auth_cookie,
        })
    }

    fn data_url(image: &str) -> String {
        if image.starts_with("data:") {
            image.to_string()
        } else {
            format!("{}{}", PNG_DATA_URL_PREFIX, image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upstream::{MockQrProvider, QrCode, QrStatus, TokenExchange};
    use std::time::Duration;

    fn jar(pairs: &[(&str, &str)]) -> CookieMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provider() -> MockQrProvider {
        let mut provider = MockQrProvider::new();
        provider
            .expect_auth_cookie_name()
            .return_const("SPC_ST".to_string());
        provider
    }

    fn expect_generate(provider: &mut MockQrProvider) {
        provider.expect_generate_qr().returning(|| {
            Ok(QrCode {
                qr_id: "Q1".to_string(),
                qr_image_base64: "iVBORw0KGgo=".to_string(),
                cookies: jar(&[("SPC_F", "f1")]),
            })
        });
    }

    fn service(provider: MockQrProvider) -> RelayService {
        RelayService::new(Arc::new(provider), RelayConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_returns_data_url_and_keeps_cookies() {
        let mut provider = provider();
        expect_generate(&mut provider);
        let relay = service(provider);

        let created = relay.create("u1", "10.0.0.1").await.unwrap();
        assert_eq!(created.qr_image, "data:image/png;base64,iVBORw0KGgo=");

        let snapshot = relay.cookies(&created.session_id).unwrap();
        assert_eq!(snapshot.cookies, jar(&[("SPC_F", "f1")]));
        assert!(!snapshot.has_auth_cookie);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_passes_existing_data_url_through() {
        let mut provider = provider();
        provider.expect_generate_qr().returning(|| {
            Ok(QrCode {
                qr_id: "Q1".to_string(),
                qr_image_base64: "data:image/png;base64,AAAA".to_string(),
                cookies: CookieMap::new(),
            })
        });
        let relay = service(provider);

        let created = relay.create("u1", "ip").await.unwrap();
        assert_eq!(created.qr_image, "data:image/png;base64,AAAA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_cooldown_skips_upstream() {
        let mut provider = provider();
        provider.expect_generate_qr().times(1).returning(|| {
            Ok(QrCode {
                qr_id: "Q1".to_string(),
                qr_image_base64: "x".to_string(),
                cookies: CookieMap::new(),
            })
        });
        let relay = service(provider);

        relay.create("u1", "ip-a").await.unwrap();
        let err = relay.create("u1", "ip-b").await.unwrap_err();
        assert!(matches!(err, RelayError::Cooldown { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rate_limited_per_client() {
        let mut provider = provider();
        expect_generate(&mut provider);
        let relay = service(provider);

        for i in 0..10 {
            relay.create(&format!("user-{}", i), "ip").await.unwrap();
        }
        assert_eq!(
            relay.create("user-new", "ip").await.unwrap_err(),
            RelayError::RateLimited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_creates_nothing() {
        let mut provider = provider();
        provider
            .expect_generate_qr()
            .returning(|| Err(RelayError::UpstreamUnavailable("HTTP 500".to_string())));
        let relay = service(provider);

        assert!(matches!(
            relay.create("u1", "ip").await,
            Err(RelayError::UpstreamUnavailable(_))
        ));
        assert!(relay.store().is_empty());
        // a failed generate does not start the cooldown
        assert!(relay.store().ensure_cooldown_elapsed("u1").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_null_data_is_pending() {
        let mut provider = provider();
        expect_generate(&mut provider);
        provider
            .expect_check_status()
            .withf(|qr_id, cookies| qr_id == "Q1" && cookies.contains_key("SPC_F"))
            .returning(|_, _| {
                Ok(QrStatus {
                    status: SessionStatus::Pending,
                    token: None,
                    cookies: CookieMap::new(),
                })
            });
        let relay = service(provider);

        let created = relay.create("u1", "ip").await.unwrap();
        let outcome = relay.poll(&created.session_id).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome {
                status: SessionStatus::Pending,
                has_token: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_flow() {
        let mut provider = provider();
        expect_generate(&mut provider);
        let mut seq = mockall::Sequence::new();
        provider
            .expect_check_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(QrStatus {
                    status: SessionStatus::New,
                    token: None,
                    cookies: CookieMap::new(),
                })
            });
        provider
            .expect_check_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(QrStatus {
                    status: SessionStatus::Confirmed,
                    token: Some("T".to_string()),
                    cookies: jar(&[("SPC_SC_TK", "sc")]),
                })
            });
        provider
            .expect_exchange_token()
            .withf(|token, cookies| token == "T" && cookies.contains_key("SPC_SC_TK"))
            .times(1)
            .returning(|_, _| {
                Ok(TokenExchange {
                    cookies: jar(&[("SPC_ST", "abc123"), ("SPC_EC", "ec")]),
                    auth_value: "abc123".to_string(),
                })
            });
        let relay = service(provider);

        let created = relay.create("u1", "ip").await.unwrap();
        let sid = created.session_id;

        let first = relay.poll(&sid).await.unwrap();
        assert_eq!(first.status, SessionStatus::New);
        assert!(!first.has_token);

        let second = relay.poll(&sid).await.unwrap();
        assert_eq!(second.status, SessionStatus::Confirmed);
        assert!(second.has_token);

        let login = relay.login(&sid).await.unwrap();
        assert_eq!(login.cookie, "SPC_ST=abc123");
        assert_eq!(
            login.cookies,
            jar(&[
                ("SPC_EC", "ec"),
                ("SPC_F", "f1"),
                ("SPC_SC_TK", "sc"),
                ("SPC_ST", "abc123")
            ])
        );

        // logged-in sessions answer without another upstream call
        let after = relay.poll(&sid).await.unwrap();
        assert_eq!(after.status, SessionStatus::LoggedIn);

        let snapshot = relay.cookies(&sid).unwrap();
        assert!(snapshot.has_auth_cookie);
        assert_eq!(snapshot.cookies.get("SPC_ST").map(String::as_str), Some("abc123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_token() {
        let mut provider = provider();
        expect_generate(&mut provider);
        provider.expect_exchange_token().never();
        let relay = service(provider);

        let created = relay.create("u1", "ip").await.unwrap();
        assert_eq!(
            relay.login(&created.session_id).await.unwrap_err(),
            RelayError::TokenNotReady
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_expired_sessions() {
        let mut provider = provider();
        expect_generate(&mut provider);
        provider.expect_check_status().never();
        let relay = service(provider);

        assert_eq!(relay.poll("does-not-exist").await.unwrap_err(), RelayError::NotFound);
        assert_eq!(relay.login("does-not-exist").await.unwrap_err(), RelayError::NotFound);
        assert_eq!(relay.cookies("does-not-exist").unwrap_err(), RelayError::NotFound);

        let created = relay.create("u1", "ip").await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(relay.poll(&created.session_id).await.unwrap_err(), RelayError::NotFound);
        assert!(relay.store().is_empty());
    }
}
