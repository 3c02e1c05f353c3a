use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::models::SessionStatus;
use crate::utils::{cookies, url, CookieMap, RelayError};

/// A freshly issued QR code.
#[derive(Debug, Clone, PartialEq)]
pub struct QrCode {
    pub qr_id: String,
    pub qr_image_base64: String,
    pub cookies: CookieMap,
}

/// One status observation. `token` is set once the user confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct QrStatus {
    pub status: SessionStatus,
    pub token: Option<String>,
    pub cookies: CookieMap,
}

/// Result of trading a confirmed token for the auth cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenExchange {
    pub cookies: CookieMap,
    pub auth_value: String,
}

/// The QR login provider as the relay sees it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QrProvider: Send + Sync {
    async fn generate_qr(&self) -> Result<QrCode, RelayError>;

    async fn check_status(&self, qr_id: &str, cookies: &CookieMap) -> Result<QrStatus, RelayError>;

    async fn exchange_token(&self, token: &str, cookies: &CookieMap) -> Result<TokenExchange, RelayError>;

    /// Cookie that carries the authenticated session, e.g. `SPC_ST`.
    fn auth_cookie_name(&self) -> &str;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    qrcode_token: &'a str,
    device_fingerprint: &'a str,
}

/// Decoded `{error, error_msg, data}` envelope plus every cookie the
/// response tried to set.
#[derive(Debug)]
struct UpstreamReply {
    data: Option<Value>,
    /// Cookies as parsed by reqwest.
    jar: CookieMap,
    /// Cookies from our own `Set-Cookie` parse (superset of `jar` in practice).
    cookies: CookieMap,
    raw_set_cookie: Vec<String>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(Self::header_profile(&config))
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Configured header set. Entries that are not valid HTTP headers are
    /// skipped with a warning.
    fn header_profile(config: &UpstreamConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping invalid upstream header: {}", name),
            }
        }
        headers
    }

    fn with_cookies(request: RequestBuilder, jar: &CookieMap) -> RequestBuilder {
        if jar.is_empty() {
            return request;
        }
        request.header(COOKIE, cookies::cookie_string(jar))
    }

    async fn send(&self, request: RequestBuilder, op: &'static str) -> Result<UpstreamReply, RelayError> {
        let response = request
            .send()
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(format!("{} request failed: {}", op, e)))?;

        Self::read_reply(response, op).await
    }

    async fn read_reply(response: Response, op: &'static str) -> Result<UpstreamReply, RelayError> {
        let status = response.status();
        if !status.is_success() {
            warn!("Upstream {} returned HTTP {}", op, status);
            return Err(RelayError::UpstreamUnavailable(format!("HTTP {}", status.as_u16())));
        }

        let raw_set_cookie: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let jar: CookieMap = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let mut parsed = cookies::from_set_cookie_headers(raw_set_cookie.iter().map(String::as_str));
        cookies::merge(&mut parsed, &jar);

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(format!("{} body read failed: {}", op, e)))?;

        let envelope = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!("Upstream {} returned a non-object body", op);
                return Err(RelayError::UpstreamUnavailable("invalid-json".to_string()));
            }
        };

        if let Some(code) = Self::rejection_code(envelope.get("error")) {
            let msg = envelope
                .get("error_msg")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("error {}", code));
            warn!("Upstream {} rejected: {}", op, msg);
            return Err(RelayError::UpstreamRejected(msg));
        }

        let data = envelope.get("data").cloned().filter(|d| !d.is_null());
        debug!(
            "Upstream {} ok: data={}, cookies={}",
            op,
            data.is_some(),
            parsed.len()
        );

        Ok(UpstreamReply {
            data,
            jar,
            cookies: parsed,
            raw_set_cookie,
        })
    }

    /// `None` when the envelope reports success. The provider is not
    /// consistent about the type, so `"0"` and `0` both count as success and
    /// any other value as a rejection.
    fn rejection_code(error: Option<&Value>) -> Option<String> {
        match error? {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::String(s) if s.trim().is_empty() || s.trim() == "0" => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }

    fn non_empty_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl QrProvider for UpstreamClient {
    async fn generate_qr(&self) -> Result<QrCode, RelayError> {
        let endpoint = url::with_cache_buster(&self.config.endpoint(&self.config.generate_path));
        let reply = self.send(self.client.get(&endpoint), "generate").await?;

        let data = reply
            .data
            .ok_or_else(|| RelayError::UpstreamRejected("empty-data".to_string()))?;

        match (
            Self::non_empty_str(&data, "qrcode_id"),
            Self::non_empty_str(&data, "qrcode_base64"),
        ) {
            (Some(qr_id), Some(image)) => Ok(QrCode {
                qr_id: qr_id.to_string(),
                qr_image_base64: image.to_string(),
                cookies: reply.cookies,
            }),
            _ => Err(RelayError::UpstreamRejected("empty-data".to_string())),
        }
    }

    async fn check_status(&self, qr_id: &str, jar: &CookieMap) -> Result<QrStatus, RelayError> {
        let mut status_url = Url::parse(&self.config.endpoint(&self.config.status_path))
            .map_err(|e| RelayError::Internal(format!("Bad status endpoint: {}", e)))?;
        status_url.query_pairs_mut().append_pair("qrcode_id", qr_id);

        let endpoint = url::with_cache_buster(status_url.as_str());
        let request = self.client.get(&endpoint);
        let reply = self.send(Self::with_cookies(request, jar), "status").await?;

        // Unscanned codes come back as `data: null`
        let Some(data) = reply.data else {
            return Ok(QrStatus {
                status: SessionStatus::Pending,
                token: None,
                cookies: reply.cookies,
            });
        };

        Ok(QrStatus {
            status: SessionStatus::from_provider(data.get("status").and_then(Value::as_str)),
            token: Self::non_empty_str(&data, "qrcode_token").map(str::to_string),
            cookies: reply.cookies,
        })
    }

    async fn exchange_token(&self, token: &str, jar: &CookieMap) -> Result<TokenExchange, RelayError> {
        let endpoint = self.config.endpoint(&self.config.login_path);
        let body = LoginRequest {
            qrcode_token: token,
            device_fingerprint: &self.config.device_fingerprint,
        };
        let request = self.client.post(&endpoint).json(&body);
        let reply = self.send(Self::with_cookies(request, jar), "login").await?;

        let name = self.auth_cookie_name();
        let mut merged = jar.clone();
        cookies::merge(&mut merged, &reply.cookies);

        let auth_value = reply
            .jar
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| cookies::find_in_raw(reply.raw_set_cookie.iter().map(String::as_str), name))
            .or_else(|| jar.get(name).filter(|v| !v.is_empty()).cloned())
            .or_else(|| merged.get(name).filter(|v| !v.is_empty()).cloned());

        match auth_value {
            Some(auth_value) => Ok(TokenExchange {
                cookies: reply.cookies,
                auth_value,
            }),
            None => {
                warn!("Login response carried no {} in any source", name);
                Err(RelayError::LoginFailed(name.to_string()))
            }
        }
    }

    fn auth_cookie_name(&self) -> &str {
        &self.config.auth_cookie_name
    }
}
