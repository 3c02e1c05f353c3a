use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::models::SessionStatus;
use crate::security::ClientIdentity;
use crate::services::RelayService;
use crate::utils::{cookies, CookieMap, RelayError};

#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub success: bool,
    pub session_id: String,
    pub qr_image: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: SessionStatus,
    pub has_token: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub cookie: String,
    pub cookies: CookieMap,
    pub cookie_string: String,
}

#[derive(Debug, Serialize)]
pub struct CookiesResponse {
    pub success: bool,
    pub cookies: CookieMap,
    pub cookie_string: String,
    pub has_spc_st: bool,
}

/// Session ids we hand out are hex; anything outside this shape is not a
/// lookup worth doing.
fn validate_session_id(sid: &str) -> Result<&str, RelayError> {
    let valid = !sid.is_empty()
        && sid.len() <= 64
        && sid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(sid)
    } else {
        Err(RelayError::InvalidSession("malformed session id".to_string()))
    }
}

/// The body is optional; `{}` and an empty body both mean "anonymous".
fn parse_create_request(body: &[u8]) -> Result<CreateRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidSession(format!("malformed request body: {}", e)))
}

/// POST /api/qr/create
pub async fn create_handler(
    State(relay): State<Arc<RelayService>>,
    ClientIdentity(client): ClientIdentity,
    body: Bytes,
) -> Result<Json<CreateResponse>, RelayError> {
    let request = parse_create_request(&body)?;
    let user_key = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(relay.default_user_key())
        .to_string();

    info!("QR create requested by {} (user {})", client, user_key);
    let created = relay.create(&user_key, &client).await?;

    Ok(Json(CreateResponse {
        success: true,
        session_id: created.session_id,
        qr_image: created.qr_image,
    }))
}

/// GET /api/qr/status/{sid}
pub async fn status_handler(
    State(relay): State<Arc<RelayService>>,
    Path(sid): Path<String>,
) -> Result<Json<StatusResponse>, RelayError> {
    let outcome = relay.poll(validate_session_id(&sid)?).await?;

    Ok(Json(StatusResponse {
        success: true,
        status: outcome.status,
        has_token: outcome.has_token,
    }))
}

/// POST /api/qr/login/{sid}
pub async fn login_handler(
    State(relay): State<Arc<RelayService>>,
    Path(sid): Path<String>,
) -> Result<Json<LoginResponse>, RelayError> {
    let outcome = relay.login(validate_session_id(&sid)?).await?;

    Ok(Json(LoginResponse {
        success: true,
        cookie: outcome.cookie,
        cookie_string: cookies::cookie_string(&outcome.cookies),
        cookies: outcome.cookies,
    }))
}

/// GET /api/qr/cookies/{sid}
pub async fn cookies_handler(
    State(relay): State<Arc<RelayService>>,
    Path(sid): Path<String>,
) -> Result<Json<CookiesResponse>, RelayError> {
    let snapshot = relay.cookies(validate_session_id(&sid)?)?;

    Ok(Json(CookiesResponse {
        success: true,
        cookie_string: cookies::cookie_string(&snapshot.cookies),
        cookies: snapshot.cookies,
        has_spc_st: snapshot.has_auth_cookie,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("3f2a9c0d4e5b46a7b8c9d0e1f2a3b4c5").is_ok());
        assert!(validate_session_id("does-not-exist").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../../etc").is_err());
        assert!(validate_session_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_parse_create_request() {
        assert_eq!(parse_create_request(b"").unwrap().user_id, None);
        assert_eq!(parse_create_request(b"  \n").unwrap().user_id, None);
        assert_eq!(parse_create_request(b"{}").unwrap().user_id, None);
        assert_eq!(
            parse_create_request(br#"{"user_id":"u1"}"#).unwrap().user_id.as_deref(),
            Some("u1")
        );
        assert!(matches!(
            parse_create_request(b"{not json"),
            Err(RelayError::InvalidSession(_))
        ));
    }
}
