use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::debug;

/// Whether `X-Forwarded-For` comes from a proxy we control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyTrust(pub bool);

/// Who is calling, for rate limiting purposes.
///
/// The peer address by default. With a trusted proxy in front, the
/// right-most `X-Forwarded-For` entry, which is the one the proxy appended.
/// `unknown` when neither is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    fn from_headers(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all("X-Forwarded-For")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .last()
            .and_then(|v| v.rsplit(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn from_peer(parts: &Parts) -> Option<String> {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    ProxyTrust: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ProxyTrust(trusted) = ProxyTrust::from_ref(state);

        let forwarded = if trusted {
            Self::from_headers(&parts.headers)
        } else {
            None
        };
        let identity = forwarded
            .or_else(|| Self::from_peer(parts))
            .unwrap_or_else(|| "unknown".to_string());

        debug!("Request from client {}", identity);
        Ok(ClientIdentity(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn identify(request: Request<()>, trust: bool) -> String {
        let (mut parts, _) = request.into_parts();
        let ClientIdentity(id) = ClientIdentity::from_request_parts(&mut parts, &ProxyTrust(trust))
            .await
            .unwrap();
        id
    }

    fn peer(ip: [u8; 4]) -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from((ip, 4000)))
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_by_default() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7")
            .extension(peer([127, 0, 0, 1]))
            .body(())
            .unwrap();
        assert_eq!(identify(request, false).await, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_trusted_proxy_uses_rightmost_entry() {
        let request = Request::builder()
            .header("X-Forwarded-For", "6.6.6.6, 203.0.113.7")
            .extension(peer([10, 0, 0, 2]))
            .body(())
            .unwrap();
        assert_eq!(identify(request, true).await, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_trusted_proxy_without_header_uses_peer() {
        let request = Request::builder()
            .extension(peer([192, 168, 1, 9]))
            .body(())
            .unwrap();
        assert_eq!(identify(request, true).await, "192.168.1.9");
    }

    #[tokio::test]
    async fn test_unknown_without_any_source() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(identify(request, false).await, "unknown");
    }
}
