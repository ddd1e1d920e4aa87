//! Client metadata extraction

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::models::ClientInfo;

const MAX_USER_AGENT_LEN: usize = 512;

/// Client IP from proxy headers, first hop of `x-forwarded-for` wins
///
/// Header values are client controlled; anything that does not parse as an IP
/// address is ignored.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    header_ip(headers, "x-forwarded-for")
        .or_else(|| header_ip(headers, "x-real-ip"))
        .map(|ip| ip.to_string())
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = forwarded_client_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Ok(ClientInfo { addr, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(forwarded_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(forwarded_client_ip(&headers).as_deref(), Some("198.51.100.2"));
        assert_eq!(forwarded_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_garbage_hops_are_ignored() {
        let mut headers = HeaderMap::new();
        let oversized = "a".repeat(200);
        headers.insert("x-forwarded-for", HeaderValue::from_str(&oversized).unwrap());
        assert_eq!(forwarded_client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(forwarded_client_ip(&headers).as_deref(), Some("2001:db8::1"));

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(forwarded_client_ip(&headers), None);
    }

    #[tokio::test]
    async fn test_garbage_header_falls_back_to_peer_address() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "x".repeat(100))
            .extension(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000))))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let info = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(info.addr.as_deref(), Some("192.0.2.10"));
        assert!(info.addr.unwrap().len() <= 64);
    }
}
