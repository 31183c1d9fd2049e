//! Request key extractors.

use crate::constants::rate_limit::ANONYMOUS_KEY;
use axum::extract::{ConnectInfo, Request};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Derives the throttling key for a request
pub type KeyExtractor = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Caller network identity
///
/// Checks `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket
/// address from `ConnectInfo`, falling back to a shared anonymous key.
pub fn client_ip(request: &Request) -> String {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded_for.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse::<IpAddr>() {
            return ip.to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    ANONYMOUS_KEY.to_string()
}

/// Use the named header when present, otherwise [`client_ip`]
///
/// The header is client-controlled. Only use it where rotating its value
/// cannot help a caller, such as keying login attempts by target account.
pub fn header_or_ip(header: &'static str) -> KeyExtractor {
    Arc::new(move |request: &Request| {
        request
            .headers()
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| client_ip(request))
    })
}

/// Caller identity verified by upstream authentication middleware
///
/// Only server-side code inserts this extension, so unlike a header it
/// cannot be chosen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Use the [`AuthenticatedUser`] extension when present, otherwise [`client_ip`]
pub fn authenticated_or_ip() -> KeyExtractor {
    Arc::new(|request: &Request| {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| format!("user:{}", user.0))
            .unwrap_or_else(|| client_ip(request))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_ip_precedence() {
        assert_eq!(
            client_ip(&request(&[
                ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
            ])),
            "203.0.113.9"
        );
        assert_eq!(
            client_ip(&request(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")])),
            "198.51.100.2"
        );
        assert_eq!(client_ip(&request(&[])), "anonymous");

        let mut with_socket = request(&[]);
        with_socket
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 443))));
        assert_eq!(client_ip(&with_socket), "192.0.2.7");
    }

    #[test]
    fn test_header_or_ip() {
        let extractor = header_or_ip("x-account-id");

        assert_eq!(extractor(&request(&[("x-account-id", "acct_42")])), "acct_42");
        assert_eq!(
            extractor(&request(&[("x-account-id", " "), ("x-real-ip", "198.51.100.2")])),
            "198.51.100.2"
        );
    }

    #[test]
    fn test_authenticated_identity_ignores_spoofable_headers() {
        let extractor = authenticated_or_ip();

        let spoofed = request(&[("x-user-id", "fresh-id-1"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(extractor(&spoofed), "198.51.100.2");

        let mut signed_in = request(&[("x-user-id", "someone-else")]);
        signed_in
            .extensions_mut()
            .insert(AuthenticatedUser("u_7".to_string()));
        assert_eq!(extractor(&signed_in), "user:u_7");
    }
}
