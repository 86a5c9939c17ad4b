pub mod auth;
pub mod health;
pub mod records;

pub use self::health::{health, root};

// common functions for the handlers
use axum::http::HeaderMap;
use regex::Regex;

use crate::auth::RequestContext;
pub use crate::authz::client_ip;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// Build the request context the engine records on sessions and lockout
/// rows. The service sits behind a proxy, so the client ip comes from
/// forwarding headers, never the socket address.
#[must_use]
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        ip: client_ip(headers),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::{client_ip, request_context, valid_email};
    use axum::http::HeaderMap;

    #[test]
    fn email_shape_check() {
        assert!(valid_email("teacher@school.edu"));
        assert!(!valid_email("teacher@school"));
        assert!(!valid_email("not an email"));
        assert!(!valid_email("@school.edu"));
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn no_headers_means_no_ip() {
        let headers = HeaderMap::new();
        let ctx = request_context(&headers);
        assert!(ctx.ip.is_none());
        assert!(ctx.user_agent.is_none());
    }

    #[test]
    fn user_agent_is_captured() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "aula-test/1.0".parse().unwrap());
        let ctx = request_context(&headers);
        assert_eq!(ctx.user_agent.as_deref(), Some("aula-test/1.0"));
    }
}
