//! Cookie parsing and `Set-Cookie` construction
//!
//! Owner sessions and executor identity ride in httpOnly cookies.
//! Values are opaque ids or URL-encoded strings, never JSON.

use hyper::header::{HeaderMap, COOKIE};

/// Owner session id cookie
pub const OWNER_SESSION_COOKIE: &str = "heirloom_session";
/// Executor email captured at federated login
pub const EXECUTOR_EMAIL_COOKIE: &str = "executor_email";
/// Executor federated subject id captured at federated login
pub const EXECUTOR_GOOGLE_ID_COOKIE: &str = "executor_google_id";
/// Signed executor session; the only executor cookie trusted for access
pub const EXECUTOR_SESSION_COOKIE: &str = "executor_session";

/// Find a cookie value in the request's `Cookie` headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Attributes shared by every cookie we set
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    /// Adds `Secure`; off in dev mode so plain-http localhost works
    pub secure: bool,
}

impl CookiePolicy {
    /// httpOnly, path `/`, SameSite=Lax cookie living `max_age_secs`
    pub fn set(&self, name: &str, value: &str, max_age_secs: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            name,
            urlencoding::encode(value),
            max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Expire a cookie immediately
    pub fn clear(&self, name: &str) -> String {
        self.set(name, "", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_get_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; executor_email=a%40x.com; heirloom_session=abc"),
        );

        assert_eq!(get_cookie(&headers, OWNER_SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(get_cookie(&headers, EXECUTOR_EMAIL_COOKIE).as_deref(), Some("a@x.com"));
        assert_eq!(get_cookie(&headers, EXECUTOR_GOOGLE_ID_COOKIE), None);
    }

    #[test]
    fn test_empty_value_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("heirloom_session="));
        assert_eq!(get_cookie(&headers, OWNER_SESSION_COOKIE), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let prod = CookiePolicy { secure: true };
        let cookie = prod.set(EXECUTOR_EMAIL_COOKIE, "a@x.com", 60);
        assert_eq!(
            cookie,
            "executor_email=a%40x.com; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );

        let dev = CookiePolicy { secure: false };
        assert!(!dev.clear(OWNER_SESSION_COOKIE).contains("Secure"));
        assert!(dev.clear(OWNER_SESSION_COOKIE).contains("Max-Age=0"));
    }
}
