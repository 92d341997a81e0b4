use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Expiry;
use crate::error::AuthError;

/// HTTP cookie captured from an authentication response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub expiry: Option<Expiry>,
    pub http_only: bool,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            url: None,
            expiry: None,
            http_only: false,
            secure: false,
        }
    }

    /// Parse one `Set-Cookie` header value received from `url`.
    ///
    /// `Max-Age` wins over `Expires`; an unreadable `Expires` date is ignored.
    pub fn parse_set_cookie(header: &str, url: Option<&str>) -> Result<Self, AuthError> {
        Self::parse_set_cookie_at(header, url, Utc::now())
    }

    pub fn parse_set_cookie_at(
        header: &str,
        url: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let mut parts = header.split(';');
        let pair = parts.next().unwrap_or_default();
        let (name, value) = pair
            .split_once('=')
            .map(|(n, v)| (n.trim(), v.trim()))
            .filter(|(n, _)| !n.is_empty())
            .ok_or_else(|| AuthError::Protocol(format!("invalid Set-Cookie header: {header}")))?;

        let mut cookie = Cookie::new(name, value.trim_matches('"'));
        cookie.url = url.map(str::to_string);

        let mut max_age = None;
        let mut expires = None;
        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attribute.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("domain", Some(domain)) if !domain.is_empty() => {
                    cookie.domain = Some(domain.trim_start_matches('.').to_ascii_lowercase());
                }
                ("path", Some(path)) if !path.is_empty() => cookie.path = Some(path.to_string()),
                ("max-age", Some(secs)) => max_age = secs.parse::<i64>().ok(),
                ("expires", Some(date)) => {
                    expires = DateTime::parse_from_rfc2822(date)
                        .ok()
                        .map(|at| at.with_timezone(&Utc));
                }
                ("httponly", _) => cookie.http_only = true,
                ("secure", _) => cookie.secure = true,
                _ => {}
            }
        }

        cookie.expiry = match (max_age, expires) {
            (Some(secs), _) => Some(Expiry::after_secs(secs, received_at)),
            (None, Some(at)) => Some(Expiry::At { at }),
            (None, None) => None,
        };
        Ok(cookie)
    }

    /// Session cookies (no expiry) never expire.
    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| expiry.is_elapsed(Utc::now()))
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("url", &self.url)
            .field("expiry", &self.expiry)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_full_set_cookie_header() {
        let now = Utc::now();
        let cookie = Cookie::parse_set_cookie_at(
            "OAMAuthnCookie=abc123; Domain=.Example.com; Path=/; Max-Age=3600; HttpOnly; Secure",
            Some("https://example.com/login"),
            now,
        )
        .unwrap();

        assert_eq!(cookie.name, "OAMAuthnCookie");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.url.as_deref(), Some("https://example.com/login"));
        assert_eq!(cookie.expiry, Some(Expiry::after_secs(3600, now)));
        assert!(cookie.http_only);
        assert!(cookie.secure);
    }

    #[test]
    fn expires_attribute_is_absolute() {
        let cookie =
            Cookie::parse_set_cookie("sid=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT", None).unwrap();
        let expected = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(cookie.expiry, Some(Expiry::At { at: expected }));
        assert!(cookie.is_expired());
    }

    #[test]
    fn huge_max_age_keeps_cookie_alive() {
        let cookie =
            Cookie::parse_set_cookie("sid=1; Max-Age=9223372036854775807", None).unwrap();
        assert!(!cookie.is_expired());

        let gone = Cookie::parse_set_cookie("sid=1; Max-Age=-9223372036854775808", None).unwrap();
        assert!(gone.is_expired());
    }

    #[test]
    fn session_cookie_has_no_expiry() {
        let cookie = Cookie::parse_set_cookie("sid=\"quoted\"", None).unwrap();
        assert_eq!(cookie.value, "quoted");
        assert!(cookie.expiry.is_none());
        assert!(!cookie.is_expired());
    }

    #[test]
    fn header_without_pair_is_rejected() {
        assert!(matches!(
            Cookie::parse_set_cookie("; Path=/", None),
            Err(AuthError::Protocol(_))
        ));
    }
}
