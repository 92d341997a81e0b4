//! Token model: plain tokens, OAuth tokens, Mobile & Social tokens, cookies.

pub mod cookie;
pub mod ms;
pub mod oauth;

pub use cookie::Cookie;
pub use ms::{AuxiliaryToken, OAuthMSToken};
pub use oauth::OAuthToken;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;

/// When a token or cookie stops being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expiry {
    /// Absolute instant.
    At { at: DateTime<Utc> },
    /// Duration counted from the moment the token was issued.
    AfterSecs { secs: i64, issued_at: DateTime<Utc> },
}

impl Expiry {
    pub fn after_secs(secs: i64, issued_at: DateTime<Utc>) -> Self {
        Self::AfterSecs { secs, issued_at }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        match *self {
            Self::At { at } => at,
            Self::AfterSecs { secs, issued_at } => offset_secs(issued_at, secs),
        }
    }

    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// `at` shifted by `secs`, clamped to the representable range.
pub(crate) fn offset_secs(at: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    Duration::try_seconds(secs)
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(if secs > 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

/// Base token: a named value with an optional expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub value: String,
    pub expiry: Option<Expiry>,
}

impl Token {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// A token without expiry never expires.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry.is_elapsed(now))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Slot a token occupies in an authentication context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    OAuthAccess,
    PreAuthzCode,
}

/// Any token kept in an authentication context.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthToken {
    Plain(Token),
    OAuth(OAuthToken),
    OAuthMS(OAuthMSToken),
}

impl AuthToken {
    pub fn token(&self) -> &Token {
        match self {
            Self::Plain(token) => token,
            Self::OAuth(token) => &token.token,
            Self::OAuthMS(token) => &token.oauth.token,
        }
    }

    pub fn oauth(&self) -> Option<&OAuthToken> {
        match self {
            Self::Plain(_) => None,
            Self::OAuth(token) => Some(token),
            Self::OAuthMS(token) => Some(&token.oauth),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.token().is_expired()
    }

    /// Unexpired and, for OAuth tokens, granted every required scope.
    pub fn is_valid_for(&self, required_scopes: &BTreeSet<String>) -> bool {
        match self.oauth() {
            Some(oauth) => oauth.is_valid_for(required_scopes),
            None => !self.is_expired() && required_scopes.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload helpers shared by the token parsers
// ---------------------------------------------------------------------------

pub(crate) fn parse_object(payload: &str) -> Result<Map<String, Value>, AuthError> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuthError::MalformedToken(
            "token payload is not a JSON object".into(),
        )),
        Err(err) => Err(AuthError::MalformedToken(err.to_string())),
    }
}

/// Non-empty string field; numbers are accepted and rendered as text.
pub(crate) fn opt_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn opt_i64(obj: &Map<String, Value>, key: &str) -> Result<Option<i64>, AuthError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| AuthError::MalformedToken(format!("{key} is not an integer"))),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AuthError::MalformedToken(format!("{key} is not an integer: {s}"))),
        Some(_) => Err(AuthError::MalformedToken(format!("{key} has unexpected type"))),
    }
}

pub(crate) fn opt_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = Token::new("session", "abc");
        assert!(!token.is_expired());
    }

    #[test]
    fn absolute_expiry_is_inclusive() {
        let now = Utc::now();
        let token = Token::new("session", "abc").with_expiry(Expiry::At { at: now });
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn relative_expiry_counts_from_issue() {
        let issued = Utc::now() - Duration::seconds(30);
        let token = Token::new("session", "abc").with_expiry(Expiry::after_secs(60, issued));
        assert!(!token.is_expired());
        let stale = Token::new("session", "abc").with_expiry(Expiry::after_secs(10, issued));
        assert!(stale.is_expired());
    }

    #[test]
    fn out_of_range_lifetimes_saturate_instead_of_overflowing() {
        let now = Utc::now();
        let distant = Token::new("session", "abc").with_expiry(Expiry::after_secs(i64::MAX, now));
        assert_eq!(distant.expiry.unwrap().expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!distant.is_expired());

        let past = Token::new("session", "abc").with_expiry(Expiry::after_secs(i64::MIN, now));
        assert_eq!(past.expiry.unwrap().expires_at(), DateTime::<Utc>::MIN_UTC);
        assert!(past.is_expired());
    }

    #[test]
    fn debug_output_redacts_value() {
        let rendered = format!("{:?}", Token::new("session", "super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(matches!(parse_object("[1,2]"), Err(AuthError::MalformedToken(_))));
        assert!(matches!(parse_object("{not json"), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn integer_fields_accept_numeric_strings() {
        let obj = parse_object(r#"{"a": "3600", "b": 10, "c": "soon"}"#).unwrap();
        assert_eq!(opt_i64(&obj, "a").unwrap(), Some(3600));
        assert_eq!(opt_i64(&obj, "b").unwrap(), Some(10));
        assert!(opt_i64(&obj, "c").is_err());
        assert_eq!(opt_i64(&obj, "missing").unwrap(), None);
    }
}
