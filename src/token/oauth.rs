use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{opt_i64, opt_string, parse_object, Expiry, Token};
use crate::error::AuthError;

/// Name given to access tokens whose payload carries no name.
pub const DEFAULT_ACCESS_TOKEN_NAME: &str = "oauth_access_token";

// Wire names first, then the names used by the persisted form.
const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const EXPIRES_IN: &str = "expires_in";
const TOKEN_TYPE: &str = "token_type";
const TOKEN_ID: &str = "token_id";
const ID_TOKEN: &str = "id_token";
const SCOPE: &str = "scope";

const STORED_NAME: &str = "name";
const STORED_VALUE: &str = "value";
const STORED_EXPIRES: &str = "expires";
const STORED_EXPIRY_SECS: &str = "expirationTSInSec";
const STORED_REFRESH: &str = "OAuthRefreshValue";
const STORED_TOKEN_TYPE: &str = "OAuthTokenType";
const STORED_TOKEN_ID: &str = "OAuthTokenId";
const STORED_ID_TOKEN: &str = "OAuthIdToken";
const STORED_SCOPES: &str = "OAuthTokenScopes";

/// OAuth 2.0 access token.
///
/// # Example
/// ```
/// use authflow::token::OAuthToken;
///
/// let token = OAuthToken::parse(
///     r#"{"access_token":"at-1","token_type":"Bearer","expires_in":3600,
///         "scope":"openid profile"}"#,
/// )?;
/// assert_eq!(token.token.value, "at-1");
/// assert!(token.scopes.contains("openid"));
/// # Ok::<(), authflow::error::AuthError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: Token,
    pub token_type: String,
    pub scopes: BTreeSet<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_id: Option<String>,
}

impl OAuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: Token::new(DEFAULT_ACCESS_TOKEN_NAME, value),
            token_type: String::new(),
            scopes: BTreeSet::new(),
            refresh_token: None,
            id_token: None,
            token_id: None,
        }
    }

    /// Parse a token endpoint response (or the persisted form).
    pub fn parse(payload: &str) -> Result<Self, AuthError> {
        Self::parse_at(payload, Utc::now())
    }

    /// Parse with an explicit issue time for relative expiries.
    pub fn parse_at(payload: &str, issued_at: DateTime<Utc>) -> Result<Self, AuthError> {
        let obj = parse_object(payload)?;
        Self::from_object(&obj, issued_at)
    }

    pub(crate) fn from_object(
        obj: &Map<String, Value>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let value = opt_string(obj, ACCESS_TOKEN)
            .or_else(|| opt_string(obj, STORED_VALUE))
            .unwrap_or_default();
        let name = opt_string(obj, STORED_NAME)
            .unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_NAME.to_string());

        let expiry = match opt_i64(obj, EXPIRES_IN)? {
            Some(secs) => Some(Expiry::after_secs(secs, issued_at)),
            None => match opt_i64(obj, STORED_EXPIRES)? {
                Some(millis) => Some(Expiry::At {
                    at: Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                        AuthError::MalformedToken(format!("{STORED_EXPIRES} out of range"))
                    })?,
                }),
                None => opt_i64(obj, STORED_EXPIRY_SECS)?
                    .filter(|secs| *secs > 0)
                    .map(|secs| Expiry::after_secs(secs, issued_at)),
            },
        };

        Ok(Self {
            token: Token {
                name,
                value,
                expiry,
            },
            token_type: opt_string(obj, TOKEN_TYPE)
                .or_else(|| opt_string(obj, STORED_TOKEN_TYPE))
                .unwrap_or_default(),
            scopes: parse_scopes(obj),
            refresh_token: opt_string(obj, REFRESH_TOKEN)
                .or_else(|| opt_string(obj, STORED_REFRESH)),
            id_token: opt_string(obj, ID_TOKEN).or_else(|| opt_string(obj, STORED_ID_TOKEN)),
            token_id: opt_string(obj, TOKEN_ID).or_else(|| opt_string(obj, STORED_TOKEN_ID)),
        })
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_expired()
    }

    /// Unexpired and granted a superset of `required_scopes`.
    pub fn is_valid_for(&self, required_scopes: &BTreeSet<String>) -> bool {
        !self.is_expired() && required_scopes.is_subset(&self.scopes)
    }

    /// Persisted form, readable again by [`OAuthToken::parse`].
    pub fn to_store_json(&self) -> Value {
        let mut out = json!({
            STORED_NAME: self.token.name,
            STORED_VALUE: self.token.value,
            STORED_TOKEN_TYPE: self.token_type,
            STORED_SCOPES: self.scopes,
        });
        if let Some(expiry) = self.token.expiry {
            out[STORED_EXPIRES] = json!(expiry.expires_at().timestamp_millis());
        }
        if let Some(refresh) = &self.refresh_token {
            out[STORED_REFRESH] = json!(refresh);
        }
        if let Some(id_token) = &self.id_token {
            out[STORED_ID_TOKEN] = json!(id_token);
        }
        if let Some(token_id) = &self.token_id {
            out[STORED_TOKEN_ID] = json!(token_id);
        }
        out
    }
}

fn parse_scopes(obj: &Map<String, Value>) -> BTreeSet<String> {
    let from_array = |value: &Value| {
        value.as_array().map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        })
    };
    if let Some(scopes) = obj.get(STORED_SCOPES).and_then(from_array) {
        return scopes;
    }
    match obj.get(SCOPE) {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(value) => from_array(value).unwrap_or_default(),
        None => BTreeSet::new(),
    }
}
