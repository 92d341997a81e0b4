//! Tokens issued by a Mobile & Social OAuth server.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::oauth::OAuthToken;
use super::{opt_bool, opt_string, parse_object};
use crate::error::AuthError;

const TOKEN_CONTEXT: &str = "oracle_tk_context";
const CLIENT_ASSERTION_TYPE: &str = "oracle_client_assertion_type";
const GRANT_TYPE: &str = "oracle_grant_type";
const IN_SERVER_DEVICE_STORE: &str = "oracle_token_in_server_device_store";
const AUX_TOKENS: &str = "oracle_aux_tokens";
const AUX_USER_ASSERTION: &str = "user_assertion";
const AUX_ON_BEHALF_OF: &str = "oam_mt";

/// Deepest auxiliary nesting accepted; the primary token is depth 0.
pub const MAX_AUX_DEPTH: usize = 2;

/// Secondary token nested in a primary token's payload.
///
/// Only one is ever kept: a user assertion wins over an on-behalf-of token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxiliaryToken {
    UserAssertion(Box<OAuthMSToken>),
    OnBehalfOf(Box<OAuthMSToken>),
}

/// OAuth token with the Mobile & Social extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthMSToken {
    pub oauth: OAuthToken,
    pub token_context: String,
    pub client_assertion_type: String,
    pub grant_type: String,
    pub in_server_device_store: bool,
    pub auxiliary: Option<AuxiliaryToken>,
}

impl OAuthMSToken {
    pub fn parse(payload: &str) -> Result<Self, AuthError> {
        Self::parse_at(payload, Utc::now())
    }

    /// Parse with an explicit issue time; nested tokens share it.
    pub fn parse_at(payload: &str, issued_at: DateTime<Utc>) -> Result<Self, AuthError> {
        let obj = parse_object(payload)?;
        Self::from_object(&obj, issued_at, 0)
    }

    fn from_object(
        obj: &Map<String, Value>,
        issued_at: DateTime<Utc>,
        depth: usize,
    ) -> Result<Self, AuthError> {
        let mut oauth = OAuthToken::from_object(obj, issued_at)?;
        let token_context = opt_string(obj, TOKEN_CONTEXT).unwrap_or_default();
        if !token_context.is_empty() {
            oauth.token.name = token_context.clone();
        }

        let auxiliary = match obj.get(AUX_TOKENS).and_then(Value::as_object) {
            Some(aux) => Self::parse_auxiliary(aux, issued_at, depth + 1)?,
            None => None,
        };

        Ok(Self {
            oauth,
            token_context,
            client_assertion_type: opt_string(obj, CLIENT_ASSERTION_TYPE).unwrap_or_default(),
            grant_type: opt_string(obj, GRANT_TYPE).unwrap_or_default(),
            in_server_device_store: opt_bool(obj, IN_SERVER_DEVICE_STORE),
            auxiliary,
        })
    }

    fn parse_auxiliary(
        aux: &Map<String, Value>,
        issued_at: DateTime<Utc>,
        depth: usize,
    ) -> Result<Option<AuxiliaryToken>, AuthError> {
        if let Some(payload) = nested_payload(aux, AUX_USER_ASSERTION) {
            let token = Self::from_nested(payload, issued_at, depth)?;
            return Ok(Some(AuxiliaryToken::UserAssertion(Box::new(token))));
        }
        if let Some(payload) = nested_payload(aux, AUX_ON_BEHALF_OF) {
            let token = Self::from_nested(payload, issued_at, depth)?;
            return Ok(Some(AuxiliaryToken::OnBehalfOf(Box::new(token))));
        }
        Ok(None)
    }

    fn from_nested(
        payload: &Value,
        issued_at: DateTime<Utc>,
        depth: usize,
    ) -> Result<Self, AuthError> {
        if depth > MAX_AUX_DEPTH {
            return Err(AuthError::MalformedToken(format!(
                "auxiliary tokens nested deeper than {MAX_AUX_DEPTH}"
            )));
        }
        match payload {
            Value::String(raw) => Self::from_object(&parse_object(raw)?, issued_at, depth),
            Value::Object(obj) => Self::from_object(obj, issued_at, depth),
            _ => Err(AuthError::MalformedToken(
                "auxiliary token is neither a string nor an object".into(),
            )),
        }
    }

    pub fn user_assertion_token(&self) -> Option<&OAuthMSToken> {
        match &self.auxiliary {
            Some(AuxiliaryToken::UserAssertion(token)) => Some(token),
            _ => None,
        }
    }

    pub fn on_behalf_of_token(&self) -> Option<&OAuthMSToken> {
        match &self.auxiliary {
            Some(AuxiliaryToken::OnBehalfOf(token)) => Some(token),
            _ => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.oauth.is_expired()
    }
}

fn nested_payload<'a>(aux: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match aux.get(key) {
        Some(Value::String(s)) if s.is_empty() => None,
        Some(value @ (Value::String(_) | Value::Object(_))) => Some(value),
        _ => None,
    }
}
