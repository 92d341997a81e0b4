use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::challenge::InputParams;
use crate::token::{AuthToken, Cookie, OAuthToken, TokenKind};

/// Progress of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    /// A challenge is outstanding.
    CollectingInput,
    /// Pre-authz code obtained; the resource-owner step comes next.
    #[serde(rename = "OAUTH_PRE_AUTHZ_DONE")]
    #[strum(serialize = "OAUTH_PRE_AUTHZ_DONE")]
    OAuthPreAuthzDone,
    Success,
    Failure,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// Mechanism that produced the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationProvider {
    Basic,
    Offline,
    OAuth20,
}

/// Mutable state of one attempt, written only by the active service.
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    pub status: Status,
    pub tokens: BTreeMap<TokenKind, AuthToken>,
    pub cookies: Vec<Cookie>,
    pub identity_domain: Option<String>,
    /// Scopes requested for this attempt.
    pub scopes: BTreeSet<String>,
    pub user_name: Option<String>,
    pub input_params: InputParams,
    pub provider: Option<AuthenticationProvider>,
    pub session_expiry: Option<DateTime<Utc>>,
}

impl AuthenticationContext {
    pub fn new(scopes: BTreeSet<String>) -> Self {
        Self {
            status: Status::InProgress,
            tokens: BTreeMap::new(),
            cookies: Vec::new(),
            identity_domain: None,
            scopes,
            user_name: None,
            input_params: InputParams::new(),
            provider: None,
            session_expiry: None,
        }
    }

    pub fn token(&self, kind: TokenKind) -> Option<&AuthToken> {
        self.tokens.get(&kind)
    }

    pub fn set_token(&mut self, kind: TokenKind, token: AuthToken) {
        self.tokens.insert(kind, token);
    }

    /// OAuth access token, whichever dialect issued it.
    pub fn access_token(&self) -> Option<&OAuthToken> {
        self.token(TokenKind::OAuthAccess).and_then(AuthToken::oauth)
    }

    /// Add cookies, replacing any with the same name, domain and path.
    pub fn merge_cookies(&mut self, cookies: impl IntoIterator<Item = Cookie>) {
        for cookie in cookies {
            self.cookies.retain(|existing| {
                !(existing.name == cookie.name
                    && existing.domain == cookie.domain
                    && existing.path == cookie.path)
            });
            self.cookies.push(cookie);
        }
    }

    /// Every name in `required` is present as an unexpired cookie.
    pub fn has_cookies(&self, required: &BTreeSet<String>) -> bool {
        self.missing_cookies(required).is_empty()
    }

    /// Names in `required` with no unexpired cookie.
    pub fn missing_cookies<'a>(&self, required: &'a BTreeSet<String>) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| {
                !self
                    .cookies
                    .iter()
                    .any(|cookie| &cookie.name == *name && !cookie.is_expired())
            })
            .map(String::as_str)
            .collect()
    }

    pub fn is_session_expired(&self) -> bool {
        self.session_expiry.is_some_and(|at| Utc::now() >= at)
    }

    /// Back to a fresh attempt, keeping only the requested scopes.
    pub fn clear_fields(&mut self) {
        let scopes = std::mem::take(&mut self.scopes);
        *self = Self::new(scopes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Expiry;
    use chrono::Duration;

    #[test]
    fn merge_replaces_matching_cookie() {
        let mut ctx = AuthenticationContext::new(BTreeSet::new());
        ctx.merge_cookies([Cookie::new("sid", "one"), Cookie::new("lang", "en")]);
        ctx.merge_cookies([Cookie::new("sid", "two")]);

        let names: Vec<_> = ctx
            .cookies
            .iter()
            .map(|c| (c.name.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(names, vec![("lang", "en"), ("sid", "two")]);
    }

    #[test]
    fn expired_cookie_does_not_satisfy_requirement() {
        let mut ctx = AuthenticationContext::new(BTreeSet::new());
        let mut stale = Cookie::new("sid", "x");
        stale.expiry = Some(Expiry::At {
            at: Utc::now() - Duration::seconds(5),
        });
        ctx.merge_cookies([stale]);

        let required: BTreeSet<String> = ["sid".to_string()].into();
        assert!(!ctx.has_cookies(&required));
        assert_eq!(ctx.missing_cookies(&required), vec!["sid"]);
        assert!(ctx.has_cookies(&BTreeSet::new()));
    }

    #[test]
    fn clear_fields_resets_everything_but_scopes() {
        let scopes: BTreeSet<String> = ["openid".to_string()].into();
        let mut ctx = AuthenticationContext::new(scopes.clone());
        ctx.status = Status::Success;
        ctx.user_name = Some("alice".into());
        ctx.merge_cookies([Cookie::new("sid", "x")]);

        ctx.clear_fields();
        assert_eq!(ctx.status, Status::InProgress);
        assert!(ctx.cookies.is_empty());
        assert!(ctx.user_name.is_none());
        assert_eq!(ctx.scopes, scopes);
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Success.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::OAuthPreAuthzDone.is_terminal());
        assert_eq!(Status::OAuthPreAuthzDone.to_string(), "OAUTH_PRE_AUTHZ_DONE");
    }
}
