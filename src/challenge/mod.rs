//! Challenges raised to the application and the handler protocol that
//! resolves them.

pub mod bridge;
pub mod handler;

pub use bridge::{CredentialBridge, InputCallback, InputController};
pub use handler::{AuthCallback, CompletionHandler, HandlerKind};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

pub const USERNAME_KEY: &str = "username_key";
pub const PASSWORD_KEY: &str = "password_key";
pub const IDENTITY_DOMAIN_KEY: &str = "iddomain_key";
/// Error code of the previous attempt, present on a re-prompt.
pub const ERROR_CODE_KEY: &str = "error_code_key";

pub const AUTO_LOGIN_PREF_KEY: &str = "autoLogin_ui_preference_key";
pub const REMEMBER_CREDENTIALS_PREF_KEY: &str = "remember_credentials_ui_preference_key";
pub const REMEMBER_USERNAME_PREF_KEY: &str = "remember_username_ui_preference_key";

/// Reserved password value shown in place of a remembered password.
///
/// Never a real credential: it is swapped for the stored secret before any
/// exchange, and only on an exact match.
pub const OBFUSCATED_PASSWORD: &str = "********";

/// Kind of input a challenge asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[non_exhaustive]
pub enum ChallengeType {
    #[serde(rename = "USERNAME_PWD_REQUIRED")]
    #[strum(serialize = "USERNAME_PWD_REQUIRED")]
    UsernamePwdRequired,
}

/// Input required from the application before a step can continue.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub kind: ChallengeType,
    pub fields: InputParams,
}

impl Challenge {
    pub fn new(kind: ChallengeType, fields: InputParams) -> Self {
        Self { kind, fields }
    }
}

/// Field map exchanged between services, handlers and the application.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputParams(BTreeMap<String, Value>);

impl InputParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// String field, `None` when missing, non-string, or empty.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Boolean field; `"true"` strings count as set.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every field of `other` that is not already set here.
    pub fn fill_from(&mut self, other: &InputParams) {
        for (key, value) in &other.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for InputParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for InputParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            if key == PASSWORD_KEY {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_strings_read_as_missing() {
        let params = InputParams::new()
            .with(USERNAME_KEY, "")
            .with(PASSWORD_KEY, json!(42));
        assert_eq!(params.get_str(USERNAME_KEY), None);
        assert_eq!(params.get_str(PASSWORD_KEY), None);
        assert!(params.contains_key(USERNAME_KEY));
    }

    #[test]
    fn debug_hides_password() {
        let params = InputParams::new()
            .with(USERNAME_KEY, "alice")
            .with(PASSWORD_KEY, "hunter2");
        let rendered = format!("{params:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn fill_from_keeps_existing_values() {
        let mut params = InputParams::new().with(USERNAME_KEY, "alice");
        params.fill_from(
            &InputParams::new()
                .with(USERNAME_KEY, "bob")
                .with(IDENTITY_DOMAIN_KEY, "acme"),
        );
        assert_eq!(params.get_str(USERNAME_KEY), Some("alice"));
        assert_eq!(params.get_str(IDENTITY_DOMAIN_KEY), Some("acme"));
    }

    #[test]
    fn challenge_type_uses_wire_name() {
        assert_eq!(
            ChallengeType::UsernamePwdRequired.to_string(),
            "USERNAME_PWD_REQUIRED"
        );
    }
}
