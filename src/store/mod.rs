//! Durable storage for remembered credentials, UI preferences, offline
//! verifiers and the last OAuth access token.

pub mod file;

pub use file::{FileCredentialStore, StoreConfig};

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::token::OAuthToken;

/// Storage abstraction keyed by configuration profile.
pub trait CredentialStore: Send + Sync {
    fn load_credential(&self, profile: &str) -> Result<Option<Credential>, AuthError>;
    fn save_credential(&self, profile: &str, credential: &Credential) -> Result<(), AuthError>;
    fn delete_credential(&self, profile: &str) -> Result<(), AuthError>;

    /// Stored UI choices; defaults when nothing was saved.
    fn load_preferences(&self, profile: &str) -> Result<RememberPreferences, AuthError>;
    fn save_preferences(
        &self,
        profile: &str,
        preferences: &RememberPreferences,
    ) -> Result<(), AuthError>;

    fn load_offline(&self, profile: &str) -> Result<Option<OfflineCredential>, AuthError>;
    fn save_offline(&self, profile: &str, credential: &OfflineCredential) -> Result<(), AuthError>;
    fn delete_offline(&self, profile: &str) -> Result<(), AuthError>;

    /// Access token kept across restarts, with its refresh token.
    fn load_token(&self, profile: &str) -> Result<Option<OAuthToken>, AuthError>;
    fn save_token(&self, profile: &str, token: &OAuthToken) -> Result<(), AuthError>;
    fn delete_token(&self, profile: &str) -> Result<(), AuthError>;
}

/// Username and secret remembered for replay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_domain: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            identity_domain: None,
        }
    }

    pub fn with_identity_domain(mut self, domain: impl Into<String>) -> Self {
        self.identity_domain = Some(domain.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("identity_domain", &self.identity_domain)
            .finish()
    }
}

/// Remember / auto-login choices made on the login prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RememberPreferences {
    pub remember_credentials: bool,
    pub remember_username: bool,
    pub auto_login: bool,
}

impl RememberPreferences {
    /// Whether the secret itself should be kept.
    pub fn keeps_password(&self) -> bool {
        self.remember_credentials || self.auto_login
    }

    pub fn keeps_username(&self) -> bool {
        self.keeps_password() || self.remember_username
    }
}

/// Salted SHA-256 verifier for checking a password without the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCredential {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_domain: Option<String>,
    pub salt: String,
    pub hash: String,
}

impl OfflineCredential {
    pub fn derive(username: &str, password: &str, identity_domain: Option<&str>) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let hash = digest(&salt, password);
        Self {
            username: username.to_string(),
            identity_domain: identity_domain.map(str::to_string),
            salt,
            hash,
        }
    }

    /// Same user (and domain) and the password hashes to the stored digest.
    pub fn verify(&self, username: &str, password: &str, identity_domain: Option<&str>) -> bool {
        if self.username != username || self.identity_domain.as_deref() != identity_domain {
            return false;
        }
        let candidate = digest(&self.salt, password);
        constant_time_eq(candidate.as_bytes(), self.hash.as_bytes())
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
