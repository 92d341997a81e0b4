//! Configuration snapshot (layered: file > env overrides > code).
//!
//! An [`AuthConfig`] is captured once per manager, wrapped in an `Arc`, and
//! handed explicitly to every component that needs it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::AuthError;

const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 3;
const DEFAULT_IDENTITY_DOMAIN_HEADER: &str = "X-USER-IDENTITY-DOMAIN-NAME";
const DEFAULT_STORE_PROFILE: &str = "default";

/// Configured authentication mechanism selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthScheme {
    Basic,
    Offline,
    #[serde(rename = "oauth20")]
    #[strum(serialize = "oauth20")]
    OAuth20,
}

/// Which OAuth server dialect the token endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthFlavor {
    /// Plain RFC 6749 resource-owner password grant.
    #[default]
    Standard,
    /// Mobile & Social server: pre-authz code first, then resource owner.
    MobileSocial,
}

/// OAuth endpoint and client settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub flavor: OAuthFlavor,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Endpoint used for online validation of an access token.
    pub validation_endpoint: Option<String>,
    /// Device claims sent with the pre-authz code request.
    pub device_profile: serde_json::Value,
}

/// Immutable configuration for one authentication manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub scheme: Option<AuthScheme>,
    pub authentication_url: Option<String>,
    pub logout_url: Option<String>,
    pub required_scopes: BTreeSet<String>,
    pub required_cookies: BTreeSet<String>,
    pub custom_headers: BTreeMap<String, String>,
    pub collect_identity_domain: bool,
    pub identity_domain_header: String,
    pub remember_credentials_enabled: bool,
    pub remember_username_enabled: bool,
    pub auto_login_enabled: bool,
    pub offline_authentication_allowed: bool,
    pub max_login_attempts: u32,
    pub session_timeout_secs: Option<i64>,
    /// Profile label used as the credential-store key.
    pub store_profile: String,
    pub oauth: Option<OAuthSettings>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme: None,
            authentication_url: None,
            logout_url: None,
            required_scopes: BTreeSet::new(),
            required_cookies: BTreeSet::new(),
            custom_headers: BTreeMap::new(),
            collect_identity_domain: false,
            identity_domain_header: DEFAULT_IDENTITY_DOMAIN_HEADER.to_string(),
            remember_credentials_enabled: false,
            remember_username_enabled: false,
            auto_login_enabled: false,
            offline_authentication_allowed: false,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            session_timeout_secs: None,
            store_profile: DEFAULT_STORE_PROFILE.to_string(),
            oauth: None,
        }
    }
}

impl AuthConfig {
    pub fn new(scheme: AuthScheme) -> Self {
        Self {
            scheme: Some(scheme),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, AuthError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AuthError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from `AUTHFLOW_CONFIG` (if set) and apply `AUTHFLOW_*` overrides.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match std::env::var("AUTHFLOW_CONFIG") {
            Ok(path) => Self::load_from_path(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(scheme) = std::env::var("AUTHFLOW_SCHEME") {
            let scheme = AuthScheme::from_str(&scheme).map_err(|_| {
                AuthError::Configuration(format!("unsupported scheme in AUTHFLOW_SCHEME: {scheme}"))
            })?;
            config.scheme = Some(scheme);
        }
        if let Ok(url) = std::env::var("AUTHFLOW_AUTH_URL") {
            config.authentication_url = Some(url);
        }
        if let Ok(url) = std::env::var("AUTHFLOW_LOGOUT_URL") {
            config.logout_url = Some(url);
        }
        if let Ok(endpoint) = std::env::var("AUTHFLOW_TOKEN_ENDPOINT") {
            config.oauth.get_or_insert_with(OAuthSettings::default).token_endpoint = endpoint;
        }
        if let Ok(client_id) = std::env::var("AUTHFLOW_CLIENT_ID") {
            config.oauth.get_or_insert_with(OAuthSettings::default).client_id = client_id;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the registered scheme has the settings it needs.
    pub fn validate(&self) -> Result<(), AuthError> {
        match self.scheme {
            Some(AuthScheme::Basic) if self.authentication_url.is_none() => Err(
                AuthError::Configuration("basic scheme requires authentication_url".into()),
            ),
            Some(AuthScheme::OAuth20) => {
                let oauth = self.oauth_settings()?;
                if oauth.token_endpoint.is_empty() {
                    return Err(AuthError::Configuration(
                        "oauth20 scheme requires oauth.token_endpoint".into(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn oauth_settings(&self) -> Result<&OAuthSettings, AuthError> {
        self.oauth
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("missing [oauth] settings".into()))
    }

    pub fn is_mobile_social(&self) -> bool {
        matches!(&self.oauth, Some(oauth) if oauth.flavor == OAuthFlavor::MobileSocial)
    }

    /// Remember-credentials or auto-login (the features that substitute the marker).
    pub fn is_credential_replay_enabled(&self) -> bool {
        self.remember_credentials_enabled || self.auto_login_enabled
    }

    pub fn is_any_remember_feature_enabled(&self) -> bool {
        self.is_credential_replay_enabled() || self.remember_username_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_oauth_config_from_toml() {
        let config = AuthConfig::from_toml_str(
            r#"
            scheme = "oauth20"
            required_scopes = ["openid", "profile"]
            remember_credentials_enabled = true

            [oauth]
            flavor = "mobile_social"
            token_endpoint = "https://idm.example.com/ms_oauth/oauth2/endpoints/oauthservice/tokens"
            client_id = "mobile-app"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheme, Some(AuthScheme::OAuth20));
        assert!(config.is_mobile_social());
        assert!(config.required_scopes.contains("openid"));
        assert_eq!(config.max_login_attempts, 3);
        assert_eq!(config.identity_domain_header, "X-USER-IDENTITY-DOMAIN-NAME");
        assert!(config.is_credential_replay_enabled());
    }

    #[test]
    fn basic_scheme_without_url_is_rejected() {
        let err = AuthConfig::from_toml_str("scheme = \"basic\"").unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn oauth_scheme_without_settings_is_rejected() {
        let err = AuthConfig::from_toml_str("scheme = \"oauth20\"").unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn unknown_scheme_fails_to_parse() {
        let err = AuthConfig::from_toml_str("scheme = \"kerberos\"").unwrap_err();
        assert!(matches!(err, AuthError::Serialization(_)));
    }

    #[test]
    fn empty_document_has_no_scheme() {
        let config = AuthConfig::from_toml_str("").unwrap();
        assert_eq!(config, AuthConfig::default());
        assert!(config.scheme.is_none());
    }

    #[test]
    fn load_from_missing_path_is_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AuthConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }
}
