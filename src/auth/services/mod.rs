//! Mechanism implementations and the helpers they share.

mod basic;
mod oauth_ms_preauthz;
mod oauth_ro;
mod offline;
mod refresh;

pub use basic::BasicAuthenticationService;
pub use oauth_ms_preauthz::{OAuthMSPreAuthzCodeService, PRE_AUTHZ_ASSERTION_TYPE};
pub use oauth_ro::OAuthResourceOwnerService;
pub use offline::OfflineAuthenticationService;
pub use refresh::RefreshTokenAuthenticationService;

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::context::AuthenticationContext;
use super::service::{ServiceDeps, ServiceType};
use crate::challenge::{
    Challenge, ChallengeType, CompletionHandler, CredentialBridge, HandlerKind, InputCallback,
    InputController, InputParams, AUTO_LOGIN_PREF_KEY, ERROR_CODE_KEY, IDENTITY_DOMAIN_KEY,
    OBFUSCATED_PASSWORD, PASSWORD_KEY, REMEMBER_CREDENTIALS_PREF_KEY, REMEMBER_USERNAME_PREF_KEY,
    USERNAME_KEY,
};
use crate::config::{AuthConfig, OAuthFlavor, OAuthSettings};
use crate::error::{AuthError, ErrorCode};
use crate::token::{AuthToken, OAuthMSToken, OAuthToken};
use crate::transport::{HttpRequest, HttpResponse};

pub(crate) fn credentials_handler(deps: &ServiceDeps) -> Arc<CompletionHandler> {
    CompletionHandler::new(
        HandlerKind::UsernamePassword {
            collect_identity_domain: deps.config.collect_identity_domain,
        },
        Arc::clone(&deps.app_callback),
    )
}

pub(crate) fn no_input_handler(deps: &ServiceDeps) -> Arc<CompletionHandler> {
    CompletionHandler::new(HandlerKind::NoInput, Arc::clone(&deps.app_callback))
}

/// Username/password collection shared by the credential-based services.
///
/// Input that already carries every required field goes straight through
/// the bridge; anything else raises a `USERNAME_PWD_REQUIRED` challenge.
pub(crate) fn collect_credentials(
    service: ServiceType,
    deps: &ServiceDeps,
    handler: &Arc<CompletionHandler>,
    input: &InputParams,
    controller: Arc<dyn InputController>,
) -> Result<(), AuthError> {
    let bridge = Box::new(CredentialBridge::new(
        Arc::clone(&deps.config),
        Arc::clone(&deps.store),
        controller,
    ));

    let domain_ok =
        !deps.config.collect_identity_domain || input.get_str(IDENTITY_DOMAIN_KEY).is_some();
    if input.get_str(USERNAME_KEY).is_some() && input.get_str(PASSWORD_KEY).is_some() && domain_ok {
        debug!(service = %service, "credentials already known, no challenge needed");
        bridge.on_input(input.clone());
        return Ok(());
    }

    let challenge = credentials_challenge(deps, input);
    handler.create_challenge_request(service, challenge, bridge)
}

fn credentials_challenge(deps: &ServiceDeps, input: &InputParams) -> Challenge {
    let config = &deps.config;
    let mut fields = InputParams::new();
    for key in [USERNAME_KEY, IDENTITY_DOMAIN_KEY, ERROR_CODE_KEY] {
        if let Some(value) = input.get_str(key) {
            fields.insert(key, value);
        }
    }

    if config.is_any_remember_feature_enabled() {
        let preferences = deps
            .store
            .load_preferences(&config.store_profile)
            .unwrap_or_else(|err| {
                warn!(error = %err, "cannot read remember preferences");
                Default::default()
            });
        if config.remember_credentials_enabled {
            fields.insert(REMEMBER_CREDENTIALS_PREF_KEY, preferences.remember_credentials);
        }
        if config.remember_username_enabled {
            fields.insert(REMEMBER_USERNAME_PREF_KEY, preferences.remember_username);
        }
        if config.auto_login_enabled {
            fields.insert(AUTO_LOGIN_PREF_KEY, preferences.auto_login);
        }

        if fields.get_str(USERNAME_KEY).is_none() && preferences.keeps_username() {
            if let Ok(Some(stored)) = deps.store.load_credential(&config.store_profile) {
                fields.insert(USERNAME_KEY, stored.username.as_str());
                if let Some(domain) = &stored.identity_domain {
                    fields.insert(IDENTITY_DOMAIN_KEY, domain.as_str());
                }
                if config.is_credential_replay_enabled()
                    && preferences.keeps_password()
                    && !stored.password.is_empty()
                {
                    fields.insert(PASSWORD_KEY, OBFUSCATED_PASSWORD);
                }
            }
        }
    }

    Challenge::new(ChallengeType::UsernamePwdRequired, fields)
}

/// Username, password and identity domain from the attempt's input.
pub(crate) fn submitted_credentials(
    context: &AuthenticationContext,
) -> Result<(String, String, Option<String>), AuthError> {
    let input = &context.input_params;
    let username = input
        .get_str(USERNAME_KEY)
        .ok_or_else(|| AuthError::validation(ErrorCode::UsernameRequired))?;
    let password = input
        .get_str(PASSWORD_KEY)
        .ok_or_else(|| AuthError::validation(ErrorCode::PasswordRequired))?;
    if password == OBFUSCATED_PASSWORD {
        return Err(AuthError::validation(ErrorCode::PasswordRequired));
    }
    Ok((
        username.to_string(),
        password.to_string(),
        input.get_str(IDENTITY_DOMAIN_KEY).map(str::to_string),
    ))
}

/// Identity-domain and custom headers every request to the server carries.
pub(crate) fn decorate(
    config: &AuthConfig,
    mut request: HttpRequest,
    identity_domain: Option<&str>,
) -> HttpRequest {
    if config.collect_identity_domain {
        if let Some(domain) = identity_domain {
            request = request.header(config.identity_domain_header.as_str(), domain);
        }
    }
    for (name, value) in &config.custom_headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Map a failed token-endpoint response to an error.
///
/// `invalid_grant` means the user's credentials were refused and is
/// recoverable; anything else ends the attempt.
pub(crate) fn token_endpoint_error(response: &HttpResponse) -> AuthError {
    let body: OAuthErrorBody = response.json().unwrap_or_default();
    if body.error == "invalid_grant" || (response.status == 401 && body.error.is_empty()) {
        return AuthError::InvalidCredentials;
    }
    let detail = body
        .error_description
        .filter(|d| !d.is_empty())
        .unwrap_or(body.error);
    AuthError::failed(
        ErrorCode::OAuthAuthenticationFailed,
        format!("token endpoint returned HTTP {}: {detail}", response.status),
    )
}

/// Parse a token-endpoint body in the configured dialect.
pub(crate) fn parse_access_token(
    settings: &OAuthSettings,
    body: &str,
) -> Result<AuthToken, AuthError> {
    let token = match settings.flavor {
        OAuthFlavor::Standard => AuthToken::OAuth(OAuthToken::parse(body)?),
        OAuthFlavor::MobileSocial => AuthToken::OAuthMS(OAuthMSToken::parse(body)?),
    };
    if token.token().value.is_empty() {
        return Err(AuthError::MalformedToken(
            "token response carries no access_token".into(),
        ));
    }
    Ok(token)
}

pub(crate) fn token_mut(token: &mut AuthToken) -> Option<&mut OAuthToken> {
    match token {
        AuthToken::Plain(_) => None,
        AuthToken::OAuth(token) => Some(token),
        AuthToken::OAuthMS(token) => Some(&mut token.oauth),
    }
}

/// Local check of the access token, then the validation endpoint if asked.
pub(crate) async fn access_token_valid(
    deps: &ServiceDeps,
    context: &AuthenticationContext,
    validate_online: bool,
) -> bool {
    let Some(token) = context.access_token() else {
        return false;
    };
    if !token.is_valid_for(&deps.config.required_scopes) {
        return false;
    }
    if !validate_online {
        return true;
    }
    let Some(endpoint) = deps
        .config
        .oauth
        .as_ref()
        .and_then(|oauth| oauth.validation_endpoint.as_deref())
    else {
        return true;
    };

    let request = decorate(
        &deps.config,
        HttpRequest::get(endpoint)
            .header("Authorization", format!("Bearer {}", token.token.value)),
        context.identity_domain.as_deref(),
    );
    match deps.transport.execute(request).await {
        Ok(response) => response.is_success(),
        Err(err) => {
            warn!(error = %err, "online token validation failed");
            false
        }
    }
}
