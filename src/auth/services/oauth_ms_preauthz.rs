use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, info};

use super::{decorate, no_input_handler, token_endpoint_error};
use crate::auth::context::{AuthenticationContext, Status};
use crate::auth::service::{AuthenticationService, LogoutOptions, ServiceDeps, ServiceType};
use crate::auth::AuthenticationRequest;
use crate::challenge::{CompletionHandler, InputController, InputParams};
use crate::error::AuthError;
use crate::token::{AuthToken, OAuthMSToken, TokenKind};
use crate::transport::{HttpRequest, HttpResponse};

/// Assertion requested from a Mobile & Social server for a pre-authz code.
pub const PRE_AUTHZ_ASSERTION_TYPE: &str =
    "oracle-idm:/oauth/assertion-type/client-identity/mobile-client-pre-authz-code-client";

/// Obtains the pre-authz code that identifies this device to a Mobile &
/// Social server. Needs no user input.
pub struct OAuthMSPreAuthzCodeService {
    deps: ServiceDeps,
    handler: Arc<CompletionHandler>,
}

impl OAuthMSPreAuthzCodeService {
    pub fn new(deps: ServiceDeps) -> Self {
        let handler = no_input_handler(&deps);
        Self { deps, handler }
    }

    fn cached_code(context: &AuthenticationContext) -> Option<&OAuthMSToken> {
        match context.token(TokenKind::PreAuthzCode) {
            Some(AuthToken::OAuthMS(code)) if !code.is_expired() => Some(code),
            _ => None,
        }
    }
}

#[async_trait]
impl AuthenticationService for OAuthMSPreAuthzCodeService {
    fn service_type(&self) -> ServiceType {
        ServiceType::OAuthMSPreAuthzCode
    }

    fn completion_handler(&self) -> &Arc<CompletionHandler> {
        &self.handler
    }

    fn collect_login_challenge_input(
        &self,
        input: &InputParams,
        controller: Arc<dyn InputController>,
    ) -> Result<(), AuthError> {
        controller.on_input_available(input.clone());
        Ok(())
    }

    async fn handle_authentication(
        &self,
        _request: &AuthenticationRequest,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError> {
        if Self::cached_code(context).is_some() {
            debug!("reusing unexpired pre-authz code");
            context.status = Status::OAuthPreAuthzDone;
            return Ok(None);
        }

        let config = &self.deps.config;
        let settings = config.oauth_settings()?;
        let device_profile = STANDARD.encode(settings.device_profile.to_string());
        let request = HttpRequest::post(&settings.token_endpoint)
            .form_field("grant_type", "client_credentials")
            .form_field("client_id", settings.client_id.as_str())
            .form_field("oracle_device_profile", device_profile)
            .form_field("oracle_requested_assertions", PRE_AUTHZ_ASSERTION_TYPE);
        let request = decorate(config, request, context.identity_domain.as_deref());

        let response = self.deps.transport.execute(request).await?;
        if !response.is_success() {
            return Err(token_endpoint_error(&response));
        }
        let code = OAuthMSToken::parse(&response.body)?;
        if code.oauth.token.value.is_empty() {
            return Err(AuthError::MalformedToken(
                "pre-authz response carries no code".into(),
            ));
        }

        context.set_token(TokenKind::PreAuthzCode, AuthToken::OAuthMS(code));
        context.status = Status::OAuthPreAuthzDone;
        info!("pre-authz code obtained");
        Ok(Some(response))
    }

    async fn is_valid(&self, context: &AuthenticationContext, _validate_online: bool) -> bool {
        Self::cached_code(context).is_some()
    }

    async fn logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<(), AuthError> {
        if options.delete_tokens {
            context.tokens.remove(&TokenKind::PreAuthzCode);
        }
        Ok(())
    }
}
