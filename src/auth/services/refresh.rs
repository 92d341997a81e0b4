use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{access_token_valid, decorate, no_input_handler, parse_access_token, token_mut};
use crate::auth::context::{AuthenticationContext, AuthenticationProvider, Status};
use crate::auth::service::{AuthenticationService, LogoutOptions, ServiceDeps, ServiceType};
use crate::auth::AuthenticationRequest;
use crate::challenge::{CompletionHandler, InputController, InputParams};
use crate::error::AuthError;
use crate::token::TokenKind;
use crate::transport::{HttpRequest, HttpResponse};

/// Reuses or refreshes the access token of an earlier login.
///
/// A usable token ends the attempt with `SUCCESS` and no challenge; an
/// expired token with a refresh value is exchanged through the
/// `refresh_token` grant; otherwise status goes back to `IN_PROGRESS` and
/// the driver continues with the full login chain.
pub struct RefreshTokenAuthenticationService {
    deps: ServiceDeps,
    handler: Arc<CompletionHandler>,
}

impl RefreshTokenAuthenticationService {
    pub fn new(deps: ServiceDeps) -> Self {
        let handler = no_input_handler(&deps);
        Self { deps, handler }
    }

    async fn refresh(
        &self,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError> {
        let Some(refresh_token) = context
            .access_token()
            .and_then(|token| token.refresh_token.clone())
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };
        let config = &self.deps.config;
        let settings = config.oauth_settings()?;

        let mut request = HttpRequest::post(&settings.token_endpoint)
            .form_field("grant_type", "refresh_token")
            .form_field("refresh_token", refresh_token.as_str())
            .form_field("client_id", settings.client_id.as_str());
        if !context.scopes.is_empty() {
            let scope = context.scopes.iter().cloned().collect::<Vec<_>>().join(" ");
            request = request.form_field("scope", scope);
        }
        if let Some(secret) = &settings.client_secret {
            request = request.basic_auth(settings.client_id.as_str(), secret.as_str());
        }
        let request = decorate(config, request, context.identity_domain.as_deref());

        let response = self.deps.transport.execute(request).await?;
        if !response.is_success() {
            debug!(status = response.status, "refresh grant refused");
            return Ok(None);
        }

        let mut token = parse_access_token(settings, &response.body)?;
        let previous_scopes = context
            .access_token()
            .map(|old| old.scopes.clone())
            .unwrap_or_default();
        if let Some(oauth) = token_mut(&mut token) {
            if oauth.refresh_token.is_none() {
                oauth.refresh_token = Some(refresh_token);
            }
            if oauth.scopes.is_empty() {
                oauth.scopes = previous_scopes;
            }
        }
        context.set_token(TokenKind::OAuthAccess, token);
        Ok(Some(response))
    }
}

#[async_trait]
impl AuthenticationService for RefreshTokenAuthenticationService {
    fn service_type(&self) -> ServiceType {
        ServiceType::RefreshToken
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
        if self.is_valid(context, true).await {
            debug!("existing access token still valid");
            context.provider = Some(AuthenticationProvider::OAuth20);
            context.status = Status::Success;
            return Ok(None);
        }

        match self.refresh(context).await {
            Ok(Some(response)) => {
                context.provider = Some(AuthenticationProvider::OAuth20);
                context.status = Status::Success;
                info!("access token refreshed");
                return Ok(Some(response));
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "refresh grant failed, falling back to login"),
        }

        context.status = Status::InProgress;
        Ok(None)
    }

    async fn is_valid(&self, context: &AuthenticationContext, validate_online: bool) -> bool {
        access_token_valid(&self.deps, context, validate_online).await
    }

    async fn logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<(), AuthError> {
        if options.delete_tokens {
            context.tokens.remove(&TokenKind::OAuthAccess);
        }
        Ok(())
    }
}
