use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    access_token_valid, collect_credentials, credentials_handler, decorate, parse_access_token,
    submitted_credentials, token_endpoint_error, token_mut, PRE_AUTHZ_ASSERTION_TYPE,
};
use crate::auth::context::{AuthenticationContext, AuthenticationProvider, Status};
use crate::auth::service::{AuthenticationService, LogoutOptions, ServiceDeps, ServiceType};
use crate::auth::AuthenticationRequest;
use crate::challenge::{CompletionHandler, InputController, InputParams};
use crate::error::AuthError;
use crate::token::{AuthToken, TokenKind};
use crate::transport::{HttpRequest, HttpResponse};

/// OAuth 2.0 resource-owner password grant.
///
/// In the Mobile & Social dialect the pre-authz code obtained by the
/// previous step is presented as the client assertion.
pub struct OAuthResourceOwnerService {
    deps: ServiceDeps,
    handler: Arc<CompletionHandler>,
}

impl OAuthResourceOwnerService {
    pub fn new(deps: ServiceDeps) -> Self {
        let handler = credentials_handler(&deps);
        Self { deps, handler }
    }
}

#[async_trait]
impl AuthenticationService for OAuthResourceOwnerService {
    fn service_type(&self) -> ServiceType {
        ServiceType::OAuthResourceOwner
    }

    fn completion_handler(&self) -> &Arc<CompletionHandler> {
        &self.handler
    }

    fn collect_login_challenge_input(
        &self,
        input: &InputParams,
        controller: Arc<dyn InputController>,
    ) -> Result<(), AuthError> {
        collect_credentials(
            ServiceType::OAuthResourceOwner,
            &self.deps,
            &self.handler,
            input,
            controller,
        )
    }

    async fn handle_authentication(
        &self,
        _request: &AuthenticationRequest,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError> {
        let config = &self.deps.config;
        let settings = config.oauth_settings()?;
        let (username, password, identity_domain) = submitted_credentials(context)?;

        let mut request = HttpRequest::post(&settings.token_endpoint)
            .form_field("grant_type", "password")
            .form_field("username", username.as_str())
            .form_field("password", password)
            .form_field("client_id", settings.client_id.as_str());
        if !context.scopes.is_empty() {
            let scope = context.scopes.iter().cloned().collect::<Vec<_>>().join(" ");
            request = request.form_field("scope", scope);
        }
        if let Some(secret) = &settings.client_secret {
            request = request.basic_auth(settings.client_id.as_str(), secret.as_str());
        }
        if config.is_mobile_social() {
            let Some(AuthToken::OAuthMS(code)) = context.token(TokenKind::PreAuthzCode) else {
                return Err(AuthError::Protocol(
                    "resource owner grant needs a pre-authz code first".into(),
                ));
            };
            let assertion_type = if code.client_assertion_type.is_empty() {
                PRE_AUTHZ_ASSERTION_TYPE
            } else {
                code.client_assertion_type.as_str()
            };
            request = request
                .form_field("client_assertion_type", assertion_type)
                .form_field("client_assertion", code.oauth.token.value.as_str());
        }
        let request = decorate(config, request, identity_domain.as_deref());

        let response = self.deps.transport.execute(request).await?;
        if !response.is_success() {
            debug!(status = response.status, "password grant refused");
            return Err(token_endpoint_error(&response));
        }

        let mut token = parse_access_token(settings, &response.body)?;
        if let Some(oauth) = token_mut(&mut token) {
            // An omitted scope means the requested scope was granted.
            if oauth.scopes.is_empty() {
                oauth.scopes = context.scopes.clone();
            }
        }
        context.set_token(TokenKind::OAuthAccess, token);
        context.user_name = Some(username);
        context.identity_domain = identity_domain;
        context.provider = Some(AuthenticationProvider::OAuth20);
        context.status = Status::Success;
        info!(
            user = context.user_name.as_deref().unwrap_or_default(),
            "resource owner grant succeeded"
        );
        Ok(Some(response))
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
            self.deps.store.delete_token(&self.deps.config.store_profile)?;
        }
        if context.provider == Some(AuthenticationProvider::OAuth20) {
            context.provider = None;
            context.user_name = None;
        }
        if options.delete_credentials {
            self.deps
                .store
                .delete_credential(&self.deps.config.store_profile)?;
        }
        Ok(())
    }
}
