use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{collect_credentials, credentials_handler, decorate, submitted_credentials};
use crate::auth::context::{AuthenticationContext, AuthenticationProvider, Status};
use crate::auth::service::{AuthenticationService, LogoutOptions, ServiceDeps, ServiceType};
use crate::auth::AuthenticationRequest;
use crate::challenge::{CompletionHandler, InputController, InputParams};
use crate::error::{AuthError, ErrorCode};
use crate::token::offset_secs;
use crate::transport::{HttpRequest, HttpResponse};

/// HTTP Basic login against `authentication_url`, establishing a cookie
/// session.
pub struct BasicAuthenticationService {
    deps: ServiceDeps,
    handler: Arc<CompletionHandler>,
}

impl BasicAuthenticationService {
    pub fn new(deps: ServiceDeps) -> Self {
        let handler = credentials_handler(&deps);
        Self { deps, handler }
    }

    fn authentication_url(&self) -> Result<&str, AuthError> {
        self.deps
            .config
            .authentication_url
            .as_deref()
            .ok_or_else(|| {
                AuthError::Configuration("basic scheme requires authentication_url".into())
            })
    }
}

#[async_trait]
impl AuthenticationService for BasicAuthenticationService {
    fn service_type(&self) -> ServiceType {
        ServiceType::Basic
    }

    fn completion_handler(&self) -> &Arc<CompletionHandler> {
        &self.handler
    }

    fn collect_login_challenge_input(
        &self,
        input: &InputParams,
        controller: Arc<dyn InputController>,
    ) -> Result<(), AuthError> {
        collect_credentials(ServiceType::Basic, &self.deps, &self.handler, input, controller)
    }

    async fn handle_authentication(
        &self,
        _request: &AuthenticationRequest,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError> {
        let config = &self.deps.config;
        let (username, password, identity_domain) = submitted_credentials(context)?;

        let request = HttpRequest::get(self.authentication_url()?)
            .basic_auth(username.as_str(), password)
            .cookies(context.cookies.iter().cloned());
        let request = decorate(config, request, identity_domain.as_deref());

        let response = self.deps.transport.execute(request).await?;
        match response.status {
            401 | 403 => {
                debug!(status = response.status, "basic credentials refused");
                return Err(AuthError::InvalidCredentials);
            }
            status if !(200..400).contains(&status) => {
                return Err(AuthError::failed(
                    ErrorCode::AuthenticationFailed,
                    format!("authentication server returned HTTP {status}"),
                ));
            }
            _ => {}
        }

        context.merge_cookies(response.cookies.iter().cloned());
        if !context.has_cookies(&config.required_cookies) {
            let missing = context.missing_cookies(&config.required_cookies);
            warn!(missing = %missing.join(", "), "required cookies not set");
            context.status = Status::Failure;
            return Ok(Some(response));
        }

        context.user_name = Some(username);
        context.identity_domain = identity_domain;
        context.provider = Some(AuthenticationProvider::Basic);
        context.session_expiry = config
            .session_timeout_secs
            .map(|secs| offset_secs(Utc::now(), secs));
        context.status = Status::Success;
        info!(
            user = context.user_name.as_deref().unwrap_or_default(),
            cookies = context.cookies.len(),
            "basic authentication succeeded"
        );
        Ok(Some(response))
    }

    async fn is_valid(&self, context: &AuthenticationContext, validate_online: bool) -> bool {
        let local = context.provider == Some(AuthenticationProvider::Basic)
            && context.user_name.is_some()
            && !context.is_session_expired()
            && context.has_cookies(&self.deps.config.required_cookies);
        if !local || !validate_online {
            return local;
        }

        let Ok(url) = self.authentication_url() else {
            return false;
        };
        let request = decorate(
            &self.deps.config,
            HttpRequest::get(url).cookies(context.cookies.iter().cloned()),
            context.identity_domain.as_deref(),
        );
        match self.deps.transport.execute(request).await {
            Ok(response) => response.is_success(),
            Err(err) => {
                warn!(error = %err, "online session check failed");
                false
            }
        }
    }

    async fn logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<(), AuthError> {
        if options.delete_cookies {
            context.cookies.clear();
            context.session_expiry = None;
        }
        if context.provider == Some(AuthenticationProvider::Basic) {
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

    async fn handle_logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<Option<HttpResponse>, AuthError> {
        let Some(url) = self.deps.config.logout_url.as_deref() else {
            return Ok(None);
        };
        if !options.delete_cookies || context.cookies.is_empty() {
            return Ok(None);
        }
        let request = decorate(
            &self.deps.config,
            HttpRequest::get(url).cookies(context.cookies.iter().cloned()),
            context.identity_domain.as_deref(),
        );
        let response = self.deps.transport.execute(request).await?;
        debug!(status = response.status, "server logout");
        Ok(Some(response))
    }
}
