use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{collect_credentials, credentials_handler, submitted_credentials};
use crate::auth::context::{AuthenticationContext, AuthenticationProvider, Status};
use crate::auth::service::{AuthenticationService, LogoutOptions, ServiceDeps, ServiceType};
use crate::auth::AuthenticationRequest;
use crate::challenge::{CompletionHandler, InputController, InputParams};
use crate::config::AuthScheme;
use crate::error::{AuthError, ErrorCode};
use crate::token::offset_secs;
use crate::transport::HttpResponse;

/// Checks credentials against the verifier kept from the last online login.
///
/// When offline is only a shortcut in front of an online scheme, a missing
/// verifier or a mismatch hands the attempt on to that scheme instead of
/// failing it.
pub struct OfflineAuthenticationService {
    deps: ServiceDeps,
    handler: Arc<CompletionHandler>,
}

impl OfflineAuthenticationService {
    pub fn new(deps: ServiceDeps) -> Self {
        let handler = credentials_handler(&deps);
        Self { deps, handler }
    }

    fn is_sole_scheme(&self) -> bool {
        self.deps.config.scheme == Some(AuthScheme::Offline)
    }
}

#[async_trait]
impl AuthenticationService for OfflineAuthenticationService {
    fn service_type(&self) -> ServiceType {
        ServiceType::Offline
    }

    fn completion_handler(&self) -> &Arc<CompletionHandler> {
        &self.handler
    }

    fn collect_login_challenge_input(
        &self,
        input: &InputParams,
        controller: Arc<dyn InputController>,
    ) -> Result<(), AuthError> {
        collect_credentials(ServiceType::Offline, &self.deps, &self.handler, input, controller)
    }

    async fn handle_authentication(
        &self,
        _request: &AuthenticationRequest,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError> {
        let config = &self.deps.config;
        let (username, password, identity_domain) = submitted_credentials(context)?;

        let Some(verifier) = self.deps.store.load_offline(&config.store_profile)? else {
            if self.is_sole_scheme() {
                return Err(AuthError::failed(
                    ErrorCode::OfflineCredentialsUnavailable,
                    "no offline credentials stored for this profile",
                ));
            }
            debug!("no offline verifier, continuing online");
            context.status = Status::InProgress;
            return Ok(None);
        };

        if !verifier.verify(&username, &password, identity_domain.as_deref()) {
            if self.is_sole_scheme() {
                return Err(AuthError::InvalidCredentials);
            }
            debug!("offline verifier mismatch, continuing online");
            context.status = Status::InProgress;
            return Ok(None);
        }

        context.user_name = Some(username);
        context.identity_domain = identity_domain;
        context.provider = Some(AuthenticationProvider::Offline);
        context.session_expiry = config
            .session_timeout_secs
            .map(|secs| offset_secs(Utc::now(), secs));
        context.status = Status::Success;
        info!(
            user = context.user_name.as_deref().unwrap_or_default(),
            "offline authentication succeeded"
        );
        Ok(None)
    }

    async fn is_valid(&self, context: &AuthenticationContext, _validate_online: bool) -> bool {
        context.provider == Some(AuthenticationProvider::Offline)
            && context.user_name.is_some()
            && !context.is_session_expired()
    }

    async fn logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<(), AuthError> {
        if context.provider == Some(AuthenticationProvider::Offline) {
            context.provider = None;
            context.user_name = None;
            context.session_expiry = None;
        }
        if options.delete_credentials {
            self.deps
                .store
                .delete_offline(&self.deps.config.store_profile)?;
        }
        Ok(())
    }
}
