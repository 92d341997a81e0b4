use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::context::AuthenticationContext;
use super::services::{
    BasicAuthenticationService, OAuthMSPreAuthzCodeService, OAuthResourceOwnerService,
    OfflineAuthenticationService, RefreshTokenAuthenticationService,
};
use super::AuthenticationRequest;
use crate::challenge::handler::lock;
use crate::challenge::{AuthCallback, CompletionHandler, InputController, InputParams};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::CredentialStore;
use crate::transport::{HttpResponse, HttpTransport};

/// Tag of every mechanism the registry can build.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceType {
    Basic,
    Offline,
    #[serde(rename = "oauth_resource_owner")]
    #[strum(serialize = "oauth_resource_owner")]
    OAuthResourceOwner,
    #[serde(rename = "oauth_ms_pre_authz_code")]
    #[strum(serialize = "oauth_ms_pre_authz_code")]
    OAuthMSPreAuthzCode,
    RefreshToken,
}

/// What a logout step may tear down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoutOptions {
    pub delete_credentials: bool,
    pub delete_cookies: bool,
    pub delete_tokens: bool,
    pub user_initiated: bool,
}

impl LogoutOptions {
    /// User-initiated logout dropping the session, optionally forgetting
    /// remembered credentials too.
    pub fn user_logout(forget_credentials: bool) -> Self {
        Self {
            delete_credentials: forget_credentials,
            delete_cookies: true,
            delete_tokens: true,
            user_initiated: true,
        }
    }
}

/// One step of a login, logout or cancel traversal.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    fn service_type(&self) -> ServiceType;

    fn completion_handler(&self) -> &Arc<CompletionHandler>;

    /// Signal `controller` at once when `input` suffices, otherwise raise a
    /// challenge and return; the handler resumes the step later.
    fn collect_login_challenge_input(
        &self,
        input: &InputParams,
        controller: Arc<dyn InputController>,
    ) -> Result<(), AuthError>;

    /// Run the mechanism's exchange and update `context.status`.
    async fn handle_authentication(
        &self,
        request: &AuthenticationRequest,
        context: &mut AuthenticationContext,
    ) -> Result<Option<HttpResponse>, AuthError>;

    async fn is_valid(&self, context: &AuthenticationContext, validate_online: bool) -> bool;

    /// Local teardown. Clearing something already cleared is a no-op.
    async fn logout(
        &self,
        context: &mut AuthenticationContext,
        options: LogoutOptions,
    ) -> Result<(), AuthError>;

    /// Server-side part of logout, run before [`Self::logout`].
    async fn handle_logout(
        &self,
        _context: &mut AuthenticationContext,
        _options: LogoutOptions,
    ) -> Result<Option<HttpResponse>, AuthError> {
        Ok(None)
    }

    fn cancel(&self) {
        self.completion_handler().cancel();
    }
}

/// Collaborators every service is built with.
#[derive(Clone)]
pub struct ServiceDeps {
    pub config: Arc<AuthConfig>,
    pub transport: Arc<dyn HttpTransport>,
    pub store: Arc<dyn CredentialStore>,
    pub app_callback: Arc<dyn AuthCallback>,
}

/// Builds services on first use and hands out the same instance afterwards,
/// so a revisited step keeps its completion handler.
pub struct ServiceRegistry {
    deps: ServiceDeps,
    services: Mutex<BTreeMap<ServiceType, Arc<dyn AuthenticationService>>>,
}

impl ServiceRegistry {
    pub fn new(deps: ServiceDeps) -> Self {
        Self {
            deps,
            services: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn deps(&self) -> &ServiceDeps {
        &self.deps
    }

    pub fn service(&self, service_type: ServiceType) -> Arc<dyn AuthenticationService> {
        let mut services = lock(&self.services);
        Arc::clone(
            services
                .entry(service_type)
                .or_insert_with(|| create_service(service_type, &self.deps)),
        )
    }
}

fn create_service(service_type: ServiceType, deps: &ServiceDeps) -> Arc<dyn AuthenticationService> {
    let deps = deps.clone();
    match service_type {
        ServiceType::Basic => Arc::new(BasicAuthenticationService::new(deps)),
        ServiceType::Offline => Arc::new(OfflineAuthenticationService::new(deps)),
        ServiceType::OAuthResourceOwner => Arc::new(OAuthResourceOwnerService::new(deps)),
        ServiceType::OAuthMSPreAuthzCode => Arc::new(OAuthMSPreAuthzCodeService::new(deps)),
        ServiceType::RefreshToken => Arc::new(RefreshTokenAuthenticationService::new(deps)),
    }
}
