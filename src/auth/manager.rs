//! Drives login, logout and cancel traversals over the state machine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::context::{AuthenticationContext, AuthenticationProvider, Status};
use super::service::{
    AuthenticationService, LogoutOptions, ServiceDeps, ServiceRegistry, ServiceType,
};
use super::transition::{AuthStateTransition, DefaultStateTransition, Transition};
use super::AuthenticationRequest;
use crate::challenge::handler::lock;
use crate::challenge::{
    AuthCallback, CompletionHandler, InputController, InputParams, ERROR_CODE_KEY,
    IDENTITY_DOMAIN_KEY, PASSWORD_KEY, USERNAME_KEY,
};
use crate::config::{AuthConfig, AuthScheme};
use crate::error::{AuthError, ErrorCode};
use crate::store::{Credential, CredentialStore, OfflineCredential, RememberPreferences};
use crate::token::{AuthToken, TokenKind};
use crate::transport::HttpTransport;

/// Upper bound on service-to-service transitions in one attempt.
const MAX_TRANSITIONS: usize = 16;

const AUTHORIZATION: &str = "Authorization";
const COOKIE: &str = "Cookie";

/// How a login attempt ended when it did not fail.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthenticationContext),
    Cancelled,
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[derive(Debug)]
enum InputEvent {
    Available(InputParams),
    Error(ErrorCode),
    Cancelled,
}

/// Forwards the single answer for one collection step to the waiting login.
struct ChannelInputController {
    sender: Mutex<Option<oneshot::Sender<InputEvent>>>,
}

impl ChannelInputController {
    fn new() -> (Arc<Self>, oneshot::Receiver<InputEvent>) {
        let (sender, receiver) = oneshot::channel();
        let controller = Arc::new(Self {
            sender: Mutex::new(Some(sender)),
        });
        (controller, receiver)
    }

    fn send(&self, event: InputEvent) {
        let sender = lock(&self.sender).take();
        match sender {
            Some(sender) => {
                if sender.send(event).is_err() {
                    debug!("login no longer waiting for input");
                }
            }
            None => debug!("input already delivered for this step"),
        }
    }
}

impl InputController for ChannelInputController {
    fn on_input_available(&self, fields: InputParams) {
        self.send(InputEvent::Available(fields));
    }

    fn on_input_error(&self, code: ErrorCode) {
        self.send(InputEvent::Error(code));
    }

    fn on_cancel(&self) {
        self.send(InputEvent::Cancelled);
    }
}

/// Cancels a step's outstanding challenge when the login waiting on it is
/// dropped, so the next login finds the slot empty.
struct PendingChallenge<'a> {
    handler: &'a CompletionHandler,
    armed: bool,
}

impl<'a> PendingChallenge<'a> {
    fn new(handler: &'a CompletionHandler) -> Self {
        Self {
            handler,
            armed: true,
        }
    }

    fn resolved(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingChallenge<'_> {
    fn drop(&mut self) {
        if self.armed && self.handler.is_pending() {
            debug!("login abandoned with a challenge outstanding");
            self.handler.cancel();
        }
    }
}

/// Owns the state machine for one configuration profile.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use authflow::auth::{AuthCallback, AuthenticationRequest, AuthenticationServiceManager};
/// use authflow::challenge::{
///     Challenge, CompletionHandler, InputParams, PASSWORD_KEY, USERNAME_KEY,
/// };
/// use authflow::config::AuthConfig;
/// use authflow::store::FileCredentialStore;
/// use authflow::transport::ReqwestTransport;
///
/// struct Prompt;
///
/// impl AuthCallback for Prompt {
///     fn on_challenge(&self, _challenge: Challenge, handler: Arc<CompletionHandler>) {
///         let answer = InputParams::new()
///             .with(USERNAME_KEY, "alice")
///             .with(PASSWORD_KEY, "s3cret");
///         let _ = handler.proceed(answer);
///     }
/// }
///
/// # async fn run() -> authflow::error::Result<()> {
/// let manager = AuthenticationServiceManager::new(
///     AuthConfig::from_env()?,
///     Arc::new(ReqwestTransport::new()?),
///     Arc::new(FileCredentialStore::new_default()),
///     Arc::new(Prompt),
/// )?;
/// let outcome = manager.login(AuthenticationRequest::default()).await?;
/// assert!(outcome.is_authenticated());
/// # Ok(())
/// # }
/// ```
pub struct AuthenticationServiceManager {
    config: Arc<AuthConfig>,
    store: Arc<dyn CredentialStore>,
    registry: Arc<ServiceRegistry>,
    transition: Arc<dyn AuthStateTransition>,
    context: Mutex<Option<AuthenticationContext>>,
}

impl AuthenticationServiceManager {
    pub fn new(
        config: AuthConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        app_callback: Arc<dyn AuthCallback>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Arc::new(ServiceRegistry::new(ServiceDeps {
            config: Arc::clone(&config),
            transport,
            store: Arc::clone(&store),
            app_callback,
        }));
        let transition = Arc::new(DefaultStateTransition::new(
            Arc::clone(&config),
            Arc::clone(&registry),
        ));
        Ok(Self {
            config,
            store,
            registry,
            transition,
            context: Mutex::new(None),
        })
    }

    /// Replace the transition table.
    pub fn with_transition(mut self, transition: Arc<dyn AuthStateTransition>) -> Self {
        self.transition = transition;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Snapshot of the context kept from the last successful login.
    pub fn context(&self) -> Option<AuthenticationContext> {
        lock(&self.context).clone()
    }

    /// Run one login attempt to a terminal state.
    ///
    /// A retained session that is still valid for the requested scopes is
    /// returned as is unless `force_authentication` is set. Recoverable
    /// failures re-prompt the current step up to `max_login_attempts`
    /// times. Cancellation is reported as [`LoginOutcome::Cancelled`], not
    /// as an error.
    ///
    /// Dropping the returned future cancels any challenge it left pending.
    pub async fn login(&self, request: AuthenticationRequest) -> Result<LoginOutcome, AuthError> {
        let mut context = self.begin_attempt(&request);
        let mut service = self.transition.get_initial_state(&request)?;

        if !request.force_authentication && self.session_is_valid(&context).await {
            context.status = Status::Success;
            debug!(provider = ?context.provider, "existing session still valid");
            *lock(&self.context) = Some(context.clone());
            return Ok(LoginOutcome::Authenticated(context));
        }
        self.replay_auto_login(&mut context);

        let mut failures = 0u32;
        let mut transitions = 0usize;

        loop {
            let service_type = service.service_type();
            context.status = Status::CollectingInput;
            let event = self.collect(service.as_ref(), &context.input_params).await?;
            match event {
                InputEvent::Available(fields) => context.input_params = fields,
                InputEvent::Error(code) => {
                    debug!(service = %service_type, code = %code, "input rejected");
                    self.prepare_retry(service.as_ref(), &mut context, code, &mut failures)?;
                    continue;
                }
                InputEvent::Cancelled => {
                    info!(service = %service_type, "login cancelled");
                    return Ok(LoginOutcome::Cancelled);
                }
            }

            context.status = Status::InProgress;
            context.input_params.remove(ERROR_CODE_KEY);
            let response = match service.handle_authentication(&request, &mut context).await {
                Ok(response) => response,
                Err(err) if err.is_recoverable() => {
                    debug!(service = %service_type, error = %err, "authentication refused");
                    self.prepare_retry(service.as_ref(), &mut context, err.code(), &mut failures)?;
                    continue;
                }
                Err(err) => {
                    warn!(service = %service_type, error = %err, "authentication failed");
                    return Err(err);
                }
            };

            match self
                .transition
                .do_state_transition(response.as_ref(), &mut context)?
            {
                Transition::Next(next) => {
                    transitions += 1;
                    if transitions > MAX_TRANSITIONS {
                        return Err(AuthError::Protocol(format!(
                            "login did not settle after {MAX_TRANSITIONS} transitions"
                        )));
                    }
                    debug!(from = %service_type, to = %next.service_type(), "next step");
                    service = next;
                }
                Transition::Terminal => break,
            }
        }

        match context.status {
            Status::Success => {
                self.persist_success(&context);
                context.input_params.remove(PASSWORD_KEY);
                info!(provider = ?context.provider, "login succeeded");
                *lock(&self.context) = Some(context.clone());
                Ok(LoginOutcome::Authenticated(context))
            }
            Status::Cancelled => Ok(LoginOutcome::Cancelled),
            status => {
                warn!(status = %status, "login ended without a session");
                Err(AuthError::failed(
                    ErrorCode::AuthenticationFailed,
                    format!("login ended with status {status}"),
                ))
            }
        }
    }

    /// Whether the retained session is still usable.
    pub async fn is_authenticated(&self, validate_online: bool) -> bool {
        let Some(context) = self.context() else {
            return false;
        };
        let Some(provider) = context.provider else {
            return false;
        };
        self.registry
            .service(validating_service(provider))
            .is_valid(&context, validate_online)
            .await
    }

    /// Headers that authenticate an application request with the retained
    /// session.
    ///
    /// OAuth sessions yield a bearer `Authorization` header for a token
    /// granted `scopes` on top of the required ones. Basic and offline
    /// sessions yield a basic `Authorization` header built from remembered
    /// credentials, when the password is kept, plus the session cookies.
    pub fn headers(
        &self,
        scopes: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, AuthError> {
        let context = self
            .context()
            .filter(|context| context.provider.is_some())
            .ok_or_else(|| {
                AuthError::failed(ErrorCode::AuthenticationFailed, "no authenticated session")
            })?;
        let mut headers = BTreeMap::new();

        if context.provider == Some(AuthenticationProvider::OAuth20) {
            let mut wanted = self.config.required_scopes.clone();
            wanted.extend(scopes.iter().cloned());
            let token = context
                .access_token()
                .filter(|token| token.is_valid_for(&wanted))
                .ok_or_else(|| {
                    AuthError::failed(
                        ErrorCode::AuthenticationFailed,
                        "no unexpired access token for the requested scopes",
                    )
                })?;
            headers.insert(
                AUTHORIZATION.to_string(),
                format!("Bearer {}", token.token.value),
            );
            return Ok(headers);
        }

        let remembered = match self.store.load_credential(&self.config.store_profile) {
            Ok(credential) => credential,
            Err(err) => {
                warn!(error = %err, "cannot read remembered credentials");
                None
            }
        };
        if let Some(credential) = remembered.filter(|credential| {
            !credential.password.is_empty()
                && context.user_name.as_deref() == Some(credential.username.as_str())
        }) {
            let pair = format!("{}:{}", credential.username, credential.password);
            headers.insert(
                AUTHORIZATION.to_string(),
                format!("Basic {}", STANDARD.encode(pair)),
            );
        }

        let cookies = context
            .cookies
            .iter()
            .filter(|cookie| !cookie.is_expired())
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>();
        if !cookies.is_empty() {
            headers.insert(COOKIE.to_string(), cookies.join("; "));
        }
        Ok(headers)
    }

    /// Walk the logout chain and drop the retained session.
    ///
    /// With `forget_credentials` the remembered credentials, remember
    /// choices and offline verifier are deleted as well.
    pub async fn logout(&self, forget_credentials: bool) -> Result<(), AuthError> {
        let mut context = lock(&self.context)
            .take()
            .unwrap_or_else(|| AuthenticationContext::new(self.config.required_scopes.clone()));
        let options = LogoutOptions::user_logout(forget_credentials);

        let mut current = None;
        while let Transition::Next(service) = self.transition.get_logout_state(current) {
            let service_type = service.service_type();
            if let Err(err) = service.handle_logout(&mut context, options).await {
                warn!(service = %service_type, error = %err, "server logout failed");
            }
            service.logout(&mut context, options).await?;
            current = Some(service_type);
        }

        if forget_credentials {
            self.store
                .save_preferences(&self.config.store_profile, &RememberPreferences::default())?;
        }
        info!(forget_credentials, "logged out");
        Ok(())
    }

    /// Abandon the login in progress by cancelling whichever step holds a
    /// pending challenge. Without one this does nothing.
    pub fn cancel(&self) {
        let mut current = None;
        while let Transition::Next(service) = self.transition.get_cancel_state(current) {
            service.cancel();
            current = Some(service.service_type());
        }
    }

    fn begin_attempt(&self, request: &AuthenticationRequest) -> AuthenticationContext {
        let mut scopes = self.config.required_scopes.clone();
        scopes.extend(request.scopes.iter().cloned());

        let retained = if request.force_authentication {
            None
        } else {
            lock(&self.context).clone()
        };
        let mut context = match retained {
            Some(context) => context,
            None => {
                let mut fresh = AuthenticationContext::new(scopes.clone());
                if !request.force_authentication {
                    self.restore_token(&mut fresh);
                }
                fresh
            }
        };
        context.status = Status::InProgress;
        context.input_params = InputParams::new();
        context.scopes = scopes;
        context
    }

    /// Seed a fresh context with the access token kept by an earlier run.
    fn restore_token(&self, context: &mut AuthenticationContext) {
        if self.config.scheme != Some(AuthScheme::OAuth20) {
            return;
        }
        match self.store.load_token(&self.config.store_profile) {
            Ok(Some(token)) => {
                debug!(expired = token.is_expired(), "restored stored access token");
                context.set_token(TokenKind::OAuthAccess, AuthToken::OAuth(token));
                context.provider = Some(AuthenticationProvider::OAuth20);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "cannot read stored access token"),
        }
    }

    /// A retained or restored session that needs no new login.
    async fn session_is_valid(&self, context: &AuthenticationContext) -> bool {
        let Some(provider) = context.provider else {
            return false;
        };
        if provider == AuthenticationProvider::OAuth20
            && !context
                .access_token()
                .is_some_and(|token| token.is_valid_for(&context.scopes))
        {
            return false;
        }
        self.registry
            .service(validating_service(provider))
            .is_valid(context, false)
            .await
    }

    fn replay_auto_login(&self, context: &mut AuthenticationContext) {
        if !self.config.auto_login_enabled {
            return;
        }
        let profile = &self.config.store_profile;
        let auto_login = self
            .store
            .load_preferences(profile)
            .map(|prefs| prefs.auto_login)
            .unwrap_or(false);
        if !auto_login {
            return;
        }
        match self.store.load_credential(profile) {
            Ok(Some(credential)) if !credential.password.is_empty() => {
                debug!(profile = %profile, "replaying remembered credentials");
                let input = &mut context.input_params;
                input.insert(USERNAME_KEY, credential.username);
                input.insert(PASSWORD_KEY, credential.password);
                if let Some(domain) = credential.identity_domain {
                    input.insert(IDENTITY_DOMAIN_KEY, domain);
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "cannot read remembered credentials"),
        }
    }

    async fn collect(
        &self,
        service: &dyn AuthenticationService,
        input: &InputParams,
    ) -> Result<InputEvent, AuthError> {
        let (controller, receiver) = ChannelInputController::new();
        service.collect_login_challenge_input(input, controller)?;
        let pending = PendingChallenge::new(service.completion_handler());
        let event = receiver.await.map_err(|_| {
            AuthError::IllegalState("challenge dropped without being resolved".into())
        });
        pending.resolved();
        event
    }

    /// Count a failed round and set up the input for the next prompt.
    fn prepare_retry(
        &self,
        service: &dyn AuthenticationService,
        context: &mut AuthenticationContext,
        code: ErrorCode,
        failures: &mut u32,
    ) -> Result<(), AuthError> {
        *failures += 1;
        if *failures >= self.config.max_login_attempts.max(1) {
            warn!(attempts = *failures, "giving up after repeated failures");
            return Err(AuthError::failed(
                ErrorCode::MaxRetriesReached,
                format!("{} failed attempts", *failures),
            ));
        }

        let mut next = service.completion_handler().take_rejected().unwrap_or_default();
        next.fill_from(&context.input_params);
        next.remove(PASSWORD_KEY);
        next.insert(ERROR_CODE_KEY, code.to_string());
        context.input_params = next;
        Ok(())
    }

    fn persist_success(&self, context: &AuthenticationContext) {
        if context.provider == Some(AuthenticationProvider::Offline) {
            return;
        }
        let profile = &self.config.store_profile;
        if context.provider == Some(AuthenticationProvider::OAuth20) {
            if let Some(token) = context.access_token() {
                if let Err(err) = self.store.save_token(profile, token) {
                    warn!(error = %err, "cannot store access token");
                }
            }
        }

        let input = &context.input_params;
        let (Some(username), Some(password)) =
            (input.get_str(USERNAME_KEY), input.get_str(PASSWORD_KEY))
        else {
            return;
        };
        let domain = input.get_str(IDENTITY_DOMAIN_KEY);

        if self.config.is_any_remember_feature_enabled() {
            let preferences = self.store.load_preferences(profile).unwrap_or_else(|err| {
                warn!(error = %err, "cannot read remember preferences");
                RememberPreferences::default()
            });
            let result = if preferences.keeps_password() {
                let mut credential = Credential::new(username, password);
                credential.identity_domain = domain.map(str::to_string);
                self.store.save_credential(profile, &credential)
            } else if preferences.keeps_username() {
                let mut credential = Credential::new(username, "");
                credential.identity_domain = domain.map(str::to_string);
                self.store.save_credential(profile, &credential)
            } else {
                self.store.delete_credential(profile)
            };
            if let Err(err) = result {
                warn!(error = %err, "cannot store remembered credentials");
            }
        }

        if self.config.offline_authentication_allowed {
            let verifier = OfflineCredential::derive(username, password, domain);
            if let Err(err) = self.store.save_offline(profile, &verifier) {
                warn!(error = %err, "cannot store offline verifier");
            }
        }
    }
}

/// Service whose `is_valid` judges a session from `provider`.
fn validating_service(provider: AuthenticationProvider) -> ServiceType {
    match provider {
        AuthenticationProvider::Basic => ServiceType::Basic,
        AuthenticationProvider::Offline => ServiceType::Offline,
        AuthenticationProvider::OAuth20 => ServiceType::OAuthResourceOwner,
    }
}
