//! Authentication state machine: services, driver and manager.
//!
//! A login walks a chain of [`AuthenticationService`] steps chosen by an
//! [`AuthStateTransition`]. Steps that need user input raise a
//! [`Challenge`](crate::challenge::Challenge) through their completion
//! handler and the [`AuthenticationServiceManager`] waits for the answer
//! without blocking a thread.

pub mod context;
pub mod manager;
pub mod service;
pub mod services;
pub mod transition;

pub use crate::challenge::AuthCallback;
pub use context::{AuthenticationContext, AuthenticationProvider, Status};
pub use manager::{AuthenticationServiceManager, LoginOutcome};
pub use service::{
    AuthenticationService, LogoutOptions, ServiceDeps, ServiceRegistry, ServiceType,
};
pub use transition::{AuthStateTransition, DefaultStateTransition, Transition};

use std::collections::BTreeSet;

use bon::Builder;

use crate::config::AuthScheme;

/// What the caller asks of one login attempt.
///
/// # Example
/// ```
/// use authflow::auth::AuthenticationRequest;
///
/// let request = AuthenticationRequest::builder()
///     .use_refresh_token(true)
///     .scopes(["openid".to_string()].into())
///     .build();
/// assert!(request.use_refresh_token);
/// assert!(request.scheme.is_none());
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct AuthenticationRequest {
    /// Must match the configured scheme (or be `offline` when allowed).
    pub scheme: Option<AuthScheme>,
    /// Try the stored refresh token before prompting.
    #[builder(default)]
    pub use_refresh_token: bool,
    /// Start from a fresh context and skip offline verification.
    #[builder(default)]
    pub force_authentication: bool,
    /// Scopes requested on top of the configured required scopes.
    #[builder(default)]
    pub scopes: BTreeSet<String>,
}
