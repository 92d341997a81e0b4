use std::sync::Arc;

use tracing::debug;

use super::context::{AuthenticationContext, Status};
use super::service::{AuthenticationService, ServiceRegistry, ServiceType};
use super::AuthenticationRequest;
use crate::config::{AuthConfig, AuthScheme};
use crate::error::AuthError;
use crate::transport::HttpResponse;

/// Result of asking the driver for the next step.
pub enum Transition {
    Next(Arc<dyn AuthenticationService>),
    Terminal,
}

impl Transition {
    pub fn service_type(&self) -> Option<ServiceType> {
        match self {
            Self::Next(service) => Some(service.service_type()),
            Self::Terminal => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Next(service) => f.debug_tuple("Next").field(&service.service_type()).finish(),
            Self::Terminal => f.write_str("Terminal"),
        }
    }
}

/// Sequences services for login, logout and cancel.
pub trait AuthStateTransition: Send + Sync {
    fn get_initial_state(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<Arc<dyn AuthenticationService>, AuthError>;

    /// Next login step given the latest response and context status.
    fn do_state_transition(
        &self,
        response: Option<&HttpResponse>,
        context: &mut AuthenticationContext,
    ) -> Result<Transition, AuthError>;

    /// Teardown chain; `None` yields the first step.
    fn get_logout_state(&self, current: Option<ServiceType>) -> Transition;

    /// Chain for abandoning a login; `None` yields the first step.
    fn get_cancel_state(&self, current: Option<ServiceType>) -> Transition;
}

/// Transition table for the configured scheme.
pub struct DefaultStateTransition {
    config: Arc<AuthConfig>,
    registry: Arc<ServiceRegistry>,
}

impl DefaultStateTransition {
    pub fn new(config: Arc<AuthConfig>, registry: Arc<ServiceRegistry>) -> Self {
        Self { config, registry }
    }

    fn configured_scheme(&self) -> Result<AuthScheme, AuthError> {
        self.config
            .scheme
            .ok_or_else(|| AuthError::Configuration("no authentication scheme registered".into()))
    }

    /// Services that make up a full login for the scheme, in order.
    fn scheme_chain(&self) -> Vec<ServiceType> {
        match self.config.scheme {
            None => Vec::new(),
            Some(AuthScheme::Basic) => vec![ServiceType::Basic],
            Some(AuthScheme::Offline) => vec![ServiceType::Offline],
            Some(AuthScheme::OAuth20) if self.config.is_mobile_social() => vec![
                ServiceType::OAuthMSPreAuthzCode,
                ServiceType::OAuthResourceOwner,
            ],
            Some(AuthScheme::OAuth20) => vec![ServiceType::OAuthResourceOwner],
        }
    }

    fn offline_in_front(&self) -> bool {
        self.config.offline_authentication_allowed
            && self.config.scheme.is_some_and(|scheme| scheme != AuthScheme::Offline)
    }

    fn primary(&self) -> Result<ServiceType, AuthError> {
        self.configured_scheme()?;
        self.scheme_chain()
            .first()
            .copied()
            .ok_or_else(|| AuthError::Configuration("scheme has no services".into()))
    }

    fn step_after(&self, chain: &[ServiceType], current: Option<ServiceType>) -> Transition {
        let next = match current {
            None => chain.first(),
            Some(current) => chain
                .iter()
                .position(|ty| *ty == current)
                .and_then(|index| chain.get(index + 1)),
        };
        match next {
            Some(ty) => Transition::Next(self.registry.service(*ty)),
            None => Transition::Terminal,
        }
    }
}

impl AuthStateTransition for DefaultStateTransition {
    fn get_initial_state(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<Arc<dyn AuthenticationService>, AuthError> {
        let configured = self.configured_scheme()?;
        if let Some(requested) = request.scheme {
            let offline_ok =
                requested == AuthScheme::Offline && self.config.offline_authentication_allowed;
            if requested != configured && !offline_ok {
                return Err(AuthError::Configuration(format!(
                    "requested scheme {requested} is not supported (configured: {configured})"
                )));
            }
        }

        let service_type = if request.scheme == Some(AuthScheme::Offline) {
            ServiceType::Offline
        } else if request.use_refresh_token && configured == AuthScheme::OAuth20 {
            ServiceType::RefreshToken
        } else if self.offline_in_front() && !request.force_authentication {
            ServiceType::Offline
        } else {
            self.primary()?
        };
        debug!(service = %service_type, "initial state");
        Ok(self.registry.service(service_type))
    }

    fn do_state_transition(
        &self,
        response: Option<&HttpResponse>,
        context: &mut AuthenticationContext,
    ) -> Result<Transition, AuthError> {
        let transition = match (context.status, response) {
            (Status::Success | Status::Failure | Status::Cancelled, _) => Transition::Terminal,
            (Status::OAuthPreAuthzDone, _) => {
                context.status = Status::InProgress;
                Transition::Next(self.registry.service(ServiceType::OAuthResourceOwner))
            }
            (Status::InProgress, None) => Transition::Next(self.registry.service(self.primary()?)),
            (Status::InProgress, Some(response)) => {
                return Err(AuthError::Protocol(format!(
                    "HTTP {} left the attempt in progress",
                    response.status
                )))
            }
            (Status::CollectingInput, _) => {
                return Err(AuthError::Protocol(
                    "transition requested while input is still being collected".into(),
                ))
            }
        };
        debug!(status = %context.status, next = ?transition, "state transition");
        Ok(transition)
    }

    fn get_logout_state(&self, current: Option<ServiceType>) -> Transition {
        let mut chain = self.scheme_chain();
        if self.offline_in_front() {
            chain.push(ServiceType::Offline);
        }
        self.step_after(&chain, current)
    }

    fn get_cancel_state(&self, current: Option<ServiceType>) -> Transition {
        let mut chain = Vec::new();
        if self.offline_in_front() {
            chain.push(ServiceType::Offline);
        }
        chain.extend(self.scheme_chain());
        self.step_after(&chain, current)
    }
}
