use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::bridge::InputCallback;
use super::{Challenge, InputParams, IDENTITY_DOMAIN_KEY, PASSWORD_KEY, USERNAME_KEY};
use crate::auth::ServiceType;
use crate::error::{AuthError, ErrorCode, Result};

/// Application-facing surface that renders challenges.
///
/// The application answers each challenge exactly once, by calling
/// [`CompletionHandler::proceed`] or [`CompletionHandler::cancel`], either
/// from inside this call or later from any thread.
pub trait AuthCallback: Send + Sync {
    fn on_challenge(&self, challenge: Challenge, handler: Arc<CompletionHandler>);
}

/// Which fields a handler insists on before resuming its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    UsernamePassword { collect_identity_domain: bool },
    NoInput,
}

/// Single-slot continuation between one service and the application.
pub struct CompletionHandler {
    kind: HandlerKind,
    app_callback: Arc<dyn AuthCallback>,
    slot: Mutex<Option<Box<dyn InputCallback>>>,
    rejected: Mutex<Option<InputParams>>,
}

impl CompletionHandler {
    pub fn new(kind: HandlerKind, app_callback: Arc<dyn AuthCallback>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            app_callback,
            slot: Mutex::new(None),
            rejected: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Install `callback` and hand `challenge` to the application.
    ///
    /// Fails with [`AuthError::IllegalState`] while an earlier challenge is
    /// still unresolved; the pending one is left untouched.
    pub fn create_challenge_request(
        self: &Arc<Self>,
        service: ServiceType,
        challenge: Challenge,
        callback: Box<dyn InputCallback>,
    ) -> Result<()> {
        {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                return Err(AuthError::IllegalState(format!(
                    "{service} already has an unresolved challenge"
                )));
            }
            *slot = Some(callback);
        }
        debug!(service = %service, challenge = %challenge.kind, "raising challenge");
        self.app_callback.on_challenge(challenge, Arc::clone(self));
        Ok(())
    }

    /// Resolve the pending challenge with the application's answer.
    ///
    /// Missing fields are reported to the service as an error code rather
    /// than returned here; either way the slot is consumed.
    pub fn proceed(&self, fields: InputParams) -> Result<()> {
        let Some(callback) = lock(&self.slot).take() else {
            return Err(AuthError::IllegalState(
                "proceed called with no challenge pending".into(),
            ));
        };

        match self.validate_response_fields(&fields) {
            Ok(()) => callback.on_input(fields),
            Err(code) => {
                debug!(code = %code, "challenge response rejected");
                if matches!(self.kind, HandlerKind::UsernamePassword { .. }) {
                    let mut kept = fields;
                    kept.remove(PASSWORD_KEY);
                    *lock(&self.rejected) = Some(kept);
                }
                callback.on_error(code);
            }
        }
        Ok(())
    }

    /// Abandon the pending challenge, if any.
    pub fn cancel(&self) {
        let pending = lock(&self.slot).take();
        match pending {
            Some(callback) => callback.on_cancel(),
            None => debug!("cancel requested with no challenge pending"),
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Fields from the last rejected answer, without the password.
    pub fn take_rejected(&self) -> Option<InputParams> {
        lock(&self.rejected).take()
    }

    fn validate_response_fields(&self, fields: &InputParams) -> std::result::Result<(), ErrorCode> {
        let HandlerKind::UsernamePassword {
            collect_identity_domain,
        } = self.kind
        else {
            return Ok(());
        };

        let username = fields.get_str(USERNAME_KEY);
        let domain_missing =
            collect_identity_domain && fields.get_str(IDENTITY_DOMAIN_KEY).is_none();
        match (username, domain_missing) {
            (None, true) => return Err(ErrorCode::UsernameAndIdentityDomainRequired),
            (None, false) => return Err(ErrorCode::UsernameRequired),
            (Some(_), true) => return Err(ErrorCode::IdentityDomainRequired),
            (Some(_), false) => {}
        }
        if fields.get_str(PASSWORD_KEY).is_none() {
            return Err(ErrorCode::PasswordRequired);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompletionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandler")
            .field("kind", &self.kind)
            .field("pending", &self.is_pending())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
