use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    InputParams, AUTO_LOGIN_PREF_KEY, OBFUSCATED_PASSWORD, PASSWORD_KEY,
    REMEMBER_CREDENTIALS_PREF_KEY, REMEMBER_USERNAME_PREF_KEY, USERNAME_KEY,
};
use crate::config::AuthConfig;
use crate::error::ErrorCode;
use crate::store::{CredentialStore, RememberPreferences};

/// One-shot resumption target installed in a completion handler slot.
///
/// Each method consumes the callback, so a challenge resolves at most once.
pub trait InputCallback: Send {
    fn on_input(self: Box<Self>, fields: InputParams);
    fn on_error(self: Box<Self>, code: ErrorCode);
    fn on_cancel(self: Box<Self>);
}

/// Driver-side receiver of resolved input for the current step.
pub trait InputController: Send + Sync {
    fn on_input_available(&self, fields: InputParams);
    fn on_input_error(&self, code: ErrorCode);
    fn on_cancel(&self);
}

/// Username/password callback that swaps the obfuscation marker for the
/// remembered secret before the input reaches the driver.
pub struct CredentialBridge {
    config: Arc<AuthConfig>,
    store: Arc<dyn CredentialStore>,
    controller: Arc<dyn InputController>,
}

impl CredentialBridge {
    pub fn new(
        config: Arc<AuthConfig>,
        store: Arc<dyn CredentialStore>,
        controller: Arc<dyn InputController>,
    ) -> Self {
        Self {
            config,
            store,
            controller,
        }
    }

    fn substitute_marker(&self, fields: &mut InputParams) -> Result<(), ErrorCode> {
        if fields.get_str(PASSWORD_KEY) != Some(OBFUSCATED_PASSWORD) {
            return Ok(());
        }
        if !self.config.is_credential_replay_enabled() {
            fields.remove(PASSWORD_KEY);
            return Err(ErrorCode::PasswordRequired);
        }

        let profile = &self.config.store_profile;
        let stored = match self.store.load_credential(profile) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, profile = %profile, "cannot read remembered credentials");
                return Err(ErrorCode::InternalError);
            }
        };
        match stored {
            Some(credential)
                if !credential.password.is_empty()
                    && fields.get_str(USERNAME_KEY) == Some(credential.username.as_str()) =>
            {
                debug!(profile = %profile, "substituting remembered password");
                fields.insert(PASSWORD_KEY, credential.password);
                Ok(())
            }
            _ => {
                debug!(profile = %profile, "no remembered password for submitted user");
                fields.remove(PASSWORD_KEY);
                Err(ErrorCode::PasswordRequired)
            }
        }
    }

    fn persist_preferences(&self, fields: &InputParams) {
        let answered = [
            REMEMBER_CREDENTIALS_PREF_KEY,
            REMEMBER_USERNAME_PREF_KEY,
            AUTO_LOGIN_PREF_KEY,
        ]
        .iter()
        .any(|key| fields.contains_key(key));
        if !self.config.is_any_remember_feature_enabled() || !answered {
            return;
        }
        let preferences = RememberPreferences {
            remember_credentials: self.config.remember_credentials_enabled
                && fields.get_bool(REMEMBER_CREDENTIALS_PREF_KEY),
            remember_username: self.config.remember_username_enabled
                && fields.get_bool(REMEMBER_USERNAME_PREF_KEY),
            auto_login: self.config.auto_login_enabled && fields.get_bool(AUTO_LOGIN_PREF_KEY),
        };
        if let Err(err) = self
            .store
            .save_preferences(&self.config.store_profile, &preferences)
        {
            warn!(error = %err, "cannot store remember preferences");
        }
    }
}

impl InputCallback for CredentialBridge {
    fn on_input(self: Box<Self>, mut fields: InputParams) {
        self.persist_preferences(&fields);
        match self.substitute_marker(&mut fields) {
            Ok(()) => self.controller.on_input_available(fields),
            Err(code) => self.controller.on_input_error(code),
        }
    }

    fn on_error(self: Box<Self>, code: ErrorCode) {
        self.controller.on_input_error(code);
    }

    fn on_cancel(self: Box<Self>) {
        self.controller.on_cancel();
    }
}
