#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authflow::auth::{AuthCallback, AuthenticationServiceManager};
use authflow::challenge::{Challenge, CompletionHandler, InputParams, PASSWORD_KEY, USERNAME_KEY};
use authflow::config::{AuthConfig, AuthScheme, OAuthFlavor, OAuthSettings};
use authflow::error::AuthError;
use authflow::store::{Credential, CredentialStore, OfflineCredential, RememberPreferences};
use authflow::token::OAuthToken;
use authflow::transport::ReqwestTransport;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<HashMap<String, Credential>>,
    preferences: Mutex<HashMap<String, RememberPreferences>>,
    offline: Mutex<HashMap<String, OfflineCredential>>,
    tokens: Mutex<HashMap<String, OAuthToken>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_credential(&self, profile: &str, credential: Credential) {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), credential);
    }

    pub fn seed_preferences(&self, profile: &str, preferences: RememberPreferences) {
        self.preferences
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), preferences);
    }

    pub fn credential(&self, profile: &str) -> Option<Credential> {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .get(profile)
            .cloned()
    }

    pub fn offline(&self, profile: &str) -> Option<OfflineCredential> {
        self.offline
            .lock()
            .expect("store lock poisoned")
            .get(profile)
            .cloned()
    }

    pub fn token(&self, profile: &str) -> Option<OAuthToken> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .get(profile)
            .cloned()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load_credential(&self, profile: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.credential(profile))
    }

    fn save_credential(&self, profile: &str, credential: &Credential) -> Result<(), AuthError> {
        self.seed_credential(profile, credential.clone());
        Ok(())
    }

    fn delete_credential(&self, profile: &str) -> Result<(), AuthError> {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .remove(profile);
        Ok(())
    }

    fn load_preferences(&self, profile: &str) -> Result<RememberPreferences, AuthError> {
        Ok(self
            .preferences
            .lock()
            .expect("store lock poisoned")
            .get(profile)
            .copied()
            .unwrap_or_default())
    }

    fn save_preferences(
        &self,
        profile: &str,
        preferences: &RememberPreferences,
    ) -> Result<(), AuthError> {
        self.seed_preferences(profile, *preferences);
        Ok(())
    }

    fn load_offline(&self, profile: &str) -> Result<Option<OfflineCredential>, AuthError> {
        Ok(self.offline(profile))
    }

    fn save_offline(&self, profile: &str, credential: &OfflineCredential) -> Result<(), AuthError> {
        self.offline
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), credential.clone());
        Ok(())
    }

    fn delete_offline(&self, profile: &str) -> Result<(), AuthError> {
        self.offline
            .lock()
            .expect("store lock poisoned")
            .remove(profile);
        Ok(())
    }

    fn load_token(&self, profile: &str) -> Result<Option<OAuthToken>, AuthError> {
        Ok(self.token(profile))
    }

    fn save_token(&self, profile: &str, token: &OAuthToken) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), token.clone());
        Ok(())
    }

    fn delete_token(&self, profile: &str) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .remove(profile);
        Ok(())
    }
}

/// How the scripted application answers the next challenge.
#[derive(Debug, Clone)]
pub enum Answer {
    Proceed(InputParams),
    Cancel,
    /// Keep the handler for the test to resolve later.
    Hold,
}

/// Application callback answering challenges from a script, in order.
#[derive(Default)]
pub struct ScriptedCallback {
    answers: Mutex<VecDeque<Answer>>,
    challenges: Mutex<Vec<Challenge>>,
    held: Mutex<Option<Arc<CompletionHandler>>>,
}

impl ScriptedCallback {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Default::default()
        })
    }

    /// Callback that cancels any challenge it is shown.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn challenges(&self) -> Vec<Challenge> {
        self.challenges.lock().expect("callback lock poisoned").clone()
    }

    pub fn take_held(&self) -> Option<Arc<CompletionHandler>> {
        self.held.lock().expect("callback lock poisoned").take()
    }
}

impl AuthCallback for ScriptedCallback {
    fn on_challenge(&self, challenge: Challenge, handler: Arc<CompletionHandler>) {
        self.challenges
            .lock()
            .expect("callback lock poisoned")
            .push(challenge);
        let answer = self
            .answers
            .lock()
            .expect("callback lock poisoned")
            .pop_front()
            .unwrap_or(Answer::Cancel);
        match answer {
            Answer::Proceed(fields) => handler.proceed(fields).expect("challenge pending"),
            Answer::Cancel => handler.cancel(),
            Answer::Hold => {
                *self.held.lock().expect("callback lock poisoned") = Some(handler);
            }
        }
    }
}

pub fn login(username: &str, password: &str) -> InputParams {
    InputParams::new()
        .with(USERNAME_KEY, username)
        .with(PASSWORD_KEY, password)
}

pub fn basic_config(base_url: &str) -> AuthConfig {
    let mut config = AuthConfig::new(AuthScheme::Basic);
    config.authentication_url = Some(format!("{base_url}/login"));
    config.logout_url = Some(format!("{base_url}/logout"));
    config
}

pub fn oauth_config(base_url: &str, flavor: OAuthFlavor) -> AuthConfig {
    let mut config = AuthConfig::new(AuthScheme::OAuth20);
    config.oauth = Some(OAuthSettings {
        flavor,
        token_endpoint: format!("{base_url}/oauth2/tokens"),
        client_id: "mobile-app".to_string(),
        ..Default::default()
    });
    config
}

pub fn manager(
    config: AuthConfig,
    store: &Arc<InMemoryCredentialStore>,
    callback: &Arc<ScriptedCallback>,
) -> AuthenticationServiceManager {
    AuthenticationServiceManager::new(
        config,
        Arc::new(ReqwestTransport::new().expect("reqwest client")),
        store.clone(),
        callback.clone(),
    )
    .expect("valid config")
}

/// Wait until the callback has seen `count` challenges.
pub async fn wait_for_challenges(callback: &ScriptedCallback, count: usize) {
    for _ in 0..200 {
        if callback.challenges().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} challenge(s)");
}
