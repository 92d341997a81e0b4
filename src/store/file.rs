use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Credential, CredentialStore, OfflineCredential, RememberPreferences};
use crate::error::AuthError;
use crate::token::OAuthToken;

/// Where the file-backed store keeps its profiles.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_store_dir()
    }
}

/// File-backed credential store: one TOML file per profile, mode 0600.
///
/// # Example
/// ```no_run
/// use authflow::store::{Credential, CredentialStore, FileCredentialStore};
///
/// let store = FileCredentialStore::new_default();
/// store.save_credential("default", &Credential::new("alice", "s3cret"))?;
/// # Ok::<(), authflow::error::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    base_dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_store_dir(),
        }
    }

    fn profile_path(&self, profile: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.toml", normalize_label(profile)))
    }

    fn read(&self, profile: &str) -> Result<ProfileFile, AuthError> {
        let path = self.profile_path(profile);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProfileFile::empty(profile))
            }
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        Ok(toml::from_str(&raw)?)
    }

    fn update(
        &self,
        profile: &str,
        change: impl FnOnce(&mut ProfileFile),
    ) -> Result<(), AuthError> {
        let mut file = self.read(profile)?;
        change(&mut file);
        file.saved_at = Utc::now();

        let path = self.profile_path(profile);
        if file.is_empty() {
            return remove_if_present(&path);
        }
        ensure_parent(&path)?;
        fs::write(&path, toml::to_string(&file)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_credential(&self, profile: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.read(profile)?.credential)
    }

    fn save_credential(&self, profile: &str, credential: &Credential) -> Result<(), AuthError> {
        self.update(profile, |file| file.credential = Some(credential.clone()))
    }

    fn delete_credential(&self, profile: &str) -> Result<(), AuthError> {
        self.update(profile, |file| file.credential = None)
    }

    fn load_preferences(&self, profile: &str) -> Result<RememberPreferences, AuthError> {
        Ok(self.read(profile)?.preferences)
    }

    fn save_preferences(
        &self,
        profile: &str,
        preferences: &RememberPreferences,
    ) -> Result<(), AuthError> {
        self.update(profile, |file| file.preferences = *preferences)
    }

    fn load_offline(&self, profile: &str) -> Result<Option<OfflineCredential>, AuthError> {
        Ok(self.read(profile)?.offline)
    }

    fn save_offline(&self, profile: &str, credential: &OfflineCredential) -> Result<(), AuthError> {
        self.update(profile, |file| file.offline = Some(credential.clone()))
    }

    fn delete_offline(&self, profile: &str) -> Result<(), AuthError> {
        self.update(profile, |file| file.offline = None)
    }

    fn load_token(&self, profile: &str) -> Result<Option<OAuthToken>, AuthError> {
        self.read(profile)?
            .token
            .as_deref()
            .map(OAuthToken::parse)
            .transpose()
    }

    fn save_token(&self, profile: &str, token: &OAuthToken) -> Result<(), AuthError> {
        let stored = token.to_store_json().to_string();
        self.update(profile, |file| file.token = Some(stored))
    }

    fn delete_token(&self, profile: &str) -> Result<(), AuthError> {
        self.update(profile, |file| file.token = None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileFile {
    version: u32,
    profile: String,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    preferences: RememberPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offline: Option<OfflineCredential>,
    /// Persisted OAuth token as JSON text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl ProfileFile {
    fn empty(profile: &str) -> Self {
        Self {
            version: 1,
            profile: profile.to_string(),
            saved_at: Utc::now(),
            preferences: RememberPreferences::default(),
            credential: None,
            offline: None,
            token: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.credential.is_none()
            && self.offline.is_none()
            && self.token.is_none()
            && self.preferences == RememberPreferences::default()
    }
}

fn ensure_parent(path: &Path) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AuthError::Io(err.to_string())),
    }
}

fn default_store_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".authflow"))
        .unwrap_or_else(|| PathBuf::from(".authflow"))
}

fn normalize_label(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' {
                lower
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
