//! Session credentials and login/logout.
//!
//! The token and the logged-in user are kept behind the [`TokenStore`]
//! interface. [`FileTokenStore`] keeps them in one JSON file in the config
//! directory; [`MemoryTokenStore`] keeps them in memory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::constants;
use crate::server::{ApiClient, RequestError};

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id; selects the private push channel.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Storage for the session token and identity.
pub trait TokenStore: Send + Sync {
    /// Current bearer token, if logged in.
    fn get_token(&self) -> Option<String>;
    /// Replaces the token.
    fn set_token(&self, token: &str) -> Result<()>;
    /// Removes the token.
    fn clear_token(&self) -> Result<()>;
    /// Current user, if logged in.
    fn user(&self) -> Option<User>;
    /// Replaces the user.
    fn set_user(&self, user: &User) -> Result<()>;
    /// Removes the user.
    fn clear_user(&self) -> Result<()>;
}

/// On-disk credentials layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

/// Credentials kept in `{config_dir}/credentials.json` (mode 0600).
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store backed by an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store in the configuration directory.
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(
            crate::config::Config::config_dir()?.join(constants::CREDENTIALS_FILE),
        ))
    }

    fn load(&self) -> Credentials {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable credentials file: {e}");
                Credentials::default()
            }),
            Err(_) => Credentials::default(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Credentials)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut creds = self.load();
        f(&mut creds);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&creds)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get_token(&self) -> Option<String> {
        self.load().token.filter(|t| !t.is_empty())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        self.update(|c| c.token = Some(token.to_string()))
    }

    fn clear_token(&self) -> Result<()> {
        self.update(|c| c.token = None)
    }

    fn user(&self) -> Option<User> {
        self.load().user
    }

    fn set_user(&self, user: &User) -> Result<()> {
        self.update(|c| c.user = Some(user.clone()))
    }

    fn clear_user(&self) -> Result<()> {
        self.update(|c| c.user = None)
    }
}

/// Credentials held in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Credentials>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Credentials> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    fn set_token(&self, token: &str) -> Result<()> {
        self.lock().token = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        self.lock().token = None;
        Ok(())
    }

    fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    fn set_user(&self, user: &User) -> Result<()> {
        self.lock().user = Some(user.clone());
        Ok(())
    }

    fn clear_user(&self) -> Result<()> {
        self.lock().user = None;
        Ok(())
    }
}

/// Failure while logging in.
#[derive(Debug)]
pub enum LoginError {
    /// The login request failed.
    Request(RequestError),
    /// The credentials could not be stored.
    Storage(anyhow::Error),
}

impl std::fmt::Display for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "Login failed: {e}"),
            Self::Storage(e) => write!(f, "Could not store credentials: {e:#}"),
        }
    }
}

impl std::error::Error for LoginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            Self::Storage(e) => Some(&**e),
        }
    }
}

/// Logs in and stores the token and user in the client's token store.
pub async fn login(api: &ApiClient, email: &str, password: &str) -> Result<User, LoginError> {
    let response = api
        .login(email, password)
        .await
        .map_err(LoginError::Request)?;

    let tokens = api.tokens();
    tokens
        .set_token(&response.token)
        .map_err(LoginError::Storage)?;
    tokens.set_user(&response.user).map_err(LoginError::Storage)?;

    log::info!("Logged in as user {}", response.user.id);
    Ok(response.user)
}

/// Forgets the token and user.
pub fn logout(tokens: &dyn TokenStore) -> Result<()> {
    tokens.clear_token()?;
    tokens.clear_user()?;
    log::info!("Logged out");
    Ok(())
}
