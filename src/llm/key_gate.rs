use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{PosterError, PosterResult};

/// API key shared between the credential host and the Gemini client.
#[derive(Clone, Default)]
pub struct ApiKeyCell(Arc<RwLock<String>>);

impl fmt::Debug for ApiKeyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKeyCell(present={})", self.is_present())
    }
}

impl ApiKeyCell {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(key.into())))
    }

    pub fn get(&self) -> String {
        self.0.read().clone()
    }

    pub fn set(&self, key: impl Into<String>) {
        *self.0.write() = key.into();
    }

    pub fn is_present(&self) -> bool {
        !self.0.read().trim().is_empty()
    }
}

#[async_trait]
pub trait CredentialHost: Send + Sync {
    async fn has_selected_key(&self) -> bool;

    /// Resolves once the out-of-band selection flow completes or is abandoned.
    async fn open_key_selection(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingHostPolicy {
    /// No host means no gating: the key is assumed present.
    Permissive,
    Strict,
}

impl FromStr for MissingHostPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permissive" | "allow" => Ok(MissingHostPolicy::Permissive),
            "strict" | "deny" => Ok(MissingHostPolicy::Strict),
            other => Err(format!("unknown missing-host policy '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct KeyGate {
    host: Option<Arc<dyn CredentialHost>>,
    missing_host: MissingHostPolicy,
}

impl KeyGate {
    pub fn new(host: Option<Arc<dyn CredentialHost>>, missing_host: MissingHostPolicy) -> Self {
        Self { host, missing_host }
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub async fn has_credential(&self) -> bool {
        match &self.host {
            Some(host) => host.has_selected_key().await,
            None => self.missing_host == MissingHostPolicy::Permissive,
        }
    }

    pub async fn request_credential(&self) {
        if let Some(host) = &self.host {
            host.open_key_selection().await;
        }
    }

    pub async fn ensure_credential(&self) -> PosterResult<()> {
        if self.has_credential().await {
            return Ok(());
        }
        self.request_credential().await;
        if self.has_credential().await {
            info!("API key selected");
            Ok(())
        } else {
            Err(PosterError::MissingCredential)
        }
    }
}

/// Host backed by the process environment and the `.env` file.
pub struct EnvCredentialHost {
    env_var: String,
    key: ApiKeyCell,
}

impl EnvCredentialHost {
    pub fn new(env_var: impl Into<String>, key: ApiKeyCell) -> Self {
        Self {
            env_var: env_var.into(),
            key,
        }
    }
}

#[async_trait]
impl CredentialHost for EnvCredentialHost {
    async fn has_selected_key(&self) -> bool {
        self.key.is_present()
    }

    async fn open_key_selection(&self) {
        if let Err(err) = dotenvy::dotenv_override() {
            warn!("Could not reload .env while selecting an API key: {err}");
        }
        match env::var(&self.env_var) {
            Ok(value) if !value.trim().is_empty() => self.key.set(value.trim()),
            _ => warn!("{} is not set; generation stays locked", self.env_var),
        }
    }
}
