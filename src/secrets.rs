//! Resolves opaque credentials by logical name.

use std::path::PathBuf;

use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};

pub trait SecretProvider: Send + Sync {
    /// Return the latest value stored under `name`.
    fn access(&self, name: &str) -> Result<String>;
}

/// Reads the secret from the environment variable called `name`.
#[derive(Debug, Default)]
pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn access(&self, name: &str) -> Result<String> {
        match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(AppError::Secret(format!("environment variable {name} is not set"))),
        }
    }
}

/// Reads the secret from `<dir>/<name>`, the layout mounted secret volumes use.
#[derive(Debug)]
pub struct FileSecretProvider {
    dir: PathBuf,
}

impl FileSecretProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretProvider for FileSecretProvider {
    fn access(&self, name: &str) -> Result<String> {
        if name.contains('/') || name.contains("..") {
            return Err(AppError::Secret(format!("invalid secret name `{name}`")));
        }
        let path = self.dir.join(name);
        let value = std::fs::read_to_string(&path)
            .map_err(|e| AppError::Secret(format!("reading {}: {e}", path.display())))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::Secret(format!("{} is empty", path.display())));
        }
        Ok(value.to_string())
    }
}

/// Pick the provider the deployment is configured for.
pub fn from_config(cfg: &Config) -> Box<dyn SecretProvider> {
    match &cfg.secret_dir {
        Some(dir) => {
            debug!("Reading secrets from {}", dir.display());
            Box::new(FileSecretProvider::new(dir.clone()))
        }
        None => Box::new(EnvSecretProvider),
    }
}
