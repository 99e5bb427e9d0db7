//! Store configuration.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional YAML file, and `LABNET_*` environment variables. Command-line
//! flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LeaseError, Result};
use crate::subnet::{SubnetPool, DEFAULT_MAX_OCTET, DEFAULT_MIN_OCTET};

/// Overrides the store directory.
pub const ENV_LEASE_DIR: &str = "LABNET_LEASE_DIR";
/// Overrides the pool lower bound.
pub const ENV_MIN_OCTET: &str = "LABNET_MIN_OCTET";
/// Overrides the pool upper bound.
pub const ENV_MAX_OCTET: &str = "LABNET_MAX_OCTET";
/// Overrides the lock timeout, in seconds.
pub const ENV_LOCK_TIMEOUT: &str = "LABNET_LOCK_TIMEOUT";
/// Overrides the labnet home directory (default `~/.labnet`).
pub const ENV_HOME: &str = "LABNET_HOME";

/// Default wait for the store lock, in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 5;

/// Subnet store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the `.lease` files and the lock file
    pub path: PathBuf,

    /// Lowest leasable third octet
    pub min_octet: u8,

    /// Highest leasable third octet (inclusive)
    pub max_octet: u8,

    /// Seconds to wait for the store lock before giving up
    pub lock_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_dir(),
            min_octet: DEFAULT_MIN_OCTET,
            max_octet: DEFAULT_MAX_OCTET,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }
}

impl StoreConfig {
    /// Load a YAML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| LeaseError::io(format!("reading config {}", path.display()), e))?;
        let config: StoreConfig = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %path.display(), store = %config.path.display(), "Loaded store config");
        Ok(config)
    }

    /// Overlay `LABNET_*` environment variables from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup (the process environment in
    /// production).
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_LEASE_DIR).filter(|v| !v.is_empty()) {
            self.path = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_MIN_OCTET) {
            self.min_octet = parse_var(ENV_MIN_OCTET, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_OCTET) {
            self.max_octet = parse_var(ENV_MAX_OCTET, &value)?;
        }
        if let Some(value) = lookup(ENV_LOCK_TIMEOUT) {
            self.lock_timeout_secs = parse_var(ENV_LOCK_TIMEOUT, &value)?;
        }
        Ok(self)
    }

    /// The pool described by this config.
    pub fn pool(&self) -> Result<SubnetPool> {
        SubnetPool::new(self.min_octet, self.max_octet)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(LeaseError::InvalidConfig(
                "store path must not be empty".to_string(),
            ));
        }
        self.pool()?;
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LeaseError::InvalidConfig(format!("invalid {}='{}': {}", key, value, e)))
}

/// The labnet home directory (`$LABNET_HOME`, else `~/.labnet`).
pub fn labnet_home() -> PathBuf {
    if let Ok(home) = std::env::var(ENV_HOME) {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }

    dirs::home_dir()
        .map(|h| h.join(".labnet"))
        .unwrap_or_else(|| PathBuf::from(".labnet"))
}

/// Default store directory (`<labnet home>/subnets`).
pub fn default_store_dir() -> PathBuf {
    labnet_home().join("subnets")
}
