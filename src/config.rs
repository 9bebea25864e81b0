//! Configuration parsing module
//!
//! This module loads the authentication core settings from TOML files: the
//! signing keys, the default token lifetime, the authorization policy and the
//! ordered list of credential providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use authentication::config::load_config;
//!
//! let config = load_config("conf/authentication.toml")?;
//! let manager = authentication::Manager::from_config(&config)?;
//! ```

use crate::{AuthError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Token lifetime used when `jwtExpiration` is not configured
pub const DEFAULT_JWT_EXPIRATION: Duration = Duration::from_secs(3600);

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// PEM file holding the token signing key
    pub private_key: PathBuf,

    /// PEM file holding the token verification key
    pub public_key: PathBuf,

    /// Default token lifetime (e.g. "1h", "30m")
    #[serde(default = "default_jwt_expiration", with = "duration_serde")]
    pub jwt_expiration: Duration,

    /// Signing algorithm name (default: "RS256")
    #[serde(default)]
    pub jwt_algorithm: Option<String>,

    #[serde(default)]
    pub enable_anonymous_access: bool,

    /// Upper bound for a single provider's credential check
    #[serde(default, with = "duration_serde::option")]
    pub provider_timeout: Option<Duration>,

    /// Authorization policy section
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    /// Credential providers, tried in this order
    #[serde(default)]
    pub authentication_client: Vec<ProviderConfig>,
}

impl AuthConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(path)
    }

    /// Parse configuration from a TOML string. Key paths are used as given.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Make relative key paths relative to `base` instead of the working directory
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.private_key, &mut self.public_key] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

fn default_jwt_expiration() -> Duration {
    DEFAULT_JWT_EXPIRATION
}

/// Authorization policy: default decision plus ordered rules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationConfig {
    /// "allow" or "deny" (case-insensitive); deny when absent
    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A single policy rule as written in the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Rule kind discriminator ("action" or "route")
    #[serde(default)]
    pub rule_type: Option<String>,

    #[serde(default)]
    pub action: Vec<String>,

    #[serde(default)]
    pub route: Vec<String>,

    /// HTTP method for route rules (default: "GET")
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Origin pattern, required on every rule
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub authorize: Option<String>,
}

/// One credential provider entry; everything besides `provider` is handed
/// to the provider's constructor untouched
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Registry key (e.g. "ldap", "memory")
    pub provider: String,

    #[serde(flatten)]
    pub settings: toml::Table,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, settings: toml::Table) -> Self {
        Self {
            provider: provider.into(),
            settings,
        }
    }

    /// Deserialize the provider-specific settings into a typed structure
    pub fn settings_as<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        toml::Value::Table(self.settings.clone())
            .try_into()
            .map_err(|e| {
                AuthError::Config(format!(
                    "Invalid configuration for provider '{}': {}",
                    self.provider, e
                ))
            })
    }
}

/// Load configuration from a TOML file
///
/// Relative `privateKey` / `publicKey` paths are resolved against the
/// directory containing the configuration file.
///
/// ```rust,ignore
/// let config = authentication::config::load_config("conf/authentication.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AuthConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuthError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let mut config: AuthConfig = toml::from_str(&content)
        .map_err(|e| AuthError::Config(format!("Failed to parse TOML config: {}", e)))?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Human readable durations ("90s", "1h 30m") for serde fields
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
