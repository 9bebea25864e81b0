//! The façade callers use: credential validation across providers, policy
//! checks and token issuance with the configured keys and lifetime.
//!
//! A [`Manager`] is built once and never mutated. To change configuration at
//! runtime, build a new one and publish it through a [`ManagerHandle`].

use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::authorization::{Authorization, Evaluation, RequestContext};
use crate::client::{build_clients, Client};
use crate::config::{load_config, AuthConfig};
use crate::error::{AuthError, Result};
use crate::token::{self, parse_algorithm, InMemoryTokenCache, SigningKeys, TokenCache, DEFAULT_ALGORITHM};
use crate::user::User;

pub struct Manager {
    clients: Vec<Arc<dyn Client>>,
    authorization: Authorization,
    keys: SigningKeys,
    jwt_expiration: Duration,
    enable_anonymous_access: bool,
    provider_timeout: Option<Duration>,
    token_cache: Arc<dyn TokenCache>,
}

impl Manager {
    /// Anonymous access disabled, no provider timeout, in-memory token cache
    pub fn new(
        clients: Vec<Arc<dyn Client>>,
        authorization: Authorization,
        keys: SigningKeys,
        jwt_expiration: Duration,
    ) -> Self {
        Self {
            clients,
            authorization,
            keys,
            jwt_expiration,
            enable_anonymous_access: false,
            provider_timeout: None,
            token_cache: Arc::new(InMemoryTokenCache::new()),
        }
    }

    pub fn with_anonymous_access(mut self, enabled: bool) -> Self {
        self.enable_anonymous_access = enabled;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_token_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.token_cache = cache;
        self
    }

    /// Build providers, policy and keys from a parsed configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if config.jwt_expiration.is_zero() {
            return Err(AuthError::Config("jwtExpiration must be greater than zero".to_string()));
        }

        let algorithm = match &config.jwt_algorithm {
            Some(name) => parse_algorithm(name)?,
            None => DEFAULT_ALGORITHM,
        };
        let keys = SigningKeys::from_files(algorithm, &config.private_key, &config.public_key)?;
        let authorization = Authorization::new(&config.authorization)?;
        let clients = build_clients(&config.authentication_client)?;

        tracing::info!(
            "Authentication manager ready: {} provider(s), {} rule(s), token lifetime {:?}",
            clients.len(),
            authorization.rules().len(),
            config.jwt_expiration
        );

        Ok(Self::new(clients, authorization, keys, config.jwt_expiration)
            .with_anonymous_access(config.enable_anonymous_access)
            .with_provider_timeout(config.provider_timeout))
    }

    /// Load a TOML configuration file and build a manager from it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(&load_config(path)?)
    }

    pub fn clients(&self) -> &[Arc<dyn Client>] {
        &self.clients
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    pub fn keys(&self) -> &SigningKeys {
        &self.keys
    }

    pub fn jwt_expiration(&self) -> Duration {
        self.jwt_expiration
    }

    pub fn anonymous_access_enabled(&self) -> bool {
        self.enable_anonymous_access
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout
    }

    /// Try each provider in order until one accepts the credentials.
    ///
    /// A provider rejecting the credentials passes the attempt on to the
    /// next one; any other provider failure is returned as-is and ends the
    /// attempt.
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Result<User> {
        if self.clients.is_empty() {
            return Err(AuthError::NoProviders);
        }

        for client in &self.clients {
            match self.check_credentials(client.as_ref(), username, password).await {
                Ok(user) => {
                    tracing::debug!("Authenticated {} against {}", user.username, client.origin());
                    return Ok(user);
                }
                Err(AuthError::InvalidCredentials) => {
                    tracing::debug!("Provider {} rejected credentials for {}", client.origin(), username);
                }
                Err(e) => {
                    tracing::warn!("Provider {} failed: {}", client.origin(), e);
                    return Err(e);
                }
            }
        }

        Err(AuthError::InvalidCredentials)
    }

    async fn check_credentials(&self, client: &dyn Client, username: &str, password: &str) -> Result<User> {
        let Some(limit) = self.provider_timeout else {
            return client.validate_credentials(username, password).await;
        };

        tokio::time::timeout(limit, client.validate_credentials(username, password))
            .await
            .map_err(|_| {
                AuthError::provider(anyhow::anyhow!(
                    "provider {} did not answer within {:?}",
                    client.origin(),
                    limit
                ))
            })?
    }

    pub fn create_anonymous_user(&self) -> Result<User> {
        if !self.enable_anonymous_access {
            return Err(AuthError::AnonymousDisabled);
        }
        Ok(User::anonymous())
    }

    pub fn is_authorized(&self, user: &User, context: &RequestContext) -> bool {
        self.authorization.is_authorized(user, context)
    }

    pub fn explain(&self, user: &User, context: &RequestContext) -> Evaluation {
        self.authorization.explain(user, context)
    }

    /// Always signs a new token with the default lifetime
    pub fn get_jwt(&self, user: &User) -> Result<String> {
        token::issue(user, &self.keys, self.jwt_expiration)
    }

    /// Reuse the cached token for this principal while it is valid. Callers
    /// that persist tokens should store the result when it differs from the
    /// token they presented.
    pub async fn refresh_jwt(&self, user: &User) -> Result<String> {
        token::refresh(user, &self.keys, self.jwt_expiration, self.token_cache.as_ref()).await
    }

    pub fn create_user_from_token_string(&self, token: &str) -> Result<User> {
        token::decode(token, &self.keys)
    }

    /// Forget the cached token so the next refresh issues a new one
    pub async fn logout(&self, user: &User) {
        self.token_cache.invalidate(&user.identity()).await;
    }

    /// Drop expired cache entries, returning how many were removed
    pub async fn purge_expired_tokens(&self) -> usize {
        self.token_cache.purge_expired().await
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("clients", &self.clients)
            .field("authorization", &self.authorization)
            .field("keys", &self.keys)
            .field("jwt_expiration", &self.jwt_expiration)
            .field("enable_anonymous_access", &self.enable_anonymous_access)
            .field("provider_timeout", &self.provider_timeout)
            .finish_non_exhaustive()
    }
}

/// Shared reference to the active [`Manager`].
///
/// Readers take a cheap `Arc` snapshot with [`current`](Self::current);
/// reconfiguration builds a complete new manager and replaces the snapshot.
/// Requests holding an older snapshot finish against it undisturbed.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    active: Arc<RwLock<Arc<Manager>>>,
}

impl ManagerHandle {
    pub fn new(manager: Manager) -> Self {
        Self {
            active: Arc::new(RwLock::new(Arc::new(manager))),
        }
    }

    pub fn current(&self) -> Arc<Manager> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish `manager`, returning the one it replaced
    pub fn swap(&self, manager: Manager) -> Arc<Manager> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, Arc::new(manager))
    }

    /// Build a manager from `path` and publish it. On error the active
    /// manager stays in place.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Manager>> {
        let manager = Manager::load(path)?;
        tracing::info!("Reloaded authentication configuration");
        Ok(self.swap(manager))
    }
}
