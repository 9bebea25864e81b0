//! Credential-validating providers and the registry that builds them
//!
//! A [`Client`] checks a username/password pair against one identity source
//! and reports the origin namespace of the principals it produces. Clients are
//! built from `[[authenticationClient]]` configuration entries through the
//! static [`PROVIDERS`] table; unknown provider identifiers are skipped so
//! configuration can name providers that are disabled in this build.

#[cfg(feature = "ldap")]
pub mod ldap;
pub mod memory;

#[cfg(feature = "ldap")]
pub use ldap::{LdapClient, LdapConfig};
pub use memory::{MemoryClient, MemoryConfig, MemoryUser};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::user::User;

/// A credential-validating identity source
#[async_trait]
pub trait Client: Send + Sync + fmt::Debug {
    /// Origin namespace of the principals this client produces
    fn origin(&self) -> &str;

    /// Validate the credentials and return the matching principal.
    ///
    /// Wrong credentials must be reported as
    /// [`AuthError::InvalidCredentials`](crate::AuthError::InvalidCredentials);
    /// any other error aborts the caller's validation attempt.
    async fn validate_credentials(&self, username: &str, password: &str) -> Result<User>;
}

/// Builds a client from its configuration entry
pub type ClientConstructor = fn(&ProviderConfig) -> Result<Arc<dyn Client>>;

/// Registered provider identifiers
pub const PROVIDERS: &[(&str, ClientConstructor)] = &[
    #[cfg(feature = "ldap")]
    ("ldap", LdapClient::from_provider_config),
    ("memory", MemoryClient::from_provider_config),
];

/// Look up the constructor registered for `provider`
pub fn constructor_for(provider: &str) -> Option<ClientConstructor> {
    PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, constructor)| *constructor)
}

/// Build clients in configured order, skipping unknown providers.
///
/// A recognized provider whose configuration is invalid fails the whole
/// build.
pub fn build_clients(configs: &[ProviderConfig]) -> Result<Vec<Arc<dyn Client>>> {
    let mut clients = Vec::with_capacity(configs.len());
    for (index, config) in configs.iter().enumerate() {
        match constructor_for(&config.provider) {
            Some(constructor) => {
                let client = constructor(config)?;
                tracing::debug!(
                    "Configured authentication provider {} (origin {})",
                    config.provider,
                    client.origin()
                );
                clients.push(client);
            }
            None => {
                tracing::warn!(
                    "Skipping unknown authentication provider '{}' at index {}",
                    config.provider,
                    index
                );
            }
        }
    }
    Ok(clients)
}
