//! In-memory reference provider. Passwords are compared in plaintext; use it
//! for tests and local development only.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::Client;
use crate::config::ProviderConfig;
use crate::error::{AuthError, Result};
use crate::user::User;

/// Configuration for the `memory` provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub users: Vec<MemoryUser>,
}

/// A statically configured account
#[derive(Clone, Default, Deserialize)]
pub struct MemoryUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl std::fmt::Debug for MemoryUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUser")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryClient {
    origin: String,
    users: Vec<MemoryUser>,
}

impl MemoryClient {
    pub const DEFAULT_ORIGIN: &'static str = "memory";

    pub fn new(config: MemoryConfig) -> Self {
        Self {
            origin: config
                .origin
                .unwrap_or_else(|| Self::DEFAULT_ORIGIN.to_string()),
            users: config.users,
        }
    }

    pub fn from_provider_config(config: &ProviderConfig) -> Result<Arc<dyn Client>> {
        let memory: MemoryConfig = config.settings_as()?;
        Ok(Arc::new(Self::new(memory)))
    }

    pub fn users(&self) -> &[MemoryUser] {
        &self.users
    }
}

#[async_trait]
impl Client for MemoryClient {
    fn origin(&self) -> &str {
        &self.origin
    }

    async fn validate_credentials(&self, username: &str, password: &str) -> Result<User> {
        let account = self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(User::new(
            self.origin.clone(),
            account.username.clone(),
            account.name.clone(),
            account.email.clone(),
        )
        .with_roles(account.roles.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    const VALID_MEMORY_CONFIGURATION: &str = r#"
privateKey = "a"
publicKey = "b"

[[authenticationClient]]
provider = "memory"
origin = "testOrigin"

[[authenticationClient.users]]
username = "test"
password = "testpass"
name = "My Name"
email = "test@test.com"
roles = ["testRole", "testRole2"]

[[authenticationClient.users]]
username = "test2"
password = "testpass2"
name = "My Name2"
email = "test2@test.com"
"#;

    fn client() -> MemoryClient {
        let config = AuthConfig::from_toml_str(VALID_MEMORY_CONFIGURATION).unwrap();
        MemoryClient::new(config.authentication_client[0].settings_as().unwrap())
    }

    #[test]
    fn test_new_memory_client() {
        let c = client();
        assert_eq!(c.origin(), "testOrigin");

        assert_eq!(c.users()[0].username, "test");
        assert_eq!(c.users()[0].password, "testpass");
        assert_eq!(c.users()[0].name, "My Name");
        assert_eq!(c.users()[0].email, "test@test.com");

        assert_eq!(c.users()[1].username, "test2");
        assert_eq!(c.users()[1].password, "testpass2");
        assert_eq!(c.users()[1].name, "My Name2");
        assert_eq!(c.users()[1].email, "test2@test.com");
    }

    #[test]
    fn test_default_origin() {
        let c = MemoryClient::new(MemoryConfig::default());
        assert_eq!(c.origin(), "memory");
    }

    #[tokio::test]
    async fn test_memory_validate_credentials() {
        let c = client();

        let u = c.validate_credentials("test", "testpass").await.unwrap();
        assert_eq!(u.username, "test");
        assert_eq!(u.name, "My Name");
        assert_eq!(u.email, "test@test.com");
        assert_eq!(u.origin, "testOrigin");
        assert!(u.has_role("testRole"));
        assert!(u.has_role("testRole2"));

        let u = c.validate_credentials("test2", "testpass2").await.unwrap();
        assert_eq!(u.username, "test2");
        assert_eq!(u.name, "My Name2");
        assert_eq!(u.email, "test2@test.com");
        assert!(u.roles.is_empty());
    }

    #[tokio::test]
    async fn test_memory_rejects_bad_credentials() {
        let c = client();
        for (username, password) in [("test", "invalidpass"), ("nobody", "testpass"), ("test", "")] {
            let err = c.validate_credentials(username, password).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
    }

    #[test]
    fn test_debug_hides_passwords() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("testpass"));
    }
}
