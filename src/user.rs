//! The authenticated (or anonymous) principal

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const ANONYMOUS_ORIGIN: &str = "Anonymous";
pub const ANONYMOUS_USERNAME: &str = "Anonymous";
pub const ANONYMOUS_NAME: &str = "Anonymous User";
pub const ANONYMOUS_ROLE: &str = "Anonymous";

/// An identity produced by a provider, by anonymous access or by decoding a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Namespace of the provider that owns this identity
    pub origin: String,
    pub username: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

/// Key identifying a principal across requests, used by the token cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub origin: String,
    pub username: String,
}

impl User {
    pub fn new(
        origin: impl Into<String>,
        username: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            username: username.into(),
            name: name.into(),
            email: email.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// The synthetic principal handed out when anonymous access is enabled
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_ORIGIN, ANONYMOUS_USERNAME, ANONYMOUS_NAME, "")
            .with_roles([ANONYMOUS_ROLE])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|&role| self.has_role(role))
    }

    pub fn has_all_roles(&self, roles: &[&str]) -> bool {
        roles.iter().all(|&role| self.has_role(role))
    }

    pub fn identity(&self) -> Identity {
        Identity {
            origin: self.origin.clone(),
            username: self.username.clone(),
        }
    }
}
