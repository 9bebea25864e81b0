//! # Authentication - credential validation, authorization and tokens
//!
//! A library core for services that authenticate users against pluggable
//! identity providers, authorize requests with an ordered rule policy, and
//! hand out signed JWT bearer tokens.
//!
//! ## Features
//!
//! - `ldap` (default): LDAP / Active Directory provider
//!
//! ## Usage
//!
//! ```no_run
//! use authentication::{Manager, RequestContext};
//!
//! # async fn run() -> authentication::Result<()> {
//! let manager = Manager::load("authentication.toml")?;
//! let user = manager.validate_credentials("alice", "secret").await?;
//!
//! let mut context = RequestContext::new();
//! context.insert("action".to_string(), "Orders.List".to_string());
//! if manager.is_authorized(&user, &context) {
//!     let token = manager.get_jwt(&user)?;
//!     println!("{}", token);
//! }
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod token;
pub mod user;

pub use authorization::{Authorization, Decision, Evaluation, RequestContext};
pub use client::Client;
pub use config::{load_config, AuthConfig};
pub use error::{AuthError, Result};
pub use manager::{Manager, ManagerHandle};
pub use token::{InMemoryTokenCache, SigningKeys, TokenCache};
pub use user::{Identity, User};

#[cfg(test)]
mod tests {
    use crate::error::AuthError;

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: AuthError = json_err.into();
        assert!(matches!(err, AuthError::Serialization(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AuthError = io_err.into();
        assert!(matches!(err, AuthError::Io(_)));
    }
}
