//! Error types for authentication and authorization operations

/// Authentication core error type
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid authorization rule at index {index}: {message}")]
    Validation { index: usize, message: String },

    /// Wrong username or password. The message never names the provider.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Underlying provider failure (directory unreachable, malformed reply, timeout)
    #[error("Authentication provider error: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("Token is expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("no authentication providers enabled")]
    NoProviders,

    #[error("anonymous access is not permitted")]
    AnonymousDisabled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Wrap any error as a provider failure
    pub fn provider<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        AuthError::Provider(err.into())
    }

    /// True for failures the caller should answer with a fresh login prompt
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::TokenExpired | AuthError::TokenInvalid(_)
        )
    }
}
