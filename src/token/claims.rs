use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::user::User;

/// Claims carried by every issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (seconds since the epoch)
    pub iat: i64,
    /// Expiration time (seconds since the epoch)
    pub exp: i64,
    /// Unique token id
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    /// Claims for `user`, valid from `issued_at` for `ttl`
    pub fn for_user(user: &User, issued_at: SystemTime, ttl: Duration) -> Self {
        let iat = unix_seconds(issued_at);
        let exp = iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        Self {
            sub: user.username.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            origin: user.origin.clone(),
            roles: user.roles.iter().cloned().collect(),
            iat,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> SystemTime {
        from_unix_seconds(self.exp)
    }

    /// Rebuild the principal from the claims alone
    pub fn into_user(self) -> User {
        let username = if self.username.is_empty() {
            self.sub
        } else {
            self.username
        };
        User::new(self.origin, username, self.name, self.email).with_roles(self.roles)
    }
}

/// Seconds since the epoch, clamped to zero for clocks set before 1970
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

pub(crate) fn from_unix_seconds(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or_default())
}
