//! Signed bearer token lifecycle: issue, decode and refresh
//!
//! Tokens are JWTs signed with an asymmetric key pair ([`SigningKeys`]). They
//! carry the principal's identity and roles so that [`decode`] can rebuild a
//! [`User`] without any provider lookup. [`refresh`] reuses a still-valid
//! token from a [`TokenCache`] instead of minting a new one on every call.

pub mod cache;
pub mod claims;
pub mod keys;

pub use cache::{CachedToken, InMemoryTokenCache, TokenCache};
pub use claims::Claims;
pub use keys::{parse_algorithm, SigningKeys, DEFAULT_ALGORITHM};

use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode as decode_jwt, encode, Header, Validation};
use serde::Deserialize;
use std::time::{Duration, SystemTime};

use crate::error::{AuthError, Result};
use crate::user::User;

/// Sign a fresh token for `user` expiring `ttl` from now
pub fn issue(user: &User, keys: &SigningKeys, ttl: Duration) -> Result<String> {
    issue_cached(user, keys, ttl).map(|cached| cached.token)
}

/// Sign a fresh token and report when it expires
pub fn issue_cached(user: &User, keys: &SigningKeys, ttl: Duration) -> Result<CachedToken> {
    let claims = Claims::for_user(user, SystemTime::now(), ttl);
    let token = encode(&Header::new(keys.algorithm()), &claims, keys.encoding_key())
        .map_err(|e| AuthError::TokenInvalid(format!("Failed to sign token: {}", e)))?;

    tracing::debug!(
        "Issued token for {}/{} expiring at {}",
        user.origin,
        user.username,
        claims.exp
    );
    Ok(CachedToken {
        token,
        subject: user.clone(),
        expires_at: claims.expires_at(),
    })
}

/// Verify signature and expiry, then rebuild the principal from the claims
pub fn decode(token: &str, keys: &SigningKeys) -> Result<User> {
    let mut validation = Validation::new(keys.algorithm());
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    match decode_jwt::<Claims>(token, keys.decoding_key(), &validation) {
        Ok(data) => Ok(data.claims.into_user()),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
            // Expiry wins over signature problems when the payload is readable
            _ if payload_expired(token) => Err(AuthError::TokenExpired),
            _ => {
                tracing::debug!("Rejected token: {}", e);
                Err(AuthError::TokenInvalid(e.to_string()))
            }
        },
    }
}

/// Return the cached token for `user` while it is still valid and encodes this
/// exact principal, otherwise issue one with `ttl` and cache it. `ttl` is
/// ignored when a cached token is reused.
pub async fn refresh(
    user: &User,
    keys: &SigningKeys,
    ttl: Duration,
    cache: &dyn TokenCache,
) -> Result<String> {
    let cached = cache
        .get_or_issue(user, &|| issue_cached(user, keys, ttl))
        .await?;
    Ok(cached.token)
}

#[derive(Deserialize)]
struct Expiry {
    exp: i64,
}

// Reads `exp` from the unverified payload.
fn payload_expired(token: &str) -> bool {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let Some(payload) = token.split('.').nth(1) else {
        return false;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
        return false;
    };
    match serde_json::from_slice::<Expiry>(&bytes) {
        Ok(expiry) => expiry.exp < claims::unix_seconds(SystemTime::now()),
        Err(_) => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    pub(crate) fn test_keys() -> SigningKeys {
        SigningKeys::from_pem(
            Algorithm::RS256,
            include_bytes!("../../test-certificates/jwt.rsa"),
            include_bytes!("../../test-certificates/jwt.rsa.pub"),
        )
        .unwrap()
    }

    fn other_keys() -> SigningKeys {
        SigningKeys::from_pem(
            Algorithm::RS256,
            include_bytes!("../../test-certificates/other.rsa"),
            include_bytes!("../../test-certificates/other.rsa.pub"),
        )
        .unwrap()
    }

    fn user() -> User {
        User::new("testOrigin", "test", "test Name", "test@test.com")
            .with_roles(["testRole", "testRole2"])
    }

    fn expired_token(keys: &SigningKeys) -> String {
        let issued_at = SystemTime::now() - Duration::from_secs(7200);
        let claims = Claims::for_user(&user(), issued_at, Duration::from_secs(60));
        encode(&Header::new(Algorithm::RS256), &claims, keys.encoding_key()).unwrap()
    }

    #[test]
    fn test_get_jwt() {
        let token = issue(&user(), &test_keys(), Duration::from_secs(3600)).unwrap();
        assert!(!token.is_empty());
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_create_user_from_token_string() {
        let keys = test_keys();
        let token = issue(&user(), &keys, Duration::from_secs(3600)).unwrap();
        let decoded = decode(&token, &keys).unwrap();

        assert_eq!(decoded.email, "test@test.com");
        assert_eq!(decoded.name, "test Name");
        assert_eq!(decoded.origin, "testOrigin");
        assert_eq!(decoded.roles, user().roles);
        assert_eq!(decoded.username, "test");
    }

    #[test]
    fn test_ec_round_trip() {
        let keys = SigningKeys::from_pem(
            Algorithm::ES256,
            include_bytes!("../../test-certificates/jwt.ec"),
            include_bytes!("../../test-certificates/jwt.ec.pub"),
        )
        .unwrap();
        let token = issue(&user(), &keys, Duration::from_secs(60)).unwrap();
        assert_eq!(decode(&token, &keys).unwrap(), user());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = test_keys();
        let err = decode(&expired_token(&keys), &keys).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn test_expired_token_with_foreign_signature_is_expired() {
        let err = decode(&expired_token(&other_keys()), &test_keys()).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn test_foreign_signature_is_invalid() {
        let token = issue(&user(), &other_keys(), Duration::from_secs(3600)).unwrap();
        let err = decode(&token, &test_keys()).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[test]
    fn test_malformed_token_is_invalid() {
        let keys = test_keys();
        for token in ["", "abc", "a.b.c", "eyJhbGciOiJSUzI1NiJ9.!!!.sig"] {
            let err = decode(token, &keys).unwrap_err();
            assert!(matches!(err, AuthError::TokenInvalid(_)), "token {:?}", token);
        }
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let keys = test_keys();
        let token = issue(&user(), &keys, Duration::from_secs(3600)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();

        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let mut claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.roles.push("admin".to_string());
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        parts[1] = &forged;

        let err = decode(&parts.join("."), &keys).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[test]
    fn test_zero_ttl_token_is_never_cached_as_live() {
        let keys = test_keys();
        let cached = issue_cached(&user(), &keys, Duration::ZERO).unwrap();
        assert!(!cached.is_live(SystemTime::now()));
    }

    #[tokio::test]
    async fn test_refresh_jwt_reuses_live_token() {
        let keys = test_keys();
        let cache = InMemoryTokenCache::new();
        let u = user();

        let token = refresh(&u, &keys, Duration::from_secs(3), &cache).await.unwrap();
        assert!(!token.is_empty());
        let token2 = refresh(&u, &keys, Duration::from_secs(4), &cache).await.unwrap();
        assert_eq!(token, token2);
    }

    #[tokio::test]
    async fn test_refresh_jwt_follows_role_changes() {
        let keys = test_keys();
        let cache = InMemoryTokenCache::new();
        let admin = User::new("testOrigin", "alice", "Alice", "alice@test.com").with_roles(["admin"]);
        let viewer = User::new("testOrigin", "alice", "Alice", "alice@test.com").with_roles(["viewer"]);

        let admin_token = refresh(&admin, &keys, Duration::from_secs(3600), &cache).await.unwrap();
        let viewer_token = refresh(&viewer, &keys, Duration::from_secs(3600), &cache).await.unwrap();
        assert_ne!(admin_token, viewer_token);

        let decoded = decode(&viewer_token, &keys).unwrap();
        assert_eq!(decoded, viewer);
        assert!(!decoded.has_role("admin"));
    }

    #[tokio::test]
    async fn test_refresh_jwt_reissues_after_expiry() {
        let keys = test_keys();
        let cache = InMemoryTokenCache::new();
        let u = user();

        let token = refresh(&u, &keys, Duration::ZERO, &cache).await.unwrap();
        let token2 = refresh(&u, &keys, Duration::from_secs(60), &cache).await.unwrap();
        assert_ne!(token, token2);

        let token3 = refresh(&u, &keys, Duration::from_secs(1), &cache).await.unwrap();
        assert_eq!(token2, token3);
        assert_eq!(decode(&token3, &keys).unwrap(), u);
    }
}
