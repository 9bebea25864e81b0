use async_trait::async_trait;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::user::{Identity, User};

/// A token, the principal its claims encode and the instant it stops being
/// reusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub subject: User,
    pub expires_at: SystemTime,
}

impl CachedToken {
    pub fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    /// Live and issued for exactly this principal (name, email and roles included)
    pub fn serves(&self, user: &User, now: SystemTime) -> bool {
        self.is_live(now) && self.subject == *user
    }
}

/// Issued-token cache keyed by principal identity.
///
/// Implementations must make the lookup-then-issue decision of
/// [`TokenCache::get_or_issue`] atomic per identity so that concurrent
/// refreshes for one principal observe a single cached token.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Return the cached token for `user` while it is live and was issued for
    /// an identical principal. Otherwise call `issue`, store its result under
    /// `user.identity()` (replacing any previous entry) and return it.
    async fn get_or_issue(
        &self,
        user: &User,
        issue: &(dyn Fn() -> Result<CachedToken> + Send + Sync),
    ) -> Result<CachedToken>;

    /// Drop the cached token for `identity`
    async fn invalidate(&self, identity: &Identity);

    /// Drop every expired entry, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

/// Process-local [`TokenCache`]
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: RwLock<HashMap<Identity, CachedToken>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get_or_issue(
        &self,
        user: &User,
        issue: &(dyn Fn() -> Result<CachedToken> + Send + Sync),
    ) -> Result<CachedToken> {
        let identity = user.identity();

        // Check cache first
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&identity) {
                if cached.serves(user, SystemTime::now()) {
                    tracing::debug!("Reusing cached token for {}/{}", identity.origin, identity.username);
                    return Ok(cached.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(cached) = entries.get(&identity) {
            if cached.serves(user, SystemTime::now()) {
                return Ok(cached.clone());
            }
            if cached.subject != *user {
                tracing::debug!(
                    "Principal {}/{} changed since its token was cached, reissuing",
                    identity.origin,
                    identity.username
                );
            }
        }

        let fresh = issue()?;
        tracing::debug!("Cached new token for {}/{}", identity.origin, identity.username);
        entries.insert(identity, fresh.clone());
        Ok(fresh)
    }

    async fn invalidate(&self, identity: &Identity) {
        self.entries.write().await.remove(identity);
    }

    async fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.is_live(now));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn user(username: &str) -> User {
        User::new("testOrigin", username, "Test", "").with_roles(["viewer"])
    }

    fn token(value: &str, ttl: Duration) -> CachedToken {
        token_for(&user("a"), value, ttl)
    }

    fn token_for(subject: &User, value: &str, ttl: Duration) -> CachedToken {
        CachedToken {
            token: value.to_string(),
            subject: subject.clone(),
            expires_at: SystemTime::now() + ttl,
        }
    }

    #[tokio::test]
    async fn test_live_entry_is_reused() {
        let cache = InMemoryTokenCache::new();
        let first = cache
            .get_or_issue(&user("a"), &|| Ok(token("one", Duration::from_secs(60))))
            .await
            .unwrap();
        let second = cache
            .get_or_issue(&user("a"), &|| Ok(token("two", Duration::from_secs(60))))
            .await
            .unwrap();

        assert_eq!(first.token, "one");
        assert_eq!(second.token, "one");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let cache = InMemoryTokenCache::new();
        cache
            .get_or_issue(&user("a"), &|| Ok(token("one", Duration::ZERO)))
            .await
            .unwrap();
        let second = cache
            .get_or_issue(&user("a"), &|| Ok(token("two", Duration::from_secs(60))))
            .await
            .unwrap();

        assert_eq!(second.token, "two");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_entries_are_per_identity() {
        let cache = InMemoryTokenCache::new();
        let a = cache
            .get_or_issue(&user("a"), &|| Ok(token_for(&user("a"), "for-a", Duration::from_secs(60))))
            .await
            .unwrap();
        let b = cache
            .get_or_issue(&user("b"), &|| Ok(token_for(&user("b"), "for-b", Duration::from_secs(60))))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_error_leaves_cache_untouched() {
        let cache = InMemoryTokenCache::new();
        let err = cache
            .get_or_issue(&user("a"), &|| Err(AuthError::TokenInvalid("boom".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_and_purge() {
        let cache = InMemoryTokenCache::new();
        cache
            .get_or_issue(&user("a"), &|| Ok(token("a", Duration::from_secs(60))))
            .await
            .unwrap();
        cache
            .get_or_issue(&user("b"), &|| Ok(token_for(&user("b"), "b", Duration::ZERO)))
            .await
            .unwrap();

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);

        cache.invalidate(&user("a").identity()).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_changed_principal_is_reissued() {
        let cache = InMemoryTokenCache::new();
        let admin = user("a").with_roles(["admin"]);
        let demoted = user("a");

        let first = cache
            .get_or_issue(&admin, &|| Ok(token_for(&admin, "admin-token", Duration::from_secs(60))))
            .await
            .unwrap();
        let second = cache
            .get_or_issue(&demoted, &|| Ok(token_for(&demoted, "viewer-token", Duration::from_secs(60))))
            .await
            .unwrap();

        assert_eq!(first.token, "admin-token");
        assert_eq!(second.token, "viewer-token");
        assert_eq!(second.subject, demoted);
        assert_eq!(cache.len().await, 1);

        // The replacement is reused for the same principal
        let third = cache
            .get_or_issue(&demoted, &|| Ok(token_for(&demoted, "unused", Duration::from_secs(60))))
            .await
            .unwrap();
        assert_eq!(third.token, "viewer-token");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_issues_once() {
        let cache = Arc::new(InMemoryTokenCache::new());
        let issued = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let issued = issued.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_issue(&user("a"), &|| {
                        let n = issued.fetch_add(1, Ordering::SeqCst);
                        Ok(token(&format!("token-{}", n), Duration::from_secs(60)))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().token);
        }

        assert_eq!(issued.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t == "token-0"));
    }
}
