//! Cluster-wide lock over an atomic key-value backend.
//!
//! The backend only needs `SET key value NX EX`, `GET`, `EXPIRE`, and `DEL`.
//! Ownership is always re-verified (stored value against the instance's own
//! id) before renewal or release, so a stale instance can never extend or
//! delete a lock another instance holds after a TTL-expiry race.

use crate::error::LockError;
use async_trait::async_trait;
use copper_relay_core::InstanceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Atomic key-value operations the lock needs from its backend.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// `SET key value NX EX ttl`: stores the value only when the key is
    /// absent. Returns whether the value was stored.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Returns the live value stored under the key, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Extends the TTL of an existing key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Deletes the key.
    async fn del(&self, key: &str) -> Result<(), LockError>;
}

/// TTL-aware in-memory lock store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, LockError> {
        self.entries.lock().map_err(|e| LockError::Backend {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();

        match entries.get(key) {
            Some((_, deadline)) if *deadline > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (value.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let entries = self.lock_entries()?;
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();

        match entries.get_mut(key) {
            Some((_, deadline)) if *deadline > now => {
                *deadline = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<(), LockError> {
        let mut entries = self.lock_entries()?;
        entries.remove(key);
        Ok(())
    }
}

/// A TTL-based lock held by at most one instance at a time.
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    key: String,
    instance_id: InstanceId,
    ttl: Duration,
}

impl DistributedLock {
    /// Creates a lock handle for one instance.
    pub fn new(
        store: Arc<dyn LockStore>,
        key: impl Into<String>,
        instance_id: InstanceId,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            instance_id,
            ttl,
        }
    }

    /// The instance this handle belongs to.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Attempts to acquire the lock. Returns whether this instance now
    /// holds it.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable.
    pub async fn try_acquire(&self) -> Result<bool, LockError> {
        self.store
            .set_nx_ex(&self.key, &self.instance_id.to_string(), self.ttl)
            .await
    }

    /// Extends the TTL when this instance still owns the lock. Returns
    /// whether ownership was confirmed and extended.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable.
    pub async fn renew(&self) -> Result<bool, LockError> {
        match self.store.get(&self.key).await? {
            Some(owner) if owner == self.instance_id.to_string() => {
                self.store.expire(&self.key, self.ttl).await
            }
            _ => Ok(false),
        }
    }

    /// Releases the lock when this instance owns it. Returns whether the
    /// lock was actually released.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable.
    pub async fn release(&self) -> Result<bool, LockError> {
        match self.store.get(&self.key).await? {
            Some(owner) if owner == self.instance_id.to_string() => {
                self.store.del(&self.key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(70);

    fn lock(store: &Arc<InMemoryLockStore>) -> DistributedLock {
        DistributedLock::new(
            Arc::clone(store) as Arc<dyn LockStore>,
            "scheduler:leader",
            InstanceId::new(),
            TTL,
        )
    }

    #[tokio::test]
    async fn exactly_one_of_two_racing_instances_acquires() {
        let store = Arc::new(InMemoryLockStore::new());
        let first = lock(&store);
        let second = lock(&store);

        let (a, b) = tokio::join!(first.try_acquire(), second.try_acquire());
        let a = a.expect("backend");
        let b = b.expect("backend");

        assert!(a ^ b, "exactly one acquisition must succeed");
    }

    #[tokio::test]
    async fn owner_can_renew_non_owner_cannot() {
        let store = Arc::new(InMemoryLockStore::new());
        let owner = lock(&store);
        let other = lock(&store);

        assert!(owner.try_acquire().await.expect("acquire"));

        assert!(owner.renew().await.expect("renew"));
        assert!(!other.renew().await.expect("renew"));
    }

    #[tokio::test]
    async fn release_verifies_ownership() {
        let store = Arc::new(InMemoryLockStore::new());
        let owner = lock(&store);
        let other = lock(&store);

        assert!(owner.try_acquire().await.expect("acquire"));

        // A non-owner must never delete the owner's lock.
        assert!(!other.release().await.expect("release"));
        assert_eq!(
            store.get("scheduler:leader").await.expect("get"),
            Some(owner.instance_id().to_string())
        );

        assert!(owner.release().await.expect("release"));
        assert_eq!(store.get("scheduler:leader").await.expect("get"), None);
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let store = Arc::new(InMemoryLockStore::new());
        let first = DistributedLock::new(
            Arc::clone(&store) as Arc<dyn LockStore>,
            "scheduler:leader",
            InstanceId::new(),
            Duration::from_millis(10),
        );
        let second = lock(&store);

        assert!(first.try_acquire().await.expect("acquire"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(second.try_acquire().await.expect("acquire after expiry"));
        // The stale instance no longer owns the lock and must not renew it.
        assert!(!first.renew().await.expect("renew"));
    }
}
