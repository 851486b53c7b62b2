//! Lock - Advisory locks keyed by composite resource identifiers
//!
//! Some remote objects reject concurrent mutations (a load balancer accepts one
//! change at a time). Callers that touch such an object take the lock for its
//! key and hold it across the mutating call and the poll that follows.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Name of an advisory lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Serializes every change to a load balancer and its listeners, policies and pools
    pub fn load_balancer(load_balancer: &str) -> Self {
        Self(format!("load_balancer_key_{}", load_balancer))
    }

    /// Serializes subnet creation per VPC and zone
    pub fn subnet(vpc: &str, zone: &str) -> Self {
        Self(format!("subnet_key_{}_{}", vpc, zone))
    }

    pub fn security_group_rule(security_group: &str) -> Self {
        Self(format!("security_group_rule_key_{}", security_group))
    }

    pub fn instance(instance: &str) -> Self {
        Self(format!("instance_key_{}", instance))
    }

    pub fn custom(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    key: LockKey,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!("Released lock {}", self.key);
    }
}

/// Concurrent map from lock key to mutex
///
/// Owned by a session and shared with every handler it creates. Entries are
/// created on first use and kept for the life of the registry.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock named by `key`
    pub async fn lock(&self, key: &LockKey) -> LockGuard {
        // Clone the Arc out so no map shard stays locked while we wait.
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        debug!("Waiting for lock {}", key);
        let guard = mutex.lock_owned().await;
        debug!("Acquired lock {}", key);

        LockGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Take the lock only if nobody holds it
    pub fn try_lock(&self, key: &LockKey) -> Option<LockGuard> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        mutex.try_lock_owned().ok().map(|guard| LockGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
