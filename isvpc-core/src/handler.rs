//! Handler - CRUD operations that wait for the remote lifecycle to settle
//!
//! Every mutating operation follows the same shape: take the advisory lock if
//! one was requested, issue the call, then poll with the kind's vocabulary until
//! the resource is available (or gone, for deletes).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, StateSets, WaitGoal, lifecycle};
use crate::lock::{LockGuard, LockKey, LockRegistry};
use crate::poll::{
    DEFAULT_MIN_TIMEOUT, DEFAULT_POLL_INTERVAL, PollOutcome, PollResult, PollSpec, wait_for_state,
};
use crate::provider::ResourceClient;
use crate::resource::{ResourceId, ResourceKind, Snapshot};

/// Polling cadence shared by every wait a handler performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub min_timeout: Duration,
    pub transient_retries: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            transient_retries: 0,
        }
    }
}

/// Per-call overrides for mutating operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOptions {
    /// Lock held for the call and the wait after it
    pub lock: Option<LockKey>,
    /// Replaces the kind's default timeout
    pub timeout: Option<Duration>,
}

impl MutationOptions {
    pub fn locked(key: LockKey) -> Self {
        Self {
            lock: Some(key),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A resource created and waited on
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub id: ResourceId,
    pub snapshot: Snapshot,
}

/// CRUD handler over one resource client
#[derive(Clone)]
pub struct LifecycleHandler {
    client: Arc<dyn ResourceClient>,
    locks: Arc<LockRegistry>,
    settings: PollSettings,
}

impl LifecycleHandler {
    pub fn new(client: Arc<dyn ResourceClient>, locks: Arc<LockRegistry>) -> Self {
        Self {
            client,
            locks,
            settings: PollSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    fn ensure_supported(&self, kind: ResourceKind) -> Result<()> {
        if self.client.supports(kind) {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "{} is not available on {} infrastructure",
                kind,
                self.client.generation()
            )))
        }
    }

    async fn acquire(&self, lock: Option<&LockKey>) -> Option<LockGuard> {
        match lock {
            Some(key) => Some(self.locks.lock(key).await),
            None => None,
        }
    }

    /// Build the poll configuration for waiting on `id` to reach `goal`
    pub fn poll_spec(
        &self,
        id: &ResourceId,
        goal: WaitGoal,
        timeout: Option<Duration>,
    ) -> Result<PollSpec> {
        let lifecycle = lifecycle(id.kind);
        let states = lifecycle.states(goal).ok_or_else(|| {
            Error::configuration(format!("{} cannot be waited on until {}", id.kind, goal))
        })?;
        let timeout = timeout.unwrap_or_else(|| lifecycle.timeouts.for_goal(goal));
        self.build_spec(id, goal, states, timeout)
    }

    fn build_spec(
        &self,
        id: &ResourceId,
        goal: WaitGoal,
        states: StateSets,
        timeout: Duration,
    ) -> Result<PollSpec> {
        PollSpec::builder(id.to_string(), goal)
            .states(states)
            .poll_interval(self.settings.poll_interval)
            .min_timeout(self.settings.min_timeout)
            .transient_retries(self.settings.transient_retries)
            .timeout(timeout)
            .build()
    }

    async fn poll(&self, id: &ResourceId, spec: &PollSpec) -> Result<PollOutcome<Snapshot>> {
        let lifecycle = lifecycle(id.kind);
        wait_for_state(spec, || self.fetch_state(id, &lifecycle)).await
    }

    async fn fetch_state(&self, id: &ResourceId, lifecycle: &Lifecycle) -> Result<PollResult<Snapshot>> {
        Ok(match self.client.get(id).await? {
            Some(snapshot) => {
                PollResult::new(snapshot.observed_state(lifecycle.status_field), snapshot)
            }
            None => PollResult::not_found(),
        })
    }

    /// Poll `id` until it reaches `goal`, without mutating it
    pub async fn wait(
        &self,
        id: &ResourceId,
        goal: WaitGoal,
        timeout: Option<Duration>,
    ) -> Result<PollOutcome<Snapshot>> {
        self.ensure_supported(id.kind)?;
        let spec = self.poll_spec(id, goal, timeout)?;
        self.poll(id, &spec).await
    }

    /// Create a resource and wait until it is available
    pub async fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
        options: MutationOptions,
    ) -> Result<Created> {
        self.ensure_supported(kind)?;
        if parents.len() != kind.parent_parts() {
            return Err(Error::configuration(format!(
                "{} needs {} parent id(s), got {}",
                kind,
                kind.parent_parts(),
                parents.len()
            )));
        }
        let _guard = self.acquire(options.lock.as_ref()).await;

        let created = self.client.create(kind, parents, body).await?;
        let id = ResourceId::created(kind, parents, &created)?;
        info!("Created {}", id);

        let outcome = self.wait(&id, WaitGoal::Available, options.timeout).await?;
        Ok(Created {
            snapshot: outcome.snapshot.unwrap_or(created),
            id,
        })
    }

    /// Current document, or `None` when the resource no longer exists
    pub async fn read(&self, id: &ResourceId) -> Result<Option<Snapshot>> {
        self.ensure_supported(id.kind)?;
        let snapshot = self.client.get(id).await?;
        if snapshot.is_none() {
            debug!("{} not found", id);
        }
        Ok(snapshot)
    }

    pub async fn exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }

    /// Every resource of `kind` under `parents`
    pub async fn list(&self, kind: ResourceKind, parents: &[String]) -> Result<Vec<Snapshot>> {
        self.ensure_supported(kind)?;
        if kind.is_singleton() {
            return Err(Error::configuration(format!("{} cannot be listed", kind)));
        }
        if parents.len() != kind.parent_parts() {
            return Err(Error::configuration(format!(
                "listing {} needs {} parent id(s), got {}",
                kind,
                kind.parent_parts(),
                parents.len()
            )));
        }

        let items = self.client.list(kind, parents).await?;
        debug!("Listed {} {} resource(s)", items.len(), kind);
        Ok(items)
    }

    /// First resource of `kind` under `parents` whose `name` is `name`
    pub async fn find_by_name(
        &self,
        kind: ResourceKind,
        parents: &[String],
        name: &str,
    ) -> Result<Option<Snapshot>> {
        Ok(self
            .list(kind, parents)
            .await?
            .into_iter()
            .find(|snapshot| snapshot.field("name") == Some(name)))
    }

    /// Patch a resource and wait until it is available again
    pub async fn update(
        &self,
        id: &ResourceId,
        patch: serde_json::Value,
        options: MutationOptions,
    ) -> Result<Snapshot> {
        self.ensure_supported(id.kind)?;
        let _guard = self.acquire(options.lock.as_ref()).await;

        let updated = self.client.update(id, patch).await?;
        info!("Updated {}", id);

        let lifecycle = lifecycle(id.kind);
        let timeout = options.timeout.unwrap_or(lifecycle.timeouts.update);
        let spec = self.build_spec(id, WaitGoal::Available, lifecycle.update_states(), timeout)?;
        let outcome = self.poll(id, &spec).await?;
        Ok(outcome.snapshot.unwrap_or(updated))
    }

    /// Delete a resource and wait until it is gone
    ///
    /// A resource that is already gone counts as deleted.
    pub async fn delete(&self, id: &ResourceId, options: MutationOptions) -> Result<()> {
        self.ensure_supported(id.kind)?;
        let _guard = self.acquire(options.lock.as_ref()).await;

        match self.client.delete(id).await {
            Ok(()) => info!("Deleting {}", id),
            Err(e) if e.is_not_found() => {
                info!("{} already deleted", id);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.wait(id, WaitGoal::Deleted, options.timeout).await?;
        info!("Deleted {}", id);
        Ok(())
    }
}
