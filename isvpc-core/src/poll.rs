//! Poll - Waiting for a remote resource to reach a terminal lifecycle state
//!
//! A [`PollSpec`] describes one wait: which observed states mean "keep waiting",
//! which mean "done" and which mean "failed", plus the polling cadence and the
//! overall deadline. [`wait_for_state`] drives a fetch closure against it.
//!
//! Matching is strict: a state that is in none of the three sets ends the wait
//! with [`Error::UnexpectedState`] instead of being treated as success.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::lifecycle::{StateSets, WaitGoal};
use crate::resource::ObservedState;

/// Delay between attempts used by every call site
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum delay between two fetches
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult<T> {
    pub state: ObservedState,
    /// Resource document, absent when the resource was not found
    pub snapshot: Option<T>,
}

impl<T> PollResult<T> {
    pub fn new(state: ObservedState, snapshot: T) -> Self {
        Self {
            state,
            snapshot: Some(snapshot),
        }
    }

    pub fn not_found() -> Self {
        Self {
            state: ObservedState::NotFound,
            snapshot: None,
        }
    }
}

/// Successful end of a poll session
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    pub state: ObservedState,
    pub snapshot: Option<T>,
    /// Number of fetch calls made
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Immutable configuration of one poll session
#[derive(Debug, Clone)]
pub struct PollSpec {
    resource: String,
    goal: WaitGoal,
    pending: BTreeSet<ObservedState>,
    target: BTreeSet<ObservedState>,
    failure: BTreeSet<ObservedState>,
    poll_interval: Duration,
    min_timeout: Duration,
    timeout: Duration,
    transient_retries: u32,
}

impl PollSpec {
    pub fn builder(resource: impl Into<String>, goal: WaitGoal) -> PollSpecBuilder {
        PollSpecBuilder {
            resource: resource.into(),
            goal,
            pending: BTreeSet::new(),
            target: BTreeSet::new(),
            failure: BTreeSet::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            timeout: None,
            transient_retries: 0,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn goal(&self) -> WaitGoal {
        self.goal
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay actually slept between attempts
    pub fn delay(&self) -> Duration {
        self.poll_interval.max(self.min_timeout)
    }

    pub fn is_pending(&self, state: &ObservedState) -> bool {
        self.pending.contains(state)
    }

    pub fn is_target(&self, state: &ObservedState) -> bool {
        self.target.contains(state)
    }

    pub fn is_failure(&self, state: &ObservedState) -> bool {
        self.failure.contains(state)
    }
}

/// Builder for [`PollSpec`]; `build` enforces the set invariants
#[derive(Debug, Clone)]
pub struct PollSpecBuilder {
    resource: String,
    goal: WaitGoal,
    pending: BTreeSet<ObservedState>,
    target: BTreeSet<ObservedState>,
    failure: BTreeSet<ObservedState>,
    poll_interval: Duration,
    min_timeout: Duration,
    timeout: Option<Duration>,
    transient_retries: u32,
}

impl PollSpecBuilder {
    pub fn states(mut self, sets: StateSets) -> Self {
        self.pending = sets.pending;
        self.target = sets.target;
        self.failure = sets.failure;
        self
    }

    pub fn pending(mut self, states: impl IntoIterator<Item = ObservedState>) -> Self {
        self.pending.extend(states);
        self
    }

    pub fn target(mut self, states: impl IntoIterator<Item = ObservedState>) -> Self {
        self.target.extend(states);
        self
    }

    pub fn failure(mut self, states: impl IntoIterator<Item = ObservedState>) -> Self {
        self.failure.extend(states);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consecutive transient fetch errors to tolerate (0 = fail on the first one)
    pub fn transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    pub fn build(self) -> Result<PollSpec> {
        let timeout = self.timeout.ok_or_else(|| {
            Error::configuration(format!("poll for {} has no timeout", self.resource))
        })?;
        if timeout.is_zero() {
            return Err(Error::configuration(format!(
                "poll for {} has a zero timeout",
                self.resource
            )));
        }
        if self.target.is_empty() {
            return Err(Error::configuration(format!(
                "poll for {} has no target state",
                self.resource
            )));
        }
        if self.poll_interval.max(self.min_timeout).is_zero() {
            return Err(Error::configuration(format!(
                "poll for {} has a zero poll interval",
                self.resource
            )));
        }

        let overlaps = [
            ("pending", &self.pending, "target", &self.target),
            ("pending", &self.pending, "failure", &self.failure),
            ("target", &self.target, "failure", &self.failure),
        ];
        for (first_name, first, second_name, second) in overlaps {
            if let Some(state) = first.intersection(second).next() {
                return Err(Error::configuration(format!(
                    "poll for {}: state '{}' is both {} and {}",
                    self.resource, state, first_name, second_name
                )));
            }
        }

        Ok(PollSpec {
            resource: self.resource,
            goal: self.goal,
            pending: self.pending,
            target: self.target,
            failure: self.failure,
            poll_interval: self.poll_interval,
            min_timeout: self.min_timeout,
            timeout,
            transient_retries: self.transient_retries,
        })
    }
}

/// Call `fetch` until it reports a target state, a failure, or the deadline passes
///
/// The first fetch happens immediately. The fetch is never called once the
/// deadline has passed.
pub async fn wait_for_state<T, F, Fut>(spec: &PollSpec, mut fetch: F) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollResult<T>>>,
{
    let start = Instant::now();
    let deadline = start + spec.timeout;
    let delay = spec.delay();
    let mut attempts = 0u32;
    let mut transient_failures = 0u32;

    loop {
        attempts += 1;
        match fetch().await {
            Err(e) if e.is_transient() && transient_failures < spec.transient_retries => {
                transient_failures += 1;
                warn!(
                    "{}: transient error on attempt {} ({}/{} retries): {}",
                    spec.resource, attempts, transient_failures, spec.transient_retries, e
                );
            }
            Err(e) => {
                warn!("{}: giving up after {} attempt(s): {}", spec.resource, attempts, e);
                return Err(e);
            }
            Ok(result) => {
                transient_failures = 0;
                let state = result.state;
                debug!(
                    "{}: attempt {} observed '{}' (waiting for {})",
                    spec.resource, attempts, state, spec.goal
                );

                if spec.is_failure(&state) {
                    warn!("{}: terminal failure state '{}'", spec.resource, state);
                    return Err(Error::TerminalFailure {
                        resource: spec.resource.clone(),
                        state,
                    });
                }
                if spec.is_target(&state) {
                    let elapsed = start.elapsed();
                    info!(
                        "{} is {} after {} attempt(s) in {:?}",
                        spec.resource, spec.goal, attempts, elapsed
                    );
                    return Ok(PollOutcome {
                        state,
                        snapshot: result.snapshot,
                        attempts,
                        elapsed,
                    });
                }
                if state == ObservedState::NotFound {
                    return Err(Error::Vanished {
                        resource: spec.resource.clone(),
                        goal: spec.goal,
                    });
                }
                if !spec.is_pending(&state) {
                    return Err(Error::UnexpectedState {
                        resource: spec.resource.clone(),
                        goal: spec.goal,
                        state,
                    });
                }
            }
        }

        let now = Instant::now();
        if now < deadline {
            tokio::time::sleep(delay.min(deadline - now)).await;
        }
        if Instant::now() >= deadline {
            let elapsed = start.elapsed();
            warn!(
                "{}: timed out after {:?} waiting to become {}",
                spec.resource, elapsed, spec.goal
            );
            return Err(Error::Timeout {
                resource: spec.resource.clone(),
                goal: spec.goal,
                timeout: spec.timeout,
                elapsed,
            });
        }
    }
}
