//! isvpc Core
//!
//! Lifecycle runtime for IBM Cloud VPC resources: a state poller, the per-kind
//! lifecycle vocabulary, an advisory lock registry and a CRUD handler that ties
//! them to a generation-specific resource client.

pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod lock;
pub mod poll;
pub mod provider;
pub mod resource;

pub use error::{Error, Operation, Result};
pub use handler::{Created, LifecycleHandler, MutationOptions, PollSettings};
pub use lifecycle::{Lifecycle, StateSets, Timeouts, WaitGoal, lifecycle};
pub use lock::{LockGuard, LockKey, LockRegistry};
pub use poll::{PollOutcome, PollResult, PollSpec, PollSpecBuilder, wait_for_state};
pub use provider::{BoxFuture, Generation, ResourceClient};
pub use resource::{ObservedState, ResourceId, ResourceKind, Snapshot};
