//! Error type shared by the poller, the lifecycle handler and resource clients

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::WaitGoal;
use crate::resource::ObservedState;

/// The kind of call that produced a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    /// Present participle used in user-facing messages ("creating", "deleting", ...)
    pub fn gerund(&self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Read => "getting",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// Errors surfaced by lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input, detected before any remote call
    #[error("{0}")]
    Configuration(String),

    /// The remote resource does not exist (HTTP 404 outside of a poll)
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The remote API rejected a call
    #[error("Error {} {resource}: {message}\n{body}", .operation.gerund())]
    Remote {
        operation: Operation,
        resource: String,
        status: Option<u16>,
        code: Option<String>,
        message: String,
        body: String,
    },

    /// The poll deadline passed before a terminal state was observed
    #[error(
        "timeout while waiting for {resource} to become {goal}: no terminal state after {elapsed:?} (timeout {timeout:?})"
    )]
    Timeout {
        resource: String,
        goal: WaitGoal,
        timeout: Duration,
        elapsed: Duration,
    },

    /// The resource itself reported a failed lifecycle state
    #[error("{resource} reached terminal failure state '{state}'")]
    TerminalFailure {
        resource: String,
        state: ObservedState,
    },

    /// The resource disappeared while waiting for it to become something other than deleted
    #[error("{resource} vanished unexpectedly while waiting to become {goal}")]
    Vanished { resource: String, goal: WaitGoal },

    /// The resource reported a state that is neither pending, target nor failure
    #[error("{resource} reported unexpected state '{state}' while waiting to become {goal}")]
    UnexpectedState {
        resource: String,
        goal: WaitGoal,
        state: ObservedState,
    },

    /// The IAM endpoint refused to issue a token
    #[error("authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// A document could not be encoded or decoded
    #[error("invalid document: {0}")]
    Decode(String),

    /// The request never completed (connection refused, reset or timed out)
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// True for errors that may succeed when the same call is repeated:
    /// throttling, server-side failures and dropped connections
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote {
                status: Some(status),
                ..
            }
            | Error::Authentication { status, .. } => *status == 429 || *status >= 500,
            Error::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
