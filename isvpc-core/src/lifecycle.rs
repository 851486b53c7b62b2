//! Lifecycle vocabulary for every resource kind
//!
//! Each kind reports its lifecycle through one status field. This module maps
//! the values of that field to "keep waiting", "done" and "failed" for each
//! thing a caller can wait for, together with default operation timeouts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resource::{ObservedState, ResourceKind};

/// What a poll session waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitGoal {
    Available,
    Deleted,
    Stopped,
}

impl fmt::Display for WaitGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitGoal::Available => "available",
            WaitGoal::Deleted => "deleted",
            WaitGoal::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for WaitGoal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(WaitGoal::Available),
            "deleted" => Ok(WaitGoal::Deleted),
            "stopped" => Ok(WaitGoal::Stopped),
            other => Err(Error::configuration(format!(
                "Unknown wait goal: {} (expected available, deleted or stopped)",
                other
            ))),
        }
    }
}

/// Raw status strings for one goal
///
/// For `Deleted`, `target` is always empty: the only terminal success is `NotFound`.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
    pub failure: &'static [&'static str],
}

/// Default operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    /// Timeout for a wait of the given goal
    pub fn for_goal(&self, goal: WaitGoal) -> Duration {
        match goal {
            WaitGoal::Available => self.create,
            WaitGoal::Stopped => self.update,
            WaitGoal::Deleted => self.delete,
        }
    }
}

/// Observed-state sets handed to the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSets {
    pub pending: BTreeSet<ObservedState>,
    pub target: BTreeSet<ObservedState>,
    pub failure: BTreeSet<ObservedState>,
}

/// Lifecycle description of one resource kind
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    pub kind: ResourceKind,
    /// Field carrying the lifecycle state; `None` for kinds that are ready once created
    pub status_field: Option<&'static str>,
    pub available: Vocabulary,
    pub deleted: Vocabulary,
    pub stopped: Option<Vocabulary>,
    pub timeouts: Timeouts,
}

impl Lifecycle {
    /// Goals this kind supports
    pub fn goals(&self) -> Vec<WaitGoal> {
        let mut goals = vec![WaitGoal::Available, WaitGoal::Deleted];
        if self.stopped.is_some() {
            goals.push(WaitGoal::Stopped);
        }
        goals
    }

    /// State sets for `goal`, or `None` when the kind cannot reach it
    pub fn states(&self, goal: WaitGoal) -> Option<StateSets> {
        let vocabulary = match goal {
            WaitGoal::Available => self.available,
            WaitGoal::Deleted => self.deleted,
            WaitGoal::Stopped => self.stopped?,
        };
        Some(self.sets_for(goal, vocabulary))
    }

    /// States that end the wait after an update has been applied
    ///
    /// An update does not change the power state, so kinds that can be stopped
    /// also settle in their stopped state.
    pub fn update_states(&self) -> StateSets {
        let mut sets = self.sets_for(WaitGoal::Available, self.available);
        if let Some(stopped) = self.stopped {
            sets.target.extend(to_set(stopped.target));
            let pending: Vec<ObservedState> = to_set(stopped.pending)
                .into_iter()
                .filter(|state| !sets.target.contains(state))
                .collect();
            sets.pending.extend(pending);
        }
        sets
    }

    fn sets_for(&self, goal: WaitGoal, vocabulary: Vocabulary) -> StateSets {
        let mut sets = StateSets {
            pending: to_set(vocabulary.pending),
            target: to_set(vocabulary.target),
            failure: to_set(vocabulary.failure),
        };

        if goal == WaitGoal::Deleted {
            sets.target = BTreeSet::from([ObservedState::NotFound]);
        }

        if self.status_field.is_none() {
            // Without a status the only signal is whether the resource exists.
            match goal {
                WaitGoal::Deleted => sets.pending.insert(ObservedState::Present),
                _ => sets.target.insert(ObservedState::Present),
            };
        }

        sets
    }
}

fn to_set(values: &[&str]) -> BTreeSet<ObservedState> {
    values.iter().map(|s| ObservedState::status(*s)).collect()
}

// =============================================================================
// Vocabularies
// =============================================================================

const STATUS_AVAILABLE: Vocabulary = Vocabulary {
    pending: &["pending"],
    target: &["available"],
    failure: &["failed"],
};

const STATUS_DELETED: Vocabulary = Vocabulary {
    pending: &["available", "pending", "deleting"],
    target: &[],
    failure: &["failed"],
};

const LIFECYCLE_STATE_AVAILABLE: Vocabulary = Vocabulary {
    pending: &["pending", "updating", "waiting"],
    target: &["stable"],
    failure: &["failed", "suspended"],
};

const LIFECYCLE_STATE_DELETED: Vocabulary = Vocabulary {
    pending: &["stable", "pending", "updating", "waiting", "deleting"],
    target: &[],
    failure: &["failed"],
};

const PROVISIONING_AVAILABLE: Vocabulary = Vocabulary {
    pending: &[
        "create_pending",
        "update_pending",
        "maintenance_pending",
        "migrate_pending",
    ],
    target: &["active"],
    failure: &["failed"],
};

const PROVISIONING_DELETED: Vocabulary = Vocabulary {
    pending: &[
        "active",
        "delete_pending",
        "update_pending",
        "maintenance_pending",
        "migrate_pending",
    ],
    target: &[],
    failure: &["failed"],
};

const COMPUTE_AVAILABLE: Vocabulary = Vocabulary {
    pending: &["pending", "starting", "restarting"],
    target: &["running"],
    failure: &["failed"],
};

const COMPUTE_DELETED: Vocabulary = Vocabulary {
    pending: &[
        "running",
        "stopping",
        "stopped",
        "starting",
        "restarting",
        "pending",
        "deleting",
    ],
    target: &[],
    failure: &["failed"],
};

const COMPUTE_STOPPED: Vocabulary = Vocabulary {
    pending: &["running", "stopping", "pending", "starting", "restarting"],
    target: &["stopped"],
    failure: &["failed"],
};

const MEMBERSHIP_AVAILABLE: Vocabulary = Vocabulary {
    pending: &["pending"],
    target: &["healthy"],
    failure: &["failed", "unhealthy"],
};

const MEMBERSHIP_DELETED: Vocabulary = Vocabulary {
    pending: &["healthy", "unhealthy", "pending", "deleting"],
    target: &[],
    failure: &["failed"],
};

const NO_STATUS: Vocabulary = Vocabulary {
    pending: &[],
    target: &[],
    failure: &[],
};

// =============================================================================
// Table
// =============================================================================

/// Lifecycle description for `kind`
pub fn lifecycle(kind: ResourceKind) -> Lifecycle {
    let status = |timeouts| Lifecycle {
        kind,
        status_field: Some("status"),
        available: STATUS_AVAILABLE,
        deleted: STATUS_DELETED,
        stopped: None,
        timeouts,
    };
    let lifecycle_state = |timeouts| Lifecycle {
        kind,
        status_field: Some("lifecycle_state"),
        available: LIFECYCLE_STATE_AVAILABLE,
        deleted: LIFECYCLE_STATE_DELETED,
        stopped: None,
        timeouts,
    };
    let provisioning = |timeouts| Lifecycle {
        kind,
        status_field: Some("provisioning_status"),
        available: PROVISIONING_AVAILABLE,
        deleted: PROVISIONING_DELETED,
        stopped: None,
        timeouts,
    };
    let compute = |timeouts| Lifecycle {
        kind,
        status_field: Some("status"),
        available: COMPUTE_AVAILABLE,
        deleted: COMPUTE_DELETED,
        stopped: Some(COMPUTE_STOPPED),
        timeouts,
    };

    match kind {
        ResourceKind::Vpc
        | ResourceKind::Subnet
        | ResourceKind::PublicGateway
        | ResourceKind::SubnetPublicGatewayAttachment
        | ResourceKind::FloatingIp
        | ResourceKind::BareMetalServerNetworkInterface => status(Timeouts::minutes(10, 10, 10)),
        ResourceKind::VpnGateway => status(Timeouts::minutes(60, 60, 60)),
        ResourceKind::NetworkAcl => Lifecycle {
            kind,
            status_field: None,
            available: NO_STATUS,
            deleted: NO_STATUS,
            stopped: None,
            timeouts: Timeouts::minutes(10, 10, 10),
        },
        ResourceKind::VpcRoute | ResourceKind::DedicatedHost | ResourceKind::Snapshot => {
            lifecycle_state(Timeouts::minutes(10, 10, 10))
        }
        ResourceKind::LoadBalancer => provisioning(Timeouts::minutes(30, 30, 30)),
        ResourceKind::LoadBalancerListener => provisioning(Timeouts::minutes(60, 60, 60)),
        ResourceKind::LoadBalancerListenerPolicy => provisioning(Timeouts::minutes(10, 10, 10)),
        ResourceKind::Instance => compute(Timeouts::minutes(60, 30, 60)),
        ResourceKind::BareMetalServer => compute(Timeouts::minutes(30, 30, 30)),
        ResourceKind::InstanceGroupMembership => Lifecycle {
            kind,
            status_field: Some("status"),
            available: MEMBERSHIP_AVAILABLE,
            deleted: MEMBERSHIP_DELETED,
            stopped: None,
            timeouts: Timeouts::minutes(10, 10, 10),
        },
    }
}
