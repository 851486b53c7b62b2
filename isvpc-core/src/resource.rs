//! Resource - Identifying VPC resources and the snapshots fetched for them

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// VPC resource kinds that have a lifecycle worth waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Vpc,
    Subnet,
    PublicGateway,
    SubnetPublicGatewayAttachment,
    NetworkAcl,
    VpcRoute,
    FloatingIp,
    VpnGateway,
    LoadBalancer,
    LoadBalancerListener,
    LoadBalancerListenerPolicy,
    DedicatedHost,
    Instance,
    BareMetalServer,
    BareMetalServerNetworkInterface,
    InstanceGroupMembership,
    Snapshot,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 17] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::PublicGateway,
        ResourceKind::SubnetPublicGatewayAttachment,
        ResourceKind::NetworkAcl,
        ResourceKind::VpcRoute,
        ResourceKind::FloatingIp,
        ResourceKind::VpnGateway,
        ResourceKind::LoadBalancer,
        ResourceKind::LoadBalancerListener,
        ResourceKind::LoadBalancerListenerPolicy,
        ResourceKind::DedicatedHost,
        ResourceKind::Instance,
        ResourceKind::BareMetalServer,
        ResourceKind::BareMetalServerNetworkInterface,
        ResourceKind::InstanceGroupMembership,
        ResourceKind::Snapshot,
    ];

    /// Snake-case name (e.g., "load_balancer_listener_policy")
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::PublicGateway => "public_gateway",
            ResourceKind::SubnetPublicGatewayAttachment => "subnet_public_gateway_attachment",
            ResourceKind::NetworkAcl => "network_acl",
            ResourceKind::VpcRoute => "vpc_route",
            ResourceKind::FloatingIp => "floating_ip",
            ResourceKind::VpnGateway => "vpn_gateway",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::LoadBalancerListener => "load_balancer_listener",
            ResourceKind::LoadBalancerListenerPolicy => "load_balancer_listener_policy",
            ResourceKind::DedicatedHost => "dedicated_host",
            ResourceKind::Instance => "instance",
            ResourceKind::BareMetalServer => "bare_metal_server",
            ResourceKind::BareMetalServerNetworkInterface => "bare_metal_server_network_interface",
            ResourceKind::InstanceGroupMembership => "instance_group_membership",
            ResourceKind::Snapshot => "snapshot",
        }
    }

    /// Number of path segments in a full identifier
    ///
    /// Nested resources are addressed by their parents' ids followed by their own,
    /// e.g. `lb/listener/policy` for a listener policy.
    pub fn id_parts(&self) -> usize {
        match self {
            ResourceKind::VpcRoute
            | ResourceKind::LoadBalancerListener
            | ResourceKind::BareMetalServerNetworkInterface
            | ResourceKind::InstanceGroupMembership => 2,
            ResourceKind::LoadBalancerListenerPolicy => 3,
            _ => 1,
        }
    }

    /// Singleton resources are created with PUT on their parent and have no id of their own
    pub fn is_singleton(&self) -> bool {
        matches!(self, ResourceKind::SubnetPublicGatewayAttachment)
    }

    /// Number of parent ids needed to create a resource of this kind
    pub fn parent_parts(&self) -> usize {
        if self.is_singleton() {
            self.id_parts()
        } else {
            self.id_parts() - 1
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().trim_start_matches("ibm_is_").replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| Error::configuration(format!("Unknown resource kind: {}", s)))
    }
}

/// Unique identifier for a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    /// Parent ids followed by the resource's own id
    pub parts: Vec<String>,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, parts: Vec<String>) -> Result<Self> {
        if parts.len() != kind.id_parts() {
            return Err(Error::configuration(format!(
                "{} id needs {} part(s) separated by '/', got {}",
                kind,
                kind.id_parts(),
                parts.len()
            )));
        }
        if let Some(index) = parts.iter().position(|p| p.trim().is_empty()) {
            return Err(Error::configuration(format!(
                "{} id part {} is empty",
                kind,
                index + 1
            )));
        }
        Ok(Self { kind, parts })
    }

    /// Parse a slash separated identifier (e.g., "r006-lb/r006-listener/r006-policy")
    pub fn parse(kind: ResourceKind, identifier: &str) -> Result<Self> {
        let parts = identifier.split('/').map(|p| p.to_string()).collect();
        Self::new(kind, parts)
    }

    /// Build the id of a resource created under `parents` and reported back as `snapshot`
    pub fn created(kind: ResourceKind, parents: &[String], snapshot: &Snapshot) -> Result<Self> {
        let mut parts = parents.to_vec();
        if !kind.is_singleton() {
            if snapshot.identifier.is_empty() {
                return Err(Error::decode(format!(
                    "create response for {} did not contain an id",
                    kind
                )));
            }
            parts.push(snapshot.identifier.clone());
        }
        Self::new(kind, parts)
    }

    /// Slash separated form, as stored by callers
    pub fn identifier(&self) -> String {
        self.parts.join("/")
    }

    /// The resource's own id (last segment)
    pub fn leaf(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.identifier())
    }
}

/// State reported by a remote resource during a poll
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObservedState {
    /// Value of the kind's status field
    Status(String),
    /// The resource exists but its kind reports no status
    Present,
    /// The remote returned 404 / `not_found`
    NotFound,
}

impl ObservedState {
    pub fn status(s: impl Into<String>) -> Self {
        ObservedState::Status(s.into())
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedState::Status(s) => write!(f, "{}", s),
            ObservedState::Present => write!(f, "present"),
            ObservedState::NotFound => write!(f, "not found"),
        }
    }
}

/// Raw resource document returned by the remote API
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Value of the document's `id` field (empty when absent)
    pub identifier: String,
    pub body: serde_json::Value,
}

impl Snapshot {
    pub fn from_json(body: serde_json::Value) -> Self {
        let identifier = body
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Self { identifier, body }
    }

    /// String value of a top-level field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(|v| v.as_str())
    }

    /// Lifecycle state according to `status_field`
    ///
    /// A document without the field (or a kind without one) counts as `Present`.
    pub fn observed_state(&self, status_field: Option<&str>) -> ObservedState {
        match status_field.and_then(|field| self.field(field)) {
            Some(status) => ObservedState::Status(status.to_string()),
            None => ObservedState::Present,
        }
    }

    /// Decode the document into a typed model
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| Error::decode(format!("Failed to decode resource: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_from_str_accepts_terraform_names() {
        assert_eq!(
            "ibm_is_dedicated_host".parse::<ResourceKind>().unwrap(),
            ResourceKind::DedicatedHost
        );
        assert_eq!(
            "vpc-route".parse::<ResourceKind>().unwrap(),
            ResourceKind::VpcRoute
        );
        assert!("volume".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.name().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn parse_checks_part_count() {
        let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, "lb/lis/pol").unwrap();
        assert_eq!(id.leaf(), "pol");
        assert_eq!(id.identifier(), "lb/lis/pol");
        assert_eq!(
            id.to_string(),
            "load_balancer_listener_policy (lb/lis/pol)"
        );

        let err = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, "lb/pol").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!(ResourceId::parse(ResourceKind::VpcRoute, "vpc/").is_err());
        assert!(ResourceId::parse(ResourceKind::Vpc, "").is_err());
    }

    #[test]
    fn created_appends_snapshot_id_unless_singleton() {
        let snapshot = Snapshot::from_json(json!({"id": "r006-pol", "provisioning_status": "create_pending"}));
        let parents = vec!["lb".to_string(), "lis".to_string()];
        let id = ResourceId::created(ResourceKind::LoadBalancerListenerPolicy, &parents, &snapshot).unwrap();
        assert_eq!(id.identifier(), "lb/lis/r006-pol");

        let gateway = Snapshot::from_json(json!({"id": "r006-pgw", "status": "pending"}));
        let id = ResourceId::created(
            ResourceKind::SubnetPublicGatewayAttachment,
            &["0717-subnet".to_string()],
            &gateway,
        )
        .unwrap();
        assert_eq!(id.identifier(), "0717-subnet");
    }

    #[test]
    fn created_without_id_is_an_error() {
        let snapshot = Snapshot::from_json(json!({"status": "pending"}));
        assert!(ResourceId::created(ResourceKind::Vpc, &[], &snapshot).is_err());
    }

    #[test]
    fn observed_state_reads_status_field() {
        let snapshot = Snapshot::from_json(json!({"id": "x", "lifecycle_state": "stable"}));
        assert_eq!(
            snapshot.observed_state(Some("lifecycle_state")),
            ObservedState::status("stable")
        );
        assert_eq!(snapshot.observed_state(Some("status")), ObservedState::Present);
        assert_eq!(snapshot.observed_state(None), ObservedState::Present);
    }
}
