//! Route table for the VPC REST API
//!
//! This module defines:
//! - Where each resource kind lives in the URL space
//! - How it is created (POST on a collection, or PUT for singleton attachments)
//! - Which kinds exist on classic infrastructure

use isvpc_core::{Error, ResourceId, ResourceKind, Result};
use reqwest::Method;

/// How a resource kind maps onto REST paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteConfig {
    pub kind: ResourceKind,
    /// Collection name for each id part, outermost first
    pub collections: &'static [&'static str],
    /// Sub-resource name for singletons addressed through their parent
    pub singleton: Option<&'static str>,
    /// Available on generation 1 (classic) infrastructure
    pub classic: bool,
    /// Whether the API accepts direct creation
    pub creatable: bool,
}

// =============================================================================
// Networking
// =============================================================================

pub const VPC: RouteConfig = RouteConfig {
    kind: ResourceKind::Vpc,
    collections: &["vpcs"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const SUBNET: RouteConfig = RouteConfig {
    kind: ResourceKind::Subnet,
    collections: &["subnets"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const PUBLIC_GATEWAY: RouteConfig = RouteConfig {
    kind: ResourceKind::PublicGateway,
    collections: &["public_gateways"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const SUBNET_PUBLIC_GATEWAY_ATTACHMENT: RouteConfig = RouteConfig {
    kind: ResourceKind::SubnetPublicGatewayAttachment,
    collections: &["subnets"],
    singleton: Some("public_gateway"),
    classic: true,
    creatable: true,
};

pub const NETWORK_ACL: RouteConfig = RouteConfig {
    kind: ResourceKind::NetworkAcl,
    collections: &["network_acls"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const VPC_ROUTE: RouteConfig = RouteConfig {
    kind: ResourceKind::VpcRoute,
    collections: &["vpcs", "routes"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const FLOATING_IP: RouteConfig = RouteConfig {
    kind: ResourceKind::FloatingIp,
    collections: &["floating_ips"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const VPN_GATEWAY: RouteConfig = RouteConfig {
    kind: ResourceKind::VpnGateway,
    collections: &["vpn_gateways"],
    singleton: None,
    classic: true,
    creatable: true,
};

// =============================================================================
// Load Balancing
// =============================================================================

pub const LOAD_BALANCER: RouteConfig = RouteConfig {
    kind: ResourceKind::LoadBalancer,
    collections: &["load_balancers"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const LOAD_BALANCER_LISTENER: RouteConfig = RouteConfig {
    kind: ResourceKind::LoadBalancerListener,
    collections: &["load_balancers", "listeners"],
    singleton: None,
    classic: true,
    creatable: true,
};

pub const LOAD_BALANCER_LISTENER_POLICY: RouteConfig = RouteConfig {
    kind: ResourceKind::LoadBalancerListenerPolicy,
    collections: &["load_balancers", "listeners", "policies"],
    singleton: None,
    classic: true,
    creatable: true,
};

// =============================================================================
// Compute and Storage (generation 2 only)
// =============================================================================

pub const DEDICATED_HOST: RouteConfig = RouteConfig {
    kind: ResourceKind::DedicatedHost,
    collections: &["dedicated_hosts"],
    singleton: None,
    classic: false,
    creatable: true,
};

pub const INSTANCE: RouteConfig = RouteConfig {
    kind: ResourceKind::Instance,
    collections: &["instances"],
    singleton: None,
    classic: false,
    creatable: true,
};

pub const BARE_METAL_SERVER: RouteConfig = RouteConfig {
    kind: ResourceKind::BareMetalServer,
    collections: &["bare_metal_servers"],
    singleton: None,
    classic: false,
    creatable: true,
};

pub const BARE_METAL_SERVER_NETWORK_INTERFACE: RouteConfig = RouteConfig {
    kind: ResourceKind::BareMetalServerNetworkInterface,
    collections: &["bare_metal_servers", "network_interfaces"],
    singleton: None,
    classic: false,
    creatable: true,
};

// Memberships are created by the instance group, never directly.
pub const INSTANCE_GROUP_MEMBERSHIP: RouteConfig = RouteConfig {
    kind: ResourceKind::InstanceGroupMembership,
    collections: &["instance_groups", "memberships"],
    singleton: None,
    classic: false,
    creatable: false,
};

pub const SNAPSHOT: RouteConfig = RouteConfig {
    kind: ResourceKind::Snapshot,
    collections: &["snapshots"],
    singleton: None,
    classic: false,
    creatable: true,
};

/// Route configuration for a resource kind
pub fn route(kind: ResourceKind) -> RouteConfig {
    match kind {
        ResourceKind::Vpc => VPC,
        ResourceKind::Subnet => SUBNET,
        ResourceKind::PublicGateway => PUBLIC_GATEWAY,
        ResourceKind::SubnetPublicGatewayAttachment => SUBNET_PUBLIC_GATEWAY_ATTACHMENT,
        ResourceKind::NetworkAcl => NETWORK_ACL,
        ResourceKind::VpcRoute => VPC_ROUTE,
        ResourceKind::FloatingIp => FLOATING_IP,
        ResourceKind::VpnGateway => VPN_GATEWAY,
        ResourceKind::LoadBalancer => LOAD_BALANCER,
        ResourceKind::LoadBalancerListener => LOAD_BALANCER_LISTENER,
        ResourceKind::LoadBalancerListenerPolicy => LOAD_BALANCER_LISTENER_POLICY,
        ResourceKind::DedicatedHost => DEDICATED_HOST,
        ResourceKind::Instance => INSTANCE,
        ResourceKind::BareMetalServer => BARE_METAL_SERVER,
        ResourceKind::BareMetalServerNetworkInterface => BARE_METAL_SERVER_NETWORK_INTERFACE,
        ResourceKind::InstanceGroupMembership => INSTANCE_GROUP_MEMBERSHIP,
        ResourceKind::Snapshot => SNAPSHOT,
    }
}

impl RouteConfig {
    /// Path of an existing resource (e.g., "/load_balancers/lb/listeners/lis")
    pub fn item_path(&self, id: &ResourceId) -> String {
        let mut path = interleave(self.collections, &id.parts);
        if let Some(singleton) = self.singleton {
            path.push('/');
            path.push_str(singleton);
        }
        path
    }

    /// Path the create call is sent to
    pub fn create_path(&self, parents: &[String]) -> Result<String> {
        if !self.creatable {
            return Err(Error::configuration(format!(
                "{} cannot be created directly",
                self.kind
            )));
        }
        if parents.len() != self.kind.parent_parts() {
            return Err(Error::configuration(format!(
                "{} needs {} parent id(s), got {}",
                self.kind,
                self.kind.parent_parts(),
                parents.len()
            )));
        }

        let mut path = interleave(self.collections, parents);
        match self.singleton {
            Some(singleton) => {
                path.push('/');
                path.push_str(singleton);
            }
            None => {
                if let Some(collection) = self.collections.get(parents.len()) {
                    path.push('/');
                    path.push_str(collection);
                }
            }
        }
        Ok(path)
    }

    /// Path of the collection holding resources of this kind under `parents`
    pub fn list_path(&self, parents: &[String]) -> Result<String> {
        if self.singleton.is_some() {
            return Err(Error::configuration(format!(
                "{} is a singleton and cannot be listed",
                self.kind
            )));
        }
        let expected = self.collections.len() - 1;
        if parents.len() != expected {
            return Err(Error::configuration(format!(
                "listing {} needs {} parent id(s), got {}",
                self.kind,
                expected,
                parents.len()
            )));
        }
        Ok(format!(
            "{}/{}",
            interleave(self.collections, parents),
            self.collection_key()
        ))
    }

    /// Field of a list response that carries the page's items
    pub fn collection_key(&self) -> &'static str {
        self.collections.last().copied().unwrap_or_default()
    }

    pub fn create_method(&self) -> Method {
        if self.singleton.is_some() {
            Method::PUT
        } else {
            Method::POST
        }
    }
}

/// "/c1/p1/c2/p2" for as many parts as are given, each id percent-encoded
fn interleave(collections: &[&str], parts: &[String]) -> String {
    collections
        .iter()
        .zip(parts)
        .map(|(collection, part)| format!("/{}/{}", collection, urlencoding::encode(part)))
        .collect()
}
