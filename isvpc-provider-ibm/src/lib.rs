//! isvpc IBM Cloud Provider
//!
//! REST clients for the IBM Cloud VPC API, in both generations.
//!
//! ## Module Structure
//!
//! - `config` - Provider configuration from JSON or environment
//! - `auth` - IAM API key exchange and token cache
//! - `transport` - HTTP calls and IBM error payloads
//! - `resources` - Route table per resource kind
//! - `clients` - `VpcClient` (gen2) and `ClassicVpcClient` (gen1)
//! - `session` - Generation selection and the shared lock registry
//! - `listener_policy` - Load balancer listener policy operations
//! - `models` - Tagged unions for polymorphic response shapes

pub mod auth;
pub mod clients;
pub mod config;
pub mod listener_policy;
pub mod models;
pub mod resources;
pub mod session;
pub mod transport;

// Re-export main types
pub use clients::{ClassicVpcClient, VpcClient};
pub use config::ProviderConfig;
pub use listener_policy::{
    ListenerPolicy, ListenerPolicyPatch, ListenerPolicyPrototype, create_policy, delete_policy,
    update_policy,
};
pub use models::{Bandwidth, BareMetalServerProfile, PolicyRule};
pub use session::Session;
