//! Load balancer listener policies
//!
//! A load balancer accepts one change at a time, so every policy mutation runs
//! under the load balancer's lock and waits for it to be active first.

use std::time::Duration;

use isvpc_core::{
    Created, Error, LifecycleHandler, LockGuard, LockKey, MutationOptions, ResourceId,
    ResourceKind, Result, Snapshot, WaitGoal,
};
use log::info;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::PolicyRule;

const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Lowest and highest priority a policy can have
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Request body for a new listener policy
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerPolicyPrototype {
    pub name: Option<String>,
    pub priority: u32,
    pub rule: PolicyRule,
}

impl ListenerPolicyPrototype {
    pub fn new(priority: u32, rule: PolicyRule) -> Self {
        Self {
            name: None,
            priority,
            rule,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the policy before anything is sent
    pub fn validate(&self) -> Result<()> {
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(Error::configuration(format!(
                "Listener policy priority must be between {} and {}, got {}",
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end(),
                self.priority
            )));
        }
        validate_rule(&self.rule)
    }

    /// `{"name", "priority", "action", "target"}` request body
    pub fn to_body(&self) -> Result<Value> {
        let mut body = match encode_rule(&self.rule)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(name) = &self.name {
            body.insert("name".to_string(), Value::String(name.clone()));
        }
        body.insert("priority".to_string(), Value::from(self.priority));
        Ok(Value::Object(body))
    }
}

fn encode_rule(rule: &PolicyRule) -> Result<Value> {
    serde_json::to_value(rule)
        .map_err(|e| Error::decode(format!("Failed to encode policy target: {}", e)))
}

fn validate_rule(rule: &PolicyRule) -> Result<()> {
    match rule {
        PolicyRule::Forward(pool) if pool.id.trim().is_empty() => Err(Error::configuration(
            "A forward policy needs a target pool id",
        )),
        PolicyRule::Redirect(target) => {
            if target.url.trim().is_empty() {
                return Err(Error::configuration("A redirect policy needs a target URL"));
            }
            check_status_code(target.http_status_code)
        }
        PolicyRule::HttpsRedirect(target) => {
            if target.listener.id.trim().is_empty() {
                return Err(Error::configuration(
                    "An https_redirect policy needs a target listener id",
                ));
            }
            check_status_code(target.http_status_code)
        }
        _ => Ok(()),
    }
}

fn check_status_code(code: u16) -> Result<()> {
    if REDIRECT_STATUS_CODES.contains(&code) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "Redirect status code must be one of 301, 302, 303, 307 or 308, got {}",
            code
        )))
    }
}

/// Changes to an existing policy; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerPolicyPatch {
    pub name: Option<String>,
    pub priority: Option<u32>,
    /// New target; must match the policy's existing action
    pub rule: Option<PolicyRule>,
}

impl ListenerPolicyPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(priority) = self.priority
            && !PRIORITY_RANGE.contains(&priority)
        {
            return Err(Error::configuration(format!(
                "Listener policy priority must be between {} and {}, got {}",
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end(),
                priority
            )));
        }
        match &self.rule {
            Some(PolicyRule::Reject) => Err(Error::configuration(
                "A reject policy has no target to update",
            )),
            Some(rule) => validate_rule(rule),
            None => Ok(()),
        }
    }

    /// Merge patch body; the action itself cannot change
    pub fn to_body(&self) -> Result<Value> {
        let mut body = Map::new();
        if let Some(name) = &self.name {
            body.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(priority) = self.priority {
            body.insert("priority".to_string(), Value::from(priority));
        }
        if let Some(rule) = &self.rule {
            if let Some(target) = encode_rule(rule)?.get("target") {
                body.insert("target".to_string(), target.clone());
            }
        }
        Ok(Value::Object(body))
    }
}

/// A listener policy as reported by the API
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerPolicy {
    pub id: String,
    pub name: Option<String>,
    pub priority: u32,
    pub provisioning_status: Option<String>,
    pub rule: PolicyRule,
}

#[derive(Deserialize)]
struct PolicyHeader {
    id: String,
    #[serde(default)]
    name: Option<String>,
    priority: u32,
    #[serde(default)]
    provisioning_status: Option<String>,
}

impl ListenerPolicy {
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let header: PolicyHeader = snapshot.decode()?;
        let rule: PolicyRule = snapshot.decode()?;
        Ok(Self {
            id: header.id,
            name: header.name,
            priority: header.priority,
            provisioning_status: header.provisioning_status,
            rule,
        })
    }
}

/// Take the load balancer's lock, then wait until it accepts changes
///
/// The guard must outlive the mutation and the poll after it.
async fn settle_load_balancer(handler: &LifecycleHandler, load_balancer: &str) -> Result<LockGuard> {
    let id = ResourceId::parse(ResourceKind::LoadBalancer, load_balancer)?;
    let guard = handler.locks().lock(&LockKey::load_balancer(load_balancer)).await;
    handler.wait(&id, WaitGoal::Available, None).await?;
    Ok(guard)
}

fn unlocked(timeout: Option<Duration>) -> MutationOptions {
    MutationOptions {
        lock: None,
        timeout,
    }
}

/// Create a policy on `listener` and wait until it is active
pub async fn create_policy(
    handler: &LifecycleHandler,
    load_balancer: &str,
    listener: &str,
    prototype: &ListenerPolicyPrototype,
    timeout: Option<Duration>,
) -> Result<(ResourceId, ListenerPolicy)> {
    prototype.validate()?;
    let body = prototype.to_body()?;

    let _guard = settle_load_balancer(handler, load_balancer).await?;
    let parents = vec![load_balancer.to_string(), listener.to_string()];
    let Created { id, snapshot } = handler
        .create(
            ResourceKind::LoadBalancerListenerPolicy,
            &parents,
            body,
            unlocked(timeout),
        )
        .await?;
    info!("Listener policy {} is active", id);

    Ok((id, ListenerPolicy::from_snapshot(&snapshot)?))
}

/// Patch a policy and wait until it is active again
pub async fn update_policy(
    handler: &LifecycleHandler,
    id: &ResourceId,
    patch: &ListenerPolicyPatch,
    timeout: Option<Duration>,
) -> Result<ListenerPolicy> {
    patch.validate()?;
    let body = patch.to_body()?;
    let load_balancer = policy_load_balancer(id)?;

    let _guard = settle_load_balancer(handler, load_balancer).await?;
    let snapshot = handler.update(id, body, unlocked(timeout)).await?;
    ListenerPolicy::from_snapshot(&snapshot)
}

/// Delete a policy and wait until it is gone
pub async fn delete_policy(
    handler: &LifecycleHandler,
    id: &ResourceId,
    timeout: Option<Duration>,
) -> Result<()> {
    let load_balancer = policy_load_balancer(id)?;

    let _guard = settle_load_balancer(handler, load_balancer).await?;
    handler.delete(id, unlocked(timeout)).await
}

fn policy_load_balancer(id: &ResourceId) -> Result<&str> {
    match (id.kind, id.parts.as_slice()) {
        (ResourceKind::LoadBalancerListenerPolicy, [load_balancer, _listener, _policy]) => {
            Ok(load_balancer.as_str())
        }
        _ => Err(Error::configuration(format!(
            "{} is not a load balancer listener policy (expected lb/listener/policy)",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::models::{HttpsRedirectTarget, ListenerReference, PoolReference, RedirectTarget};
    use crate::session::Session;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forward(pool: &str) -> PolicyRule {
        PolicyRule::Forward(PoolReference {
            id: pool.to_string(),
            name: None,
        })
    }

    fn session(server: &MockServer) -> Session {
        Session::new(ProviderConfig {
            iam_token: Some("tok".to_string()),
            endpoint: Some(server.uri()),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn prototype_validation() {
        assert!(ListenerPolicyPrototype::new(1, forward("pool")).validate().is_ok());
        assert!(ListenerPolicyPrototype::new(0, forward("pool")).validate().is_err());
        assert!(ListenerPolicyPrototype::new(11, PolicyRule::Reject).validate().is_err());
        assert!(ListenerPolicyPrototype::new(3, forward(" ")).validate().is_err());

        let redirect = |code| {
            PolicyRule::Redirect(RedirectTarget {
                url: "https://example.com".to_string(),
                http_status_code: code,
            })
        };
        assert!(ListenerPolicyPrototype::new(2, redirect(308)).validate().is_ok());
        let err = ListenerPolicyPrototype::new(2, redirect(200)).validate().unwrap_err();
        assert!(err.to_string().contains("got 200"));

        let https = PolicyRule::HttpsRedirect(HttpsRedirectTarget {
            listener: ListenerReference { id: String::new() },
            http_status_code: 301,
            uri: None,
        });
        assert!(ListenerPolicyPrototype::new(2, https).validate().is_err());
    }

    #[test]
    fn prototype_body_carries_action_and_target() {
        let body = ListenerPolicyPrototype::new(4, forward("pool-1"))
            .with_name("to-pool")
            .to_body()
            .unwrap();
        assert_eq!(
            body,
            json!({
                "name": "to-pool",
                "priority": 4,
                "action": "forward",
                "target": {"id": "pool-1"}
            })
        );
    }

    #[test]
    fn patch_body_omits_action() {
        let patch = ListenerPolicyPatch {
            priority: Some(5),
            rule: Some(forward("pool-2")),
            ..ListenerPolicyPatch::default()
        };
        patch.validate().unwrap();
        assert_eq!(
            patch.to_body().unwrap(),
            json!({"priority": 5, "target": {"id": "pool-2"}})
        );

        let reject = ListenerPolicyPatch {
            rule: Some(PolicyRule::Reject),
            ..ListenerPolicyPatch::default()
        };
        assert!(reject.validate().is_err());
    }

    #[test]
    fn policy_decodes_from_snapshot() {
        let snapshot = Snapshot::from_json(json!({
            "id": "pol",
            "name": "redirect-all",
            "priority": 2,
            "action": "redirect",
            "target": {"url": "https://example.com", "http_status_code": 302},
            "provisioning_status": "active"
        }));
        let policy = ListenerPolicy::from_snapshot(&snapshot).unwrap();
        assert_eq!(policy.priority, 2);
        assert_eq!(policy.rule.action(), "redirect");
        assert_eq!(policy.provisioning_status.as_deref(), Some("active"));
    }

    #[tokio::test]
    async fn invalid_prototype_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let session = session(&server);
        let err = create_policy(
            &session.handler(),
            "lb",
            "lis",
            &ListenerPolicyPrototype::new(42, PolicyRule::Reject),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn create_waits_for_load_balancer_then_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "lb",
                "provisioning_status": "active"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/load_balancers/lb/listeners/lis/policies"))
            .and(body_json(json!({"priority": 1, "action": "reject"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pol",
                "priority": 1,
                "action": "reject",
                "provisioning_status": "create_pending"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb/listeners/lis/policies/pol"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pol",
                "priority": 1,
                "action": "reject",
                "provisioning_status": "active"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let handler = session.handler();
        let (id, policy) = create_policy(
            &handler,
            "lb",
            "lis",
            &ListenerPolicyPrototype::new(1, PolicyRule::Reject),
            None,
        )
        .await
        .unwrap();

        assert_eq!(id.identifier(), "lb/lis/pol");
        assert_eq!(policy.rule, PolicyRule::Reject);
        assert!(
            handler
                .locks()
                .try_lock(&LockKey::load_balancer("lb"))
                .is_some()
        );
    }

    async fn mount_active_load_balancer(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "lb",
                "provisioning_status": "active"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn request_log(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| format!("{} {}", request.method, request.url.path()))
            .collect()
    }

    #[tokio::test]
    async fn update_waits_for_load_balancer_before_patching() {
        let server = MockServer::start().await;
        mount_active_load_balancer(&server).await;
        Mock::given(method("PATCH"))
            .and(path("/load_balancers/lb/listeners/lis/policies/pol"))
            .and(body_json(json!({"priority": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pol",
                "priority": 3,
                "action": "reject",
                "provisioning_status": "update_pending"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb/listeners/lis/policies/pol"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pol",
                "priority": 3,
                "action": "reject",
                "provisioning_status": "active"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, "lb/lis/pol").unwrap();
        let patch = ListenerPolicyPatch {
            priority: Some(3),
            ..ListenerPolicyPatch::default()
        };
        let policy = update_policy(&session.handler(), &id, &patch, None).await.unwrap();

        assert_eq!(policy.priority, 3);
        assert_eq!(
            request_log(&server).await,
            vec![
                "GET /load_balancers/lb",
                "PATCH /load_balancers/lb/listeners/lis/policies/pol",
                "GET /load_balancers/lb/listeners/lis/policies/pol",
            ]
        );
    }

    #[tokio::test]
    async fn delete_waits_for_load_balancer_before_deleting() {
        let server = MockServer::start().await;
        mount_active_load_balancer(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/load_balancers/lb/listeners/lis/policies/pol"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb/listeners/lis/policies/pol"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, "lb/lis/pol").unwrap();
        delete_policy(&session.handler(), &id, None).await.unwrap();

        assert_eq!(
            request_log(&server).await,
            vec![
                "GET /load_balancers/lb",
                "DELETE /load_balancers/lb/listeners/lis/policies/pol",
                "GET /load_balancers/lb/listeners/lis/policies/pol",
            ]
        );
    }

    #[tokio::test]
    async fn policies_on_other_listeners_wait_for_the_same_lock() {
        let server = MockServer::start().await;
        let session = session(&server);
        let handler = session.handler();

        // Held as if a policy on listener "lis-a" were being changed.
        let held = handler.locks().lock(&LockKey::load_balancer("lb")).await;
        let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, "lb/lis-b/pol").unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(200),
            delete_policy(&handler, &id, None),
        )
        .await;

        assert!(blocked.is_err());
        assert!(request_log(&server).await.is_empty());
        drop(held);
    }

    #[tokio::test]
    async fn malformed_policy_ids_are_rejected() {
        let server = MockServer::start().await;
        let session = session(&server);
        let handler = session.handler();

        let id = ResourceId::parse(ResourceKind::LoadBalancer, "lb").unwrap();
        assert!(delete_policy(&handler, &id, None).await.is_err());

        let short = ResourceId {
            kind: ResourceKind::LoadBalancerListenerPolicy,
            parts: vec!["lb".to_string()],
        };
        let err = delete_policy(&handler, &short, None).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(request_log(&server).await.is_empty());
    }
}
