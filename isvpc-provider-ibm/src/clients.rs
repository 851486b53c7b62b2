//! Generation-specific resource clients
//!
//! `VpcClient` talks to the current VPC API, `ClassicVpcClient` to VPC on
//! classic infrastructure. They share the REST plumbing and differ in which
//! kinds they accept.

use std::sync::Arc;

use isvpc_core::{
    BoxFuture, Error, Generation, Operation, ResourceClient, ResourceId, ResourceKind, Result,
    Snapshot,
};
use log::{debug, info};
use reqwest::Method;
use serde_json::Value;

use crate::auth::Authenticator;
use crate::config::ProviderConfig;
use crate::resources::route;
use crate::transport::RestTransport;

// =============================================================================
// Shared REST operations
// =============================================================================

async fn get_resource(transport: &RestTransport, id: &ResourceId) -> Result<Option<Snapshot>> {
    let path = route(id.kind).item_path(id);
    match transport
        .send(Method::GET, &path, None, Operation::Read, &id.to_string())
        .await
    {
        Ok(body) => Ok(Some(Snapshot::from_json(body))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetch every page of a collection, following `next.href`
async fn list_resources(
    transport: &RestTransport,
    kind: ResourceKind,
    parents: &[String],
) -> Result<Vec<Snapshot>> {
    let config = route(kind);
    let path = config.list_path(parents)?;
    let label = if parents.is_empty() {
        kind.to_string()
    } else {
        format!("{} ({})", kind, parents.join("/"))
    };

    let mut items = Vec::new();
    let mut start: Option<String> = None;
    loop {
        let page = {
            let query: Vec<(&str, &str)> = start.iter().map(|s| ("start", s.as_str())).collect();
            transport
                .send_with_query(Method::GET, &path, &query, None, Operation::Read, &label)
                .await?
        };
        let entries = page
            .get(config.collection_key())
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::decode(format!(
                    "list response for {} has no '{}' array",
                    label,
                    config.collection_key()
                ))
            })?;
        items.extend(entries.iter().cloned().map(Snapshot::from_json));

        match next_start(&page)? {
            Some(next) if start.as_deref() == Some(next.as_str()) => {
                return Err(Error::decode(format!(
                    "list of {} returned the same page token twice",
                    label
                )));
            }
            Some(next) => start = Some(next),
            None => break,
        }
    }

    debug!("Listed {} {}", items.len(), label);
    Ok(items)
}

/// `start` token of the next page, if there is one
fn next_start(page: &Value) -> Result<Option<String>> {
    let Some(href) = page
        .get("next")
        .and_then(|next| next.get("href"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let url = reqwest::Url::parse(href)
        .map_err(|e| Error::decode(format!("Invalid next page link {}: {}", href, e)))?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == "start")
        .map(|(_, value)| value.into_owned()))
}

async fn create_resource(
    transport: &RestTransport,
    kind: ResourceKind,
    parents: &[String],
    body: serde_json::Value,
) -> Result<Snapshot> {
    let config = route(kind);
    let path = config.create_path(parents)?;
    let label = if parents.is_empty() {
        kind.to_string()
    } else {
        format!("{} ({})", kind, parents.join("/"))
    };

    let response = transport
        .send(config.create_method(), &path, Some(&body), Operation::Create, &label)
        .await?;
    let snapshot = Snapshot::from_json(response);
    info!("Created {} {}", kind, snapshot.identifier);
    Ok(snapshot)
}

async fn update_resource(
    transport: &RestTransport,
    id: &ResourceId,
    patch: serde_json::Value,
) -> Result<Snapshot> {
    let path = route(id.kind).item_path(id);
    let response = transport
        .send(Method::PATCH, &path, Some(&patch), Operation::Update, &id.to_string())
        .await?;
    Ok(Snapshot::from_json(response))
}

async fn delete_resource(transport: &RestTransport, id: &ResourceId) -> Result<()> {
    let path = route(id.kind).item_path(id);
    transport
        .send(Method::DELETE, &path, None, Operation::Delete, &id.to_string())
        .await?;
    Ok(())
}

fn transport_for(
    http: reqwest::Client,
    config: &ProviderConfig,
    generation: Generation,
    auth: Arc<Authenticator>,
) -> RestTransport {
    RestTransport::new(http, config.base_url(), config.api_version.clone(), generation, auth)
}

// =============================================================================
// Generation 2
// =============================================================================

/// Client for the current VPC API
pub struct VpcClient {
    transport: RestTransport,
}

impl VpcClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig, auth: Arc<Authenticator>) -> Self {
        Self {
            transport: transport_for(http, config, Generation::Gen2, auth),
        }
    }
}

impl ResourceClient for VpcClient {
    fn generation(&self) -> Generation {
        Generation::Gen2
    }

    fn supports(&self, _kind: ResourceKind) -> bool {
        true
    }

    fn get(&self, id: &ResourceId) -> BoxFuture<'_, Result<Option<Snapshot>>> {
        let id = id.clone();
        Box::pin(async move { get_resource(&self.transport, &id).await })
    }

    fn list(&self, kind: ResourceKind, parents: &[String]) -> BoxFuture<'_, Result<Vec<Snapshot>>> {
        let parents = parents.to_vec();
        Box::pin(async move { list_resources(&self.transport, kind, &parents).await })
    }

    fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
    ) -> BoxFuture<'_, Result<Snapshot>> {
        let parents = parents.to_vec();
        Box::pin(async move { create_resource(&self.transport, kind, &parents, body).await })
    }

    fn update(&self, id: &ResourceId, patch: serde_json::Value) -> BoxFuture<'_, Result<Snapshot>> {
        let id = id.clone();
        Box::pin(async move { update_resource(&self.transport, &id, patch).await })
    }

    fn delete(&self, id: &ResourceId) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        Box::pin(async move { delete_resource(&self.transport, &id).await })
    }
}

// =============================================================================
// Generation 1 (classic)
// =============================================================================

/// Client for VPC on classic infrastructure
pub struct ClassicVpcClient {
    transport: RestTransport,
}

impl ClassicVpcClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig, auth: Arc<Authenticator>) -> Self {
        Self {
            transport: transport_for(http, config, Generation::Classic, auth),
        }
    }

    fn check(&self, kind: ResourceKind) -> Result<()> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "{} is not supported on classic infrastructure",
                kind
            )))
        }
    }
}

impl ResourceClient for ClassicVpcClient {
    fn generation(&self) -> Generation {
        Generation::Classic
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        route(kind).classic
    }

    fn get(&self, id: &ResourceId) -> BoxFuture<'_, Result<Option<Snapshot>>> {
        let id = id.clone();
        Box::pin(async move {
            self.check(id.kind)?;
            get_resource(&self.transport, &id).await
        })
    }

    fn list(&self, kind: ResourceKind, parents: &[String]) -> BoxFuture<'_, Result<Vec<Snapshot>>> {
        let parents = parents.to_vec();
        Box::pin(async move {
            self.check(kind)?;
            list_resources(&self.transport, kind, &parents).await
        })
    }

    fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
    ) -> BoxFuture<'_, Result<Snapshot>> {
        let parents = parents.to_vec();
        Box::pin(async move {
            self.check(kind)?;
            create_resource(&self.transport, kind, &parents, body).await
        })
    }

    fn update(&self, id: &ResourceId, patch: serde_json::Value) -> BoxFuture<'_, Result<Snapshot>> {
        let id = id.clone();
        Box::pin(async move {
            self.check(id.kind)?;
            update_resource(&self.transport, &id, patch).await
        })
    }

    fn delete(&self, id: &ResourceId) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        Box::pin(async move {
            self.check(id.kind)?;
            delete_resource(&self.transport, &id).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            iam_token: Some("tok".to_string()),
            endpoint: Some(server.uri()),
            ..ProviderConfig::default()
        }
    }

    fn auth() -> Arc<Authenticator> {
        Arc::new(Authenticator::static_token("tok"))
    }

    #[tokio::test]
    async fn get_returns_none_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errors": [{"code": "not_found", "message": "VPC not found"}]
            })))
            .mount(&server)
            .await;

        let client = VpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let id = ResourceId::parse(ResourceKind::Vpc, "gone").unwrap();
        assert!(client.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_posts_to_nested_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load_balancers/lb/listeners/lis/policies"))
            .and(query_param("generation", "2"))
            .and(body_json(json!({"action": "reject", "priority": 2})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pol",
                "provisioning_status": "create_pending"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let snapshot = client
            .create(
                ResourceKind::LoadBalancerListenerPolicy,
                &["lb".to_string(), "lis".to_string()],
                json!({"action": "reject", "priority": 2}),
            )
            .await
            .unwrap();
        assert_eq!(snapshot.identifier, "pol");
    }

    #[tokio::test]
    async fn list_follows_next_page_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb/listeners"))
            .and(query_param_is_missing("start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "listeners": [{"id": "lis-1", "name": "http"}],
                "next": {"href": format!("{}/load_balancers/lb/listeners?limit=1&start=page-2", server.uri())}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/load_balancers/lb/listeners"))
            .and(query_param("start", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "listeners": [{"id": "lis-2", "name": "https"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let items = client
            .list(ResourceKind::LoadBalancerListener, &["lb".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["lis-1", "lis-2"]);
    }

    #[tokio::test]
    async fn list_stops_when_page_token_repeats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vpcs": [],
                "next": {"href": format!("{}/vpcs?start=same", server.uri())}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = VpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let err = client.list(ResourceKind::Vpc, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn next_start_reads_the_token() {
        let page = json!({"next": {"href": "https://us-south.iaas.cloud.ibm.com/v1/vpcs?limit=50&start=r006-abc"}});
        assert_eq!(next_start(&page).unwrap().as_deref(), Some("r006-abc"));
        assert_eq!(next_start(&json!({"vpcs": []})).unwrap(), None);
    }

    #[tokio::test]
    async fn delete_404_is_not_found_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/floating_ips/fip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = VpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let id = ResourceId::parse(ResourceKind::FloatingIp, "fip").unwrap();
        assert!(client.delete(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn classic_client_uses_generation_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subnets/sub"))
            .and(query_param("generation", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub",
                "status": "available"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClassicVpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let id = ResourceId::parse(ResourceKind::Subnet, "sub").unwrap();
        let snapshot = client.get(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.field("status"), Some("available"));
    }

    #[tokio::test]
    async fn classic_client_rejects_gen2_kinds_without_calling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ClassicVpcClient::new(reqwest::Client::new(), &config(&server), auth());
        let id = ResourceId::parse(ResourceKind::DedicatedHost, "dh").unwrap();
        let err = client.get(&id).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!client.supports(ResourceKind::Instance));
        assert!(client.supports(ResourceKind::LoadBalancer));
    }
}
