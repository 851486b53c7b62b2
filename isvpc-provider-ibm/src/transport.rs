//! HTTP transport for the VPC REST API
//!
//! Adds the `version` and `generation` query parameters and the bearer token to
//! every call, and turns IBM error payloads into `isvpc_core::Error`.

use std::sync::Arc;

use isvpc_core::{Error, Generation, Operation, Result};
use log::debug;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::auth::Authenticator;

/// Error document returned by the VPC API
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    code: String,
    message: String,
}

pub struct RestTransport {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    generation: Generation,
    auth: Arc<Authenticator>,
}

impl RestTransport {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        generation: Generation,
        auth: Arc<Authenticator>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_version: api_version.into(),
            generation,
            auth,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Issue one call and return the decoded response body
    ///
    /// An empty body decodes as `Value::Null`. A 404 (or an error whose code is
    /// `not_found`) becomes `Error::NotFound`.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        operation: Operation,
        resource: &str,
    ) -> Result<serde_json::Value> {
        self.send_with_query(method, path, &[], body, operation, resource)
            .await
    }

    /// `send` with extra query parameters (e.g. `start` for the next page)
    pub async fn send_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        operation: Operation,
        resource: &str,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.auth.token().await?;
        let generation = self.generation.number().to_string();
        debug!("{} {} (generation {})", method, url, self.generation.number());

        let mut request = self
            .http
            .request(method.clone(), &url)
            .query(&[
                ("version", self.api_version.as_str()),
                ("generation", generation.as_str()),
            ])
            .query(query)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            let content_type = if method == Method::PATCH {
                "application/merge-patch+json"
            } else {
                "application/json"
            };
            let bytes = serde_json::to_vec(body)
                .map_err(|e| Error::decode(format!("Failed to encode request: {}", e)))?;
            request = request
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(format!("{} {} failed: {}", method, url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response: {}", e)))?;
        debug!("{} {} -> {}", method, url, status);

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| Error::decode(format!("Invalid JSON from {}: {}", url, e)));
        }

        Err(remote_error(status, &text, operation, resource))
    }
}

fn remote_error(status: StatusCode, text: &str, operation: Operation, resource: &str) -> Error {
    let parsed: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let first = parsed.errors.first();
    let code = first.map(|e| e.code.clone());

    if status == StatusCode::NOT_FOUND || code.as_deref() == Some("not_found") {
        return Error::NotFound {
            resource: resource.to_string(),
        };
    }

    let message = first.map(|e| e.message.clone()).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    });
    let body = match &parsed.trace {
        Some(trace) => format!("{} (trace {})", text, trace),
        None => text.to_string(),
    };

    Error::Remote {
        operation,
        resource: resource.to_string(),
        status: Some(status.as_u16()),
        code,
        message,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer, generation: Generation) -> RestTransport {
        RestTransport::new(
            reqwest::Client::new(),
            server.uri(),
            "2024-04-30",
            generation,
            Arc::new(Authenticator::static_token("tok")),
        )
    }

    #[tokio::test]
    async fn sends_version_generation_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs/r006-1"))
            .and(query_param("version", "2024-04-30"))
            .and(query_param("generation", "1"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r006-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = transport(&server, Generation::Classic)
            .send(Method::GET, "/vpcs/r006-1", None, Operation::Read, "vpc (r006-1)")
            .await
            .unwrap();
        assert_eq!(body["id"], "r006-1");
    }

    #[tokio::test]
    async fn patch_uses_merge_patch_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/vpcs/r006-1"))
            .and(header("content-type", "application/merge-patch+json"))
            .and(body_json(json!({"name": "renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r006-1", "name": "renamed"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = transport(&server, Generation::Gen2)
            .send(
                Method::PATCH,
                "/vpcs/r006-1",
                Some(&json!({"name": "renamed"})),
                Operation::Update,
                "vpc (r006-1)",
            )
            .await
            .unwrap();
        assert_eq!(body["name"], "renamed");
    }

    #[tokio::test]
    async fn empty_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/vpcs/r006-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let body = transport(&server, Generation::Gen2)
            .send(Method::DELETE, "/vpcs/r006-1", None, Operation::Delete, "vpc (r006-1)")
            .await
            .unwrap();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn not_found_code_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subnets/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errors": [{"code": "not_found", "message": "Subnet not found"}],
                "trace": "abc"
            })))
            .mount(&server)
            .await;

        let err = transport(&server, Generation::Gen2)
            .send(Method::GET, "/subnets/gone", None, Operation::Read, "subnet (gone)")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn error_payload_becomes_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vpcs"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "errors": [{"code": "vpc_conflict", "message": "The VPC name is in use"}],
                "trace": "t-1"
            })))
            .mount(&server)
            .await;

        let err = transport(&server, Generation::Gen2)
            .send(Method::POST, "/vpcs", Some(&json!({"name": "a"})), Operation::Create, "vpc")
            .await
            .unwrap_err();

        match &err {
            Error::Remote {
                status, code, message, ..
            } => {
                assert_eq!(*status, Some(409));
                assert_eq!(code.as_deref(), Some("vpc_conflict"));
                assert_eq!(message, "The VPC name is in use");
            }
            other => panic!("Expected Remote error, got {:?}", other),
        }
        assert!(err.to_string().starts_with("Error creating vpc: The VPC name is in use"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs/x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = transport(&server, Generation::Gen2)
            .send(Method::GET, "/vpcs/x", None, Operation::Read, "vpc (x)")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn extra_query_parameters_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs"))
            .and(query_param("start", "abc"))
            .and(query_param("generation", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vpcs": []})))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server, Generation::Gen2)
            .send_with_query(Method::GET, "/vpcs", &[("start", "abc")], None, Operation::Read, "vpc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vpcs/x"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = transport(&server, Generation::Gen2)
            .send(Method::GET, "/vpcs/x", None, Operation::Read, "vpc (x)")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("Service Unavailable"));
    }
}
