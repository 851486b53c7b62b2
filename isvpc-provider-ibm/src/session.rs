//! Session - Runtime context shared by every operation
//!
//! A session picks the client for the configured generation once, and owns the
//! lock registry that handlers created from it share.

use std::sync::Arc;

use isvpc_core::{
    Error, Generation, LifecycleHandler, LockRegistry, Operation, ResourceClient, Result,
};
use log::info;
use reqwest::Method;

use crate::auth::Authenticator;
use crate::clients::{ClassicVpcClient, VpcClient};
use crate::config::ProviderConfig;
use crate::models::BareMetalServerProfile;
use crate::transport::RestTransport;

pub struct Session {
    config: ProviderConfig,
    http: reqwest::Client,
    auth: Arc<Authenticator>,
    client: Arc<dyn ResourceClient>,
    locks: Arc<LockRegistry>,
}

impl Session {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let generation = config.generation()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("isvpc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {}", e)))?;

        let auth = Arc::new(match (&config.iam_token, &config.api_key) {
            (Some(token), _) => Authenticator::static_token(token.clone()),
            (None, Some(key)) => Authenticator::api_key(http.clone(), &config.iam_endpoint, key.clone()),
            (None, None) => return Err(Error::configuration("Missing credentials")),
        });

        let client: Arc<dyn ResourceClient> = match generation {
            Generation::Gen2 => Arc::new(VpcClient::new(http.clone(), &config, auth.clone())),
            Generation::Classic => {
                Arc::new(ClassicVpcClient::new(http.clone(), &config, auth.clone()))
            }
        };
        info!(
            "Using {} VPC API at {} (region {})",
            generation,
            config.base_url(),
            config.region
        );

        Ok(Self {
            config,
            http,
            auth,
            client,
            locks: Arc::new(LockRegistry::new()),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn generation(&self) -> Generation {
        self.client.generation()
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// Handler sharing this session's client and locks
    pub fn handler(&self) -> LifecycleHandler {
        LifecycleHandler::new(self.client.clone(), self.locks.clone())
            .with_settings(self.config.poll_settings())
    }

    /// Look up a bare metal server profile by name
    pub async fn bare_metal_server_profile(&self, name: &str) -> Result<BareMetalServerProfile> {
        if self.generation() == Generation::Classic {
            return Err(Error::configuration(
                "bare metal server profiles are not available on classic infrastructure",
            ));
        }

        let transport = RestTransport::new(
            self.http.clone(),
            self.config.base_url(),
            self.config.api_version.clone(),
            self.generation(),
            self.auth.clone(),
        );
        let label = format!("bare_metal_server_profile ({})", name);
        let body = transport
            .send(
                Method::GET,
                &format!("/bare_metal_server/profiles/{}", urlencoding::encode(name)),
                None,
                Operation::Read,
                &label,
            )
            .await?;
        serde_json::from_value(body)
            .map_err(|e| Error::decode(format!("Failed to decode {}: {}", label, e)))
    }
}
