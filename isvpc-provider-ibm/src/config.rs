//! Provider configuration
//!
//! Loaded from JSON or from the environment variables the IBM Cloud tooling
//! already uses (`IC_API_KEY`, `IC_REGION`, ...).

use std::time::Duration;

use isvpc_core::{Error, Generation, PollSettings, Result};
use serde::Deserialize;

pub const DEFAULT_REGION: &str = "us-south";
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";
pub const DEFAULT_API_VERSION: &str = "2024-04-30";

/// Connection and polling settings for one session
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Pre-issued bearer token; used as-is instead of exchanging `api_key`
    pub iam_token: Option<String>,
    pub region: String,
    /// 1 for classic infrastructure, 2 for the current VPC API
    pub generation: u8,
    /// Overrides the regional VPC endpoint
    pub endpoint: Option<String>,
    pub iam_endpoint: String,
    /// Value of the `version` query parameter
    pub api_version: String,
    pub poll_interval_secs: u64,
    pub min_timeout_secs: u64,
    pub transient_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            iam_token: None,
            region: DEFAULT_REGION.to_string(),
            generation: 2,
            endpoint: None,
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval_secs: 10,
            min_timeout_secs: 10,
            transient_retries: 0,
        }
    }
}

/// First non-empty value among `names`
fn first_of(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl ProviderConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        config.api_key = first_of(&lookup, &["IC_API_KEY", "IBMCLOUD_API_KEY"]);
        config.iam_token = first_of(&lookup, &["IC_IAM_TOKEN", "IBMCLOUD_IAM_TOKEN"]);
        if let Some(region) = first_of(&lookup, &["IC_REGION", "IBMCLOUD_REGION"]) {
            config.region = region;
        }
        if let Some(generation) = first_of(&lookup, &["IC_GENERATION", "IBMCLOUD_GENERATION"]) {
            config.generation = generation.parse::<Generation>()?.number();
        }

        let endpoint_var = match config.generation {
            1 => "IBMCLOUD_IS_API_ENDPOINT",
            _ => "IBMCLOUD_IS_NG_API_ENDPOINT",
        };
        config.endpoint = first_of(&lookup, &[endpoint_var]);
        if let Some(iam) = first_of(&lookup, &["IBMCLOUD_IAM_API_ENDPOINT"]) {
            config.iam_endpoint = iam;
        }

        Ok(config)
    }

    /// Parse a JSON configuration document
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source)
            .map_err(|e| Error::configuration(format!("Invalid provider configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_none() && self.iam_token.is_none() {
            return Err(Error::configuration(
                "Missing credentials: set IC_API_KEY (or IBMCLOUD_API_KEY) or provide an IAM token",
            ));
        }
        Generation::from_number(self.generation)?;
        if self.region.trim().is_empty() {
            return Err(Error::configuration("Region must not be empty"));
        }
        if self.poll_interval_secs == 0 && self.min_timeout_secs == 0 {
            return Err(Error::configuration("Poll interval must be greater than zero"));
        }
        Ok(())
    }

    pub fn generation(&self) -> Result<Generation> {
        Generation::from_number(self.generation)
    }

    /// Base URL of the VPC API, without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.iaas.cloud.ibm.com/v1", self.region),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            min_timeout: Duration::from_secs(self.min_timeout_secs),
            transient_retries: self.transient_retries,
        }
    }
}
