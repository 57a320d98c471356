//! Breach lookup client.
//!
//! Adapter over the external breach-lookup service: a GET with an API-key
//! header and the email as a query parameter, answering
//! `{"found": <count>, "sources": [...]}`. The client applies a bounded
//! timeout and does no retries of its own — retry policy belongs to the
//! orchestrator.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::LookupConfig;
use crate::fulfillment::FulfillmentError;

/// Breach information for a single identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BreachReport {
    /// Number of breaches the identity appears in.
    #[serde(rename = "found", default)]
    pub match_count: u32,
    /// Per-breach details, in the order the service reports them.
    #[serde(default)]
    pub sources: Vec<BreachSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BreachSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Which data fields were exposed (passwords, phone numbers, ...).
    #[serde(default, rename = "fields")]
    pub exposed_fields: Vec<String>,
}

/// Seam for the breach-lookup collaborator, mockable in tests.
#[async_trait]
pub trait BreachLookup: Send + Sync {
    async fn fetch(&self, email: &str) -> Result<BreachReport, FulfillmentError>;
}

/// HTTP client for the real lookup service.
pub struct LeakLookupClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LeakLookupClient {
    pub fn new(config: &LookupConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl BreachLookup for LeakLookupClient {
    async fn fetch(&self, email: &str) -> Result<BreachReport, FulfillmentError> {
        let response = self
            .client
            .get(&self.base_url)
            .header("X-API-Key", &self.api_key)
            .query(&[("check", email)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FulfillmentError::UpstreamTimeout
                } else {
                    FulfillmentError::UpstreamUnavailable {
                        status: None,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FulfillmentError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                detail: format!("lookup service returned status {status}"),
            });
        }

        // The client-level timeout also covers the body read, so an expiry
        // here is still transient, not a malformed response.
        response.json::<BreachReport>().await.map_err(|e| {
            if e.is_timeout() {
                FulfillmentError::UpstreamTimeout
            } else {
                FulfillmentError::UpstreamMalformedResponse(e.to_string())
            }
        })
    }
}
