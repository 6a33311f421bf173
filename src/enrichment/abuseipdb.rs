//! AbuseIPDB reputation provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::enrichment::{
    check_status, endpoint_url, with_retry, CachedLookup, ProviderError, RetryPolicy, ThreatProvider,
};
use crate::models::{AbuseResult, Provider, NOT_AVAILABLE};

pub const ABUSEIPDB_BASE_URL: &str = "https://api.abuseipdb.com";

/// AbuseIPDB API response
#[derive(Debug, Deserialize)]
struct AbuseIpDbResponse {
    data: AbuseIpDbData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbuseIpDbData {
    #[serde(default)]
    abuse_confidence_score: u8,
    #[serde(default)]
    total_reports: u64,
    #[serde(default)]
    country_code: Option<String>,
}

impl From<AbuseIpDbData> for AbuseResult {
    fn from(data: AbuseIpDbData) -> Self {
        AbuseResult {
            confidence_score: data.abuse_confidence_score.min(100),
            total_reports: data.total_reports,
            country: data.country_code.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            error: None,
        }
    }
}

/// AbuseIPDB provider
pub struct AbuseIpDbProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    cache: CachedLookup,
}

impl AbuseIpDbProvider {
    /// Create a new AbuseIPDB provider
    pub fn new(client: Client, api_key: Option<String>, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            api_key,
            base_url: ABUSEIPDB_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            cache: CachedLookup::new(cache, Provider::AbuseIpDb),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check an IP address against AbuseIPDB, one attempt
    async fn check_ip(&self, ip: &str, api_key: &str) -> Result<AbuseResult, ProviderError> {
        let provider = Provider::AbuseIpDb;
        tracing::info!(provider = %provider, ip = %ip, "Fetching AbuseIPDB data");

        let url = endpoint_url(provider, &self.base_url, &["api", "v2", "check"])?;
        let response = self
            .client
            .get(url)
            .header("Key", api_key)
            .header("Accept", "application/json")
            .query(&[("ipAddress", ip), ("maxAgeInDays", "90")])
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        let body: AbuseIpDbResponse = check_status(provider, response)?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(provider, e))?;

        Ok(body.data.into())
    }
}

#[async_trait]
impl ThreatProvider for AbuseIpDbProvider {
    type Output = AbuseResult;

    fn provider(&self) -> Provider {
        Provider::AbuseIpDb
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, ip: &str) -> Result<AbuseResult, ProviderError> {
        if let Some(cached) = self.cache.get(ip) {
            return Ok(cached);
        }

        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingCredential)?;

        let result = with_retry(self.retry, self.provider(), ProviderError::is_retryable, || {
            self.check_ip(ip, api_key)
        })
        .await?;

        tracing::info!(
            provider = %self.provider(),
            ip = %ip,
            confidence_score = result.confidence_score,
            total_reports = result.total_reports,
            "AbuseIPDB data fetched"
        );
        self.cache.put(ip, result.clone());
        Ok(result)
    }
}
