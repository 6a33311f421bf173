//! VirusTotal reputation provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::enrichment::{
    check_status, endpoint_url, with_retry, CachedLookup, ProviderError, RetryPolicy, ThreatProvider,
};
use crate::models::{Provider, VtResult};

pub const VT_BASE_URL: &str = "https://www.virustotal.com";

/// VirusTotal analysis stats
#[derive(Debug, Default, Deserialize)]
struct VtAnalysisStats {
    #[serde(default)]
    malicious: u32,
}

/// Verdict of a single engine
#[derive(Debug, Deserialize)]
struct VtEngineResult {
    #[serde(default)]
    result: Option<String>,
}

/// VirusTotal attributes
#[derive(Debug, Deserialize)]
struct VtAttributes {
    #[serde(default)]
    last_analysis_stats: Option<VtAnalysisStats>,
    #[serde(default)]
    last_analysis_results: HashMap<String, VtEngineResult>,
    #[serde(default)]
    reputation: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct VtData {
    attributes: VtAttributes,
}

#[derive(Debug, Deserialize)]
struct VtResponse {
    data: VtData,
}

impl From<VtAttributes> for VtResult {
    fn from(attrs: VtAttributes) -> Self {
        // Engines without a verdict are dropped
        let scan_results: BTreeMap<String, String> = attrs
            .last_analysis_results
            .into_iter()
            .filter_map(|(engine, verdict)| match verdict.result {
                Some(result) if !result.is_empty() => Some((engine, result)),
                _ => None,
            })
            .collect();

        VtResult {
            malicious_count: attrs.last_analysis_stats.unwrap_or_default().malicious,
            reputation: attrs.reputation.unwrap_or(0),
            scan_results,
            error: None,
        }
    }
}

/// VirusTotal provider
pub struct VirusTotalProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    cache: CachedLookup,
}

impl VirusTotalProvider {
    /// Create a new VirusTotal provider
    pub fn new(client: Client, api_key: Option<String>, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            api_key,
            base_url: VT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            cache: CachedLookup::new(cache, Provider::VirusTotal),
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

    /// Check an IP address, one attempt
    async fn check_ip(&self, ip: &str, api_key: &str) -> Result<VtResult, ProviderError> {
        let provider = Provider::VirusTotal;
        tracing::info!(provider = %provider, ip = %ip, "Fetching VirusTotal data");

        let url = endpoint_url(provider, &self.base_url, &["api", "v3", "ip_addresses", ip])?;
        let response = self
            .client
            .get(url)
            .header("x-apikey", api_key)
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        let body: VtResponse = check_status(provider, response)?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(provider, e))?;

        Ok(body.data.attributes.into())
    }
}

#[async_trait]
impl ThreatProvider for VirusTotalProvider {
    type Output = VtResult;

    fn provider(&self) -> Provider {
        Provider::VirusTotal
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, ip: &str) -> Result<VtResult, ProviderError> {
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
            malicious_count = result.malicious_count,
            reputation = result.reputation,
            "VirusTotal data fetched"
        );
        self.cache.put(ip, result.clone());
        Ok(result)
    }
}
