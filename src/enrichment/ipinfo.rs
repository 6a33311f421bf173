//! IPInfo geolocation provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::enrichment::{
    check_status, endpoint_url, with_retry, CachedLookup, ProviderError, RetryPolicy, ThreatProvider,
};
use crate::models::{IpInfoResult, Provider, NOT_AVAILABLE};

pub const IPINFO_BASE_URL: &str = "https://ipinfo.io";

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Split a `"lat,lon"` pair; an empty or missing component reads as 0
pub fn parse_loc(loc: &str) -> Result<(f64, f64), std::num::ParseFloatError> {
    let mut parts = loc.split(',');
    let mut component = || -> Result<f64, std::num::ParseFloatError> {
        match parts.next().map(str::trim) {
            Some(value) if !value.is_empty() => value.parse(),
            _ => Ok(0.0),
        }
    };

    let latitude = component()?;
    let longitude = component()?;
    Ok((latitude, longitude))
}

impl TryFrom<IpInfoResponse> for IpInfoResult {
    type Error = ProviderError;

    fn try_from(data: IpInfoResponse) -> Result<Self, Self::Error> {
        let (latitude, longitude) = parse_loc(data.loc.as_deref().unwrap_or("0,0"))
            .map_err(|e| ProviderError::malformed(Provider::IpInfo, format!("invalid loc: {}", e)))?;

        Ok(IpInfoResult {
            latitude,
            longitude,
            city: data.city.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            country: data.country.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            error: None,
        })
    }
}

/// IPInfo provider
pub struct IpInfoProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    cache: CachedLookup,
}

impl IpInfoProvider {
    pub fn new(client: Client, api_key: Option<String>, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            api_key,
            base_url: IPINFO_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            cache: CachedLookup::new(cache, Provider::IpInfo),
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

    async fn lookup(&self, ip: &str, api_key: &str) -> Result<IpInfoResult, ProviderError> {
        let provider = Provider::IpInfo;
        tracing::info!(provider = %provider, ip = %ip, "Fetching IPInfo data");

        let url = endpoint_url(provider, &self.base_url, &[ip, "json"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        let body: IpInfoResponse = check_status(provider, response)?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(provider, e))?;

        body.try_into()
    }
}

#[async_trait]
impl ThreatProvider for IpInfoProvider {
    type Output = IpInfoResult;

    fn provider(&self) -> Provider {
        Provider::IpInfo
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, ip: &str) -> Result<IpInfoResult, ProviderError> {
        if let Some(cached) = self.cache.get(ip) {
            return Ok(cached);
        }

        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingCredential)?;

        let result = with_retry(self.retry, self.provider(), ProviderError::is_retryable, || {
            self.lookup(ip, api_key)
        })
        .await?;

        tracing::info!(provider = %self.provider(), ip = %ip, city = %result.city, "IPInfo data fetched");
        self.cache.put(ip, result.clone());
        Ok(result)
    }
}
