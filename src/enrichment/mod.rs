//! Threat intelligence providers for IP addresses

pub mod abuseipdb;
pub mod feodo;
pub mod ipinfo;
pub mod retry;
pub mod virustotal;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::cache::{cache_key, ResponseCache};
use crate::models::{Provider, ProviderResult};

pub use retry::{with_retry, RetryPolicy};

/// Errors surfaced by a provider lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Missing API key")]
    MissingCredential,

    #[error("{} rate limit exceeded", .provider.display_name())]
    RateLimited { provider: Provider },

    #[error("Invalid {} API key", .provider.display_name())]
    Unauthorized { provider: Provider },

    #[error("{} request failed: {message}", .provider.display_name())]
    Transport { provider: Provider, message: String },

    #[error("{} API error: HTTP {status}", .provider.display_name())]
    UpstreamStatus { provider: Provider, status: u16 },

    #[error("Failed to parse {} response: {message}", .provider.display_name())]
    MalformedResponse { provider: Provider, message: String },

    #[error("Invalid {} endpoint: {message}", .provider.display_name())]
    InvalidEndpoint { provider: Provider, message: String },
}

impl ProviderError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn transport(provider: Provider, err: reqwest::Error) -> Self {
        ProviderError::Transport {
            provider,
            message: err.to_string(),
        }
    }

    pub fn malformed(provider: Provider, message: impl ToString) -> Self {
        ProviderError::MalformedResponse {
            provider,
            message: message.to_string(),
        }
    }
}

/// Trait for IP threat intelligence providers
#[async_trait]
pub trait ThreatProvider: Send + Sync {
    /// Normalized result produced by this provider
    type Output: Send;

    fn provider(&self) -> Provider;

    /// Check if the API key is configured (for providers that require it)
    fn is_configured(&self) -> bool {
        true
    }

    /// Look up an address, serving from cache when possible
    async fn fetch(&self, ip: &str) -> Result<Self::Output, ProviderError>;
}

/// Map a response status onto the provider error taxonomy.
///
/// 429 and 401 are classified before anything else so the retry wrapper
/// never sees them as retryable.
pub(crate) fn check_status(provider: Provider, response: Response) -> Result<Response, ProviderError> {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::error!(provider = %provider, "Rate limit exceeded");
            Err(ProviderError::RateLimited { provider })
        }
        StatusCode::UNAUTHORIZED => {
            tracing::error!(provider = %provider, "Invalid API key");
            Err(ProviderError::Unauthorized { provider })
        }
        status if !status.is_success() => Err(ProviderError::UpstreamStatus {
            provider,
            status: status.as_u16(),
        }),
        _ => Ok(response),
    }
}

/// Read-through helper shared by the providers
pub(crate) struct CachedLookup {
    cache: Arc<ResponseCache>,
    provider: Provider,
}

impl CachedLookup {
    pub(crate) fn new(cache: Arc<ResponseCache>, provider: Provider) -> Self {
        Self { cache, provider }
    }

    pub(crate) fn get<T>(&self, ip: &str) -> Option<T>
    where
        T: TryFrom<ProviderResult>,
    {
        let hit = self
            .cache
            .get(&cache_key(self.provider, ip))
            .and_then(|entry| T::try_from(entry).ok())?;

        tracing::info!(provider = %self.provider, ip = %ip, "Returning cached result");
        metrics::counter!("cache_hits_total", "provider" => self.provider.as_str()).increment(1);
        Some(hit)
    }

    pub(crate) fn put<T>(&self, ip: &str, value: T)
    where
        T: Into<ProviderResult>,
    {
        self.cache.insert(cache_key(self.provider, ip), value.into());
    }
}

/// Append path segments to a configured base URL.
///
/// Each segment is percent-encoded, so a caller-supplied value can never
/// add path components, a query or a fragment to the request.
pub(crate) fn endpoint_url(
    provider: Provider,
    base: &str,
    segments: &[&str],
) -> Result<Url, ProviderError> {
    let invalid = |message: String| ProviderError::InvalidEndpoint { provider, message };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(ProviderError::MissingCredential.to_string(), "Missing API key");
        assert_eq!(
            ProviderError::RateLimited { provider: Provider::AbuseIpDb }.to_string(),
            "AbuseIPDB rate limit exceeded"
        );
        assert_eq!(
            ProviderError::Unauthorized { provider: Provider::VirusTotal }.to_string(),
            "Invalid VirusTotal API key"
        );
        assert_eq!(
            ProviderError::UpstreamStatus { provider: Provider::IpInfo, status: 503 }.to_string(),
            "IPInfo API error: HTTP 503"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let provider = Provider::AbuseIpDb;
        assert!(ProviderError::Transport { provider, message: "reset".into() }.is_retryable());
        assert!(ProviderError::UpstreamStatus { provider, status: 502 }.is_retryable());
        assert!(!ProviderError::UpstreamStatus { provider, status: 404 }.is_retryable());
        assert!(!ProviderError::RateLimited { provider }.is_retryable());
        assert!(!ProviderError::Unauthorized { provider }.is_retryable());
        assert!(!ProviderError::malformed(provider, "bad json").is_retryable());
        assert!(!ProviderError::MissingCredential.is_retryable());
    }

    #[test]
    fn test_endpoint_url() {
        let provider = Provider::IpInfo;
        assert_eq!(
            endpoint_url(provider, "https://ipinfo.io/", &["8.8.8.8", "json"]).unwrap().as_str(),
            "https://ipinfo.io/8.8.8.8/json"
        );
        assert_eq!(
            endpoint_url(provider, "http://127.0.0.1:9", &["api", "v2", "check"]).unwrap().as_str(),
            "http://127.0.0.1:9/api/v2/check"
        );
        assert_eq!(
            endpoint_url(provider, "https://mirror.local/ipinfo/", &["1.1.1.1", "json"])
                .unwrap()
                .as_str(),
            "https://mirror.local/ipinfo/1.1.1.1/json"
        );
    }

    #[test]
    fn test_endpoint_url_encodes_segments() {
        let url = endpoint_url(Provider::VirusTotal, "https://vt.local", &["ip", "8.8.8.8?x=1#f"]).unwrap();
        assert_eq!(url.path(), "/ip/8.8.8.8%3Fx=1%23f");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = endpoint_url(Provider::IpInfo, "https://ipinfo.io", &["../a/b", "json"]).unwrap();
        assert_eq!(url.path_segments().unwrap().count(), 2);
        assert_eq!(url.path(), "/..%2Fa%2Fb/json");
    }

    #[test]
    fn test_endpoint_url_rejects_bad_base() {
        let err = endpoint_url(Provider::AbuseIpDb, "not a url", &["api"]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidEndpoint { .. }));
        assert!(!err.is_retryable());
        assert!(matches!(
            endpoint_url(Provider::AbuseIpDb, "mailto:soc@example.com", &["api"]),
            Err(ProviderError::InvalidEndpoint { .. })
        ));
    }
}
