//! Aggregation of all providers into a single scored report

pub mod scoring;

use reqwest::Client;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::enrichment::abuseipdb::{AbuseIpDbProvider, ABUSEIPDB_BASE_URL};
use crate::enrichment::feodo::{FeodoTrackerProvider, FEODO_BLOCKLIST_URL};
use crate::enrichment::ipinfo::{IpInfoProvider, IPINFO_BASE_URL};
use crate::enrichment::virustotal::{VirusTotalProvider, VT_BASE_URL};
use crate::enrichment::{ProviderError, RetryPolicy, ThreatProvider};
use crate::models::ip_utils::{is_ip, normalize_ip};
use crate::models::{ApiStatus, Provider, ThreatReport};

pub use scoring::ScoringPolicy;

/// Upstream locations, overridable for mirrors and tests
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub abuseipdb: String,
    pub virustotal: String,
    pub ipinfo: String,
    pub feodo_blocklist: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            abuseipdb: ABUSEIPDB_BASE_URL.to_string(),
            virustotal: VT_BASE_URL.to_string(),
            ipinfo: IPINFO_BASE_URL.to_string(),
            feodo_blocklist: FEODO_BLOCKLIST_URL.to_string(),
        }
    }
}

/// Everything needed to build the providers
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    pub abuseipdb_api_key: Option<String>,
    pub virustotal_api_key: Option<String>,
    pub ipinfo_api_key: Option<String>,
    pub endpoints: ProviderEndpoints,
    pub retry: RetryPolicy,
    pub scoring: ScoringPolicy,
}

/// Runs the four providers for one address and folds their results
pub struct ThreatAggregator {
    abuseipdb: AbuseIpDbProvider,
    virustotal: VirusTotalProvider,
    feodo: FeodoTrackerProvider,
    ipinfo: IpInfoProvider,
    scoring: ScoringPolicy,
}

impl ThreatAggregator {
    pub fn new(client: Client, cache: Arc<ResponseCache>, config: AggregatorConfig) -> Self {
        let AggregatorConfig {
            abuseipdb_api_key,
            virustotal_api_key,
            ipinfo_api_key,
            endpoints,
            retry,
            scoring,
        } = config;

        Self {
            abuseipdb: AbuseIpDbProvider::new(client.clone(), abuseipdb_api_key, cache.clone())
                .with_base_url(endpoints.abuseipdb)
                .with_retry_policy(retry),
            virustotal: VirusTotalProvider::new(client.clone(), virustotal_api_key, cache.clone())
                .with_base_url(endpoints.virustotal)
                .with_retry_policy(retry),
            feodo: FeodoTrackerProvider::new(client.clone(), cache.clone())
                .with_blocklist_url(endpoints.feodo_blocklist),
            ipinfo: IpInfoProvider::new(client, ipinfo_api_key, cache)
                .with_base_url(endpoints.ipinfo)
                .with_retry_policy(retry),
            scoring,
        }
    }

    /// Providers that will be queried (the rest report "Missing API key")
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| match provider {
                Provider::AbuseIpDb => self.abuseipdb.is_configured(),
                Provider::VirusTotal => self.virustotal.is_configured(),
                Provider::FeodoTracker => self.feodo.is_configured(),
                Provider::IpInfo => self.ipinfo.is_configured(),
            })
            .collect()
    }

    /// Query every provider for `ip` and build the report.
    ///
    /// Provider failures never escape: they are recorded in the provider's
    /// `error` field and `api_status`, and the section keeps its default shape.
    pub async fn aggregate(&self, ip: &str) -> ThreatReport {
        let ip = normalize_ip(ip);
        tracing::info!(ip = %ip, "Processing threat request");
        if !is_ip(&ip) {
            tracing::warn!(ip = %ip, "Not an IPv4/IPv6 address, querying providers as-is");
        }

        let (abuse, vt, feodo, ipinfo) = futures::join!(
            query(&self.abuseipdb, &ip),
            query(&self.virustotal, &ip),
            query(&self.feodo, &ip),
            query(&self.ipinfo, &ip),
        );

        let mut report = ThreatReport::new(ip.as_str());
        let mut contributions = Vec::with_capacity(3);

        match abuse {
            Ok(result) => {
                contributions.push(self.scoring.abuseipdb(&result));
                report.abuseipdb = result;
                record_success(&mut report, Provider::AbuseIpDb);
            }
            Err(e) => record_failure(&mut report, Provider::AbuseIpDb, &ip, e),
        }

        match vt {
            Ok(result) => {
                contributions.push(self.scoring.virustotal(&result));
                report.virustotal = result;
                record_success(&mut report, Provider::VirusTotal);
            }
            Err(e) => record_failure(&mut report, Provider::VirusTotal, &ip, e),
        }

        match feodo {
            // Download failures come back inside the result
            Ok(result) if result.error.is_some() => {
                report.feodo_tracker = result;
                report.api_status.insert(Provider::FeodoTracker, ApiStatus::Failed);
                count_request(Provider::FeodoTracker, ApiStatus::Failed);
            }
            Ok(result) => {
                contributions.push(self.scoring.feodo(&result));
                report.feodo_tracker = result;
                record_success(&mut report, Provider::FeodoTracker);
            }
            Err(e) => record_failure(&mut report, Provider::FeodoTracker, &ip, e),
        }

        // Geolocation only, no score contribution
        match ipinfo {
            Ok(result) => {
                report.ipinfo = result;
                record_success(&mut report, Provider::IpInfo);
            }
            Err(e) => record_failure(&mut report, Provider::IpInfo, &ip, e),
        }

        report.threat_score = self.scoring.compose(&contributions);
        metrics::histogram!("threat_score").record(report.threat_score);
        tracing::info!(ip = %ip, threat_score = report.threat_score, "Threat score computed");

        report
    }
}

async fn query<P: ThreatProvider>(provider: &P, ip: &str) -> Result<P::Output, ProviderError> {
    if !provider.is_configured() {
        tracing::warn!(provider = %provider.provider(), ip = %ip, "Missing API key");
        return Err(ProviderError::MissingCredential);
    }
    provider.fetch(ip).await
}

fn count_request(provider: Provider, status: ApiStatus) {
    let status = match status {
        ApiStatus::Success => "success",
        ApiStatus::Failed => "failed",
    };
    metrics::counter!("provider_requests_total", "provider" => provider.as_str(), "status" => status)
        .increment(1);
}

fn record_success(report: &mut ThreatReport, provider: Provider) {
    report.mark_success(provider);
    count_request(provider, ApiStatus::Success);
}

fn record_failure(report: &mut ThreatReport, provider: Provider, ip: &str, err: ProviderError) {
    if err != ProviderError::MissingCredential {
        tracing::error!(provider = %provider, ip = %ip, error = %err, "Provider lookup failed");
    }
    report.mark_failed(provider, err.to_string());
    count_request(provider, ApiStatus::Failed);
}
