//! Core data models for IP threat reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod ip_utils;

/// Placeholder used when a provider does not report a location field
pub const NOT_AVAILABLE: &str = "N/A";

/// External threat intelligence providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[serde(rename = "abuseipdb")]
    AbuseIpDb,
    #[serde(rename = "virustotal")]
    VirusTotal,
    FeodoTracker,
    #[serde(rename = "ipinfo")]
    IpInfo,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::AbuseIpDb,
        Provider::VirusTotal,
        Provider::FeodoTracker,
        Provider::IpInfo,
    ];

    /// Key used in reports, cache keys and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::AbuseIpDb => "abuseipdb",
            Provider::VirusTotal => "virustotal",
            Provider::FeodoTracker => "feodo_tracker",
            Provider::IpInfo => "ipinfo",
        }
    }

    /// Human readable name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::AbuseIpDb => "AbuseIPDB",
            Provider::VirusTotal => "VirusTotal",
            Provider::FeodoTracker => "Feodo Tracker",
            Provider::IpInfo => "IPInfo",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single provider for one request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Failed,
}

/// AbuseIPDB reputation data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbuseResult {
    pub confidence_score: u8,
    pub total_reports: u64,
    pub country: String,
    pub error: Option<String>,
}

impl Default for AbuseResult {
    fn default() -> Self {
        Self {
            confidence_score: 0,
            total_reports: 0,
            country: NOT_AVAILABLE.to_string(),
            error: None,
        }
    }
}

/// VirusTotal analysis data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VtResult {
    pub malicious_count: u32,
    pub reputation: i64,
    /// Engine name -> verdict, only engines that returned a verdict
    pub scan_results: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// Feodo Tracker botnet C2 blocklist match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeodoResult {
    pub is_malicious: bool,
    pub source: String,
    pub confidence_level: u8,
    pub malware_types: Vec<String>,
    pub error: Option<String>,
}

impl Default for FeodoResult {
    fn default() -> Self {
        Self {
            is_malicious: false,
            source: NOT_AVAILABLE.to_string(),
            confidence_level: 0,
            malware_types: vec![],
            error: None,
        }
    }
}

/// IPInfo geolocation data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpInfoResult {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub country: String,
    pub error: Option<String>,
}

impl Default for IpInfoResult {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            city: NOT_AVAILABLE.to_string(),
            country: NOT_AVAILABLE.to_string(),
            error: None,
        }
    }
}

/// Normalized result of any provider, as stored in the response cache
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    Abuse(AbuseResult),
    VirusTotal(VtResult),
    Feodo(FeodoResult),
    IpInfo(IpInfoResult),
}

macro_rules! provider_result_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ProviderResult {
                fn from(result: $ty) -> Self {
                    ProviderResult::$variant(result)
                }
            }

            impl TryFrom<ProviderResult> for $ty {
                type Error = ProviderResult;

                fn try_from(result: ProviderResult) -> Result<Self, Self::Error> {
                    match result {
                        ProviderResult::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

provider_result_conversions! {
    Abuse => AbuseResult,
    VirusTotal => VtResult,
    Feodo => FeodoResult,
    IpInfo => IpInfoResult,
}

/// Aggregated report returned by `GET /threats/ip/{ip}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatReport {
    pub ip: String,
    pub abuseipdb: AbuseResult,
    pub virustotal: VtResult,
    pub feodo_tracker: FeodoResult,
    pub ipinfo: IpInfoResult,
    pub threat_score: f64,
    pub api_status: BTreeMap<Provider, ApiStatus>,
}

impl ThreatReport {
    /// Empty report with every provider section at its default shape
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            abuseipdb: AbuseResult::default(),
            virustotal: VtResult::default(),
            feodo_tracker: FeodoResult::default(),
            ipinfo: IpInfoResult::default(),
            threat_score: 0.0,
            api_status: BTreeMap::new(),
        }
    }

    /// Record a provider failure: the section keeps its default shape
    pub fn mark_failed(&mut self, provider: Provider, message: impl Into<String>) {
        let message = Some(message.into());
        match provider {
            Provider::AbuseIpDb => self.abuseipdb.error = message,
            Provider::VirusTotal => self.virustotal.error = message,
            Provider::FeodoTracker => self.feodo_tracker.error = message,
            Provider::IpInfo => self.ipinfo.error = message,
        }
        self.api_status.insert(provider, ApiStatus::Failed);
    }

    pub fn mark_success(&mut self, provider: Provider) {
        self.api_status.insert(provider, ApiStatus::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_report_shape() {
        let report = ThreatReport::new("8.8.8.8");
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value,
            json!({
                "ip": "8.8.8.8",
                "abuseipdb": {"confidence_score": 0, "total_reports": 0, "country": "N/A", "error": null},
                "virustotal": {"malicious_count": 0, "reputation": 0, "scan_results": {}, "error": null},
                "feodo_tracker": {"is_malicious": false, "source": "N/A", "confidence_level": 0, "malware_types": [], "error": null},
                "ipinfo": {"latitude": 0.0, "longitude": 0.0, "city": "N/A", "country": "N/A", "error": null},
                "threat_score": 0.0,
                "api_status": {}
            })
        );
    }

    #[test]
    fn test_api_status_keys() {
        let mut report = ThreatReport::new("1.2.3.4");
        report.mark_failed(Provider::IpInfo, "Missing API key");
        report.mark_success(Provider::FeodoTracker);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["api_status"]["ipinfo"], "failed");
        assert_eq!(value["api_status"]["feodo_tracker"], "success");
        assert_eq!(value["ipinfo"]["error"], "Missing API key");
        assert_eq!(value["ipinfo"]["city"], "N/A");
    }

    #[test]
    fn test_provider_result_conversion() {
        let entry: ProviderResult = FeodoResult::default().into();
        assert!(FeodoResult::try_from(entry.clone()).is_ok());
        assert!(AbuseResult::try_from(entry).is_err());
    }
}
