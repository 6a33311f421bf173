//! Feodo Tracker botnet C2 blocklist provider (no API key)

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::enrichment::{check_status, CachedLookup, ProviderError, ThreatProvider};
use crate::models::{FeodoResult, Provider};

pub const FEODO_BLOCKLIST_URL: &str = "https://feodotracker.abuse.ch/downloads/ipblocklist.txt";

const FEODO_TIMEOUT: Duration = Duration::from_secs(5);
const FEODO_SOURCE: &str = "Feodo Tracker";
const MALICIOUS_CONFIDENCE: u8 = 75;
const MALWARE_TYPE: &str = "Botnet C2";

/// Parse the plaintext blocklist into a set of IPv4 addresses.
///
/// Comment lines start with `#`; entries containing `:` are IPv6 and skipped.
pub fn parse_blocklist(text: &str) -> HashSet<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.contains(':'))
        .collect()
}

fn verdict(is_malicious: bool) -> FeodoResult {
    FeodoResult {
        is_malicious,
        source: FEODO_SOURCE.to_string(),
        confidence_level: if is_malicious { MALICIOUS_CONFIDENCE } else { 0 },
        malware_types: if is_malicious {
            vec![MALWARE_TYPE.to_string()]
        } else {
            vec![]
        },
        error: None,
    }
}

/// Feodo Tracker provider
pub struct FeodoTrackerProvider {
    client: Client,
    blocklist_url: String,
    timeout: Duration,
    cache: CachedLookup,
}

impl FeodoTrackerProvider {
    pub fn new(client: Client, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            blocklist_url: FEODO_BLOCKLIST_URL.to_string(),
            timeout: FEODO_TIMEOUT,
            cache: CachedLookup::new(cache, Provider::FeodoTracker),
        }
    }

    pub fn with_blocklist_url(mut self, url: impl Into<String>) -> Self {
        self.blocklist_url = url.into();
        self
    }
}
