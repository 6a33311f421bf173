//! Composite threat score

use crate::models::{AbuseResult, FeodoResult, VtResult};

pub const MAX_SCORE: f64 = 100.0;

/// Weights applied to each provider's signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Multiplier for the AbuseIPDB confidence score (0-100)
    pub abuseipdb_weight: f64,
    /// Points per VirusTotal engine reporting the address as malicious
    pub virustotal_weight: f64,
    /// Multiplier for the Feodo Tracker confidence level, only when listed
    pub feodo_weight: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            abuseipdb_weight: 0.5,
            virustotal_weight: 10.0,
            feodo_weight: 0.5,
        }
    }
}

impl ScoringPolicy {
    pub fn abuseipdb(&self, result: &AbuseResult) -> f64 {
        f64::from(result.confidence_score) * self.abuseipdb_weight
    }

    pub fn virustotal(&self, result: &VtResult) -> f64 {
        f64::from(result.malicious_count) * self.virustotal_weight
    }

    pub fn feodo(&self, result: &FeodoResult) -> f64 {
        if result.is_malicious {
            f64::from(result.confidence_level) * self.feodo_weight
        } else {
            0.0
        }
    }

    /// Sum the contributions and clamp to `[0, 100]`
    pub fn compose(&self, contributions: &[f64]) -> f64 {
        let total: f64 = contributions.iter().filter(|c| c.is_finite()).sum();
        total.clamp(0.0, MAX_SCORE)
    }
}
