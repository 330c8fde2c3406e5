//! Analysis result types
//!
//! The result payload is opaque to the orchestration protocol beyond the
//! fields below; the backend may attach more, which are ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Risk tier for a single region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    /// Anything else the backend reports (e.g. fallback analysis)
    #[default]
    #[serde(other)]
    Unknown,
}

/// Follow-up urgency attached to a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Soon,
    Urgent,
    Immediate,
    #[serde(other)]
    Unknown,
}

/// Per-region finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<u32>,
    /// Region label, e.g. "left_eye"
    pub region_type: String,
    pub leukocoria_detected: bool,
    /// Confidence in [0, 1]
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub risk_level: RiskTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
}

/// Overall summary attached by some backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub overall_risk: RiskTier,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_screening: Option<String>,
}

/// Result of one completed analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Session the run belonged to; stamped by the client when the backend omits it
    #[serde(default)]
    pub session_id: String,
    /// Regions examined (older backends send `regions_analyzed`)
    #[serde(default, alias = "regions_analyzed")]
    pub total_regions: u32,
    /// Positive detections as reported by the backend
    #[serde(default)]
    pub positive_detections: u32,
    /// Findings in backend order
    #[serde(default)]
    pub results: Vec<RegionFinding>,
    #[serde(default, alias = "method", skip_serializing_if = "Option::is_none")]
    pub analysis_method: Option<String>,
    /// Backend-side processing time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnalysisSummary>,
}

impl AnalysisResult {
    /// Number of findings with the detection flag set
    ///
    /// Metrics are computed from this count, not from `positive_detections`.
    pub fn positive_findings(&self) -> u64 {
        self.results.iter().filter(|r| r.leukocoria_detected).count() as u64
    }

    /// Highest risk tier among the findings
    pub fn highest_risk(&self) -> RiskTier {
        let rank = |tier: RiskTier| match tier {
            RiskTier::Unknown => 0,
            RiskTier::Low => 1,
            RiskTier::Medium => 2,
            RiskTier::High => 3,
        };
        self.results
            .iter()
            .map(|r| r.risk_level)
            .max_by_key(|tier| rank(*tier))
            .unwrap_or(RiskTier::Unknown)
    }
}

/// Map a reported confidence into [0, 1]
///
/// Backends report either a fraction or a percentage; values above 1 are
/// treated as percentages.
pub fn normalize_confidence(raw: f64) -> f64 {
    let value = if raw > 1.0 { raw / 100.0 } else { raw };
    value.clamp(0.0, 1.0)
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(normalize_confidence(raw))
}
