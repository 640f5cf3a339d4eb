//! Candidate strategies and verdict types
//!
//! A run produces a spectrum of candidate patches at different risk tiers.
//! Each candidate is immutable once generated; the guards and the review
//! adapter only ever produce new verdicts about it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abstain::AbstainReport;

/// Declared or assessed risk tier. Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parse the wire form ("low"/"medium"/"high"). Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Final or per-stage judgment on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "NO_GO")]
    NoGo,
}

impl Verdict {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "GO" => Some(Verdict::Go),
            "NO_GO" => Some(Verdict::NoGo),
            _ => None,
        }
    }

    pub fn is_go(&self) -> bool {
        matches!(self, Verdict::Go)
    }
}

/// One candidate patch at a declared risk tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    /// e.g. "conservative", "balanced", "aggressive"
    pub id: String,
    pub label: String,
    pub risk_level: RiskLevel,
    pub summary: String,
    /// Unified-diff text of the proposed patch
    pub diff: String,
}

/// Validated quality judgment for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub verdict: Verdict,
    /// How much of the patch is filler rather than fix, in [0, 1]. Higher is worse.
    pub slop_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub suggested_adjustments: Vec<String>,
}

impl QualityVerdict {
    /// The fail-closed verdict used when the review itself failed.
    pub fn rejected(reason: String) -> Self {
        Self {
            verdict: Verdict::NoGo,
            slop_score: 1.0,
            risk_level: RiskLevel::High,
            reasons: vec![reason],
            suggested_adjustments: Vec::new(),
        }
    }
}

/// Final per-candidate entry in the run's patch index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchIndexResult {
    pub strategy_id: String,
    pub verdict: Verdict,
    pub risk_level: RiskLevel,
    pub slop_score: f64,
    pub touched_files: Vec<String>,
    pub reasons: Vec<String>,
}

/// The assembled, ordered index of all candidates for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchIndex {
    pub run_id: Uuid,
    pub results: Vec<PatchIndexResult>,
    /// Strategy id of the canonical recommendation; `None` = no safe patch.
    pub recommended: Option<String>,
    /// Run-level notes (e.g. a failed generation call), for the audit trail.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl PatchIndex {
    /// Whether the run ended with no usable candidate.
    pub fn no_safe_patch(&self) -> bool {
        self.recommended.is_none()
    }
}

/// Terminal outcome of one engine run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The failure was judged not mechanically repairable; nothing was generated.
    Abstained(AbstainReport),
    /// The full spectrum was evaluated (possibly with zero GO candidates).
    Index(PatchIndex),
}

/// Strip markdown code fences from a model response.
pub(crate) fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Extract the outermost JSON object from a response that may wrap it in prose.
pub(crate) fn extract_json_object(response: &str) -> Option<&str> {
    let clean = strip_markdown_fences(response);
    let start = clean.find('{')?;
    let end = clean.rfind('}')?;
    if start <= end {
        Some(&clean[start..=end])
    } else {
        None
    }
}

#[derive(Deserialize)]
struct StrategiesPayload {
    strategies: Vec<StrategyJson>,
}

#[derive(Deserialize)]
struct StrategyJson {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    risk_level: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    diff: String,
}

/// Parse the generator's `{ "strategies": [...] }` payload.
///
/// An unknown risk tier defaults to `High`: a candidate that cannot even
/// declare its tier correctly should not be treated as safe.
pub fn parse_strategies(response: &str) -> anyhow::Result<Vec<Strategy>> {
    let json_str = extract_json_object(response)
        .ok_or_else(|| anyhow::anyhow!("No JSON object found in strategy response"))?;

    let payload: StrategiesPayload = serde_json::from_str(json_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse strategy payload: {}", e))?;

    if payload.strategies.is_empty() {
        return Err(anyhow::anyhow!("Strategy payload contains no strategies"));
    }

    let strategies = payload
        .strategies
        .into_iter()
        .map(|s| {
            let risk_level = RiskLevel::parse(&s.risk_level).unwrap_or(RiskLevel::High);
            let label = if s.label.is_empty() {
                s.id.clone()
            } else {
                s.label
            };
            Strategy {
                id: s.id,
                label,
                risk_level,
                summary: s.summary,
                diff: s.diff,
            }
        })
        .collect();

    Ok(strategies)
}
