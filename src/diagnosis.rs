//! Diagnosis-side domain types
//!
//! Inputs handed to the engine by the diagnosis collaborator: the ranked
//! root-cause hypotheses, the patch plan (intent + allowed file scope), and
//! the failure context extracted from CI logs.

use serde::{Deserialize, Serialize};

/// One root-cause hypothesis for a CI failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    /// Coarse failure category, e.g. "test-flake", "lint", "build", "dependency"
    pub category: String,
    /// How likely this hypothesis is, in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub disconfirming_evidence: Vec<String>,
    /// What to inspect next to confirm or kill this hypothesis
    #[serde(default)]
    pub next_check: Option<String>,
}

impl Hypothesis {
    pub fn new(id: impl Into<String>, category: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            confidence,
            evidence: Vec::new(),
            disconfirming_evidence: Vec::new(),
            next_check: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// A diagnosis of one CI failure: hypotheses plus derived confidence fields.
///
/// The generator's original `selected_hypothesis_id` is advisory only; after
/// `resolve::resolve_confidence` the selection always points at the
/// highest-confidence hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    pub selected_hypothesis_id: Option<String>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub low_confidence_ambiguity: bool,
    #[serde(default)]
    pub confidence_gap: f64,
    #[serde(default)]
    pub review_guidance: Option<String>,
}

impl Diagnosis {
    pub fn new(hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            hypotheses,
            selected_hypothesis_id: None,
            confidence_score: 0.0,
            low_confidence_ambiguity: false,
            confidence_gap: 0.0,
            review_guidance: None,
        }
    }

    /// The currently selected hypothesis, if any.
    pub fn selected(&self) -> Option<&Hypothesis> {
        let id = self.selected_hypothesis_id.as_deref()?;
        self.hypotheses.iter().find(|h| h.id == id)
    }
}

/// What the patch is supposed to do and where it is allowed to do it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPlan {
    /// Free-text statement of what the fix should accomplish
    pub intent: String,
    /// Glob patterns for paths a candidate may touch. Empty = unrestricted.
    #[serde(default)]
    pub allowed_files: Vec<String>,
    /// Free-text strategy hints forwarded to the generator
    #[serde(default)]
    pub strategy_hints: Vec<String>,
}

impl PatchPlan {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            allowed_files: Vec::new(),
            strategy_hints: Vec::new(),
        }
    }

    pub fn with_allowed_files(mut self, globs: Vec<String>) -> Self {
        self.allowed_files = globs;
        self
    }
}

/// Failure context from the log-context collaborator.
///
/// Consumed by the abstain classifier and the confidence-gap resolver; the
/// raw log text never reaches the scope/pattern guards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(default)]
    pub workflow_name: String,
    #[serde(default)]
    pub failing_step: String,
    #[serde(default)]
    pub log_summary: String,
    #[serde(default)]
    pub log_excerpt: String,
    #[serde(default)]
    pub failing_test_files: Vec<String>,
}

impl FailureContext {
    /// All the text the abstain classifier scans, joined.
    pub fn signal_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.failing_step);
        text.push('\n');
        text.push_str(&self.log_summary);
        text.push('\n');
        text.push_str(&self.log_excerpt);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_resolves_by_id() {
        let mut diagnosis = Diagnosis::new(vec![
            Hypothesis::new("h1", "build", 0.4),
            Hypothesis::new("h2", "test-flake", 0.6),
        ]);
        diagnosis.selected_hypothesis_id = Some("h2".to_string());
        assert_eq!(diagnosis.selected().unwrap().category, "test-flake");
    }

    #[test]
    fn test_signal_text_includes_all_log_fields() {
        let context = FailureContext {
            failing_step: "deploy".to_string(),
            log_summary: "403 Forbidden".to_string(),
            log_excerpt: "curl: (22) error".to_string(),
            ..Default::default()
        };
        let text = context.signal_text();
        assert!(text.contains("deploy"));
        assert!(text.contains("403 Forbidden"));
        assert!(text.contains("curl"));
    }

    #[test]
    fn test_diagnosis_deserializes_with_missing_derived_fields() {
        let json = r#"{"hypotheses": [{"id": "h1", "category": "lint", "confidence": 0.8}]}"#;
        let diagnosis: Diagnosis = serde_json::from_str(json).unwrap();
        assert_eq!(diagnosis.hypotheses.len(), 1);
        assert!(diagnosis.selected_hypothesis_id.is_none());
        assert_eq!(diagnosis.confidence_gap, 0.0);
    }
}
