//! Confidence-gap resolution
//!
//! Normalizes a diagnosis before any generation happens: re-weights
//! hypotheses using the failure context, re-sorts them, overrides the
//! generator's selection with the top-confidence hypothesis, and flags
//! low-confidence ambiguity. Pure and deterministic; no I/O.

use crate::config::EngineConfig;
use crate::diagnosis::{Diagnosis, FailureContext, Hypothesis};

/// Fixed nudge applied by the category re-weighting table.
const CATEGORY_NUDGE: f64 = 0.05;

/// Normalize a diagnosis in place.
///
/// After this call `selected_hypothesis_id` always references the
/// highest-confidence hypothesis, regardless of what the generator
/// originally selected.
pub fn resolve_confidence(
    diagnosis: &mut Diagnosis,
    context: &FailureContext,
    config: &EngineConfig,
) {
    for hypothesis in &mut diagnosis.hypotheses {
        let nudge = category_nudge(hypothesis, context);
        if nudge != 0.0 {
            hypothesis.confidence = (hypothesis.confidence + nudge).clamp(0.0, 1.0);
        }
    }

    // Stable sort: equal confidences keep generator order.
    diagnosis
        .hypotheses
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let top = diagnosis.hypotheses.first();
    diagnosis.selected_hypothesis_id = top.map(|h| h.id.clone());
    diagnosis.confidence_score = top.map(|h| h.confidence).unwrap_or(0.0);

    diagnosis.confidence_gap = match (diagnosis.hypotheses.first(), diagnosis.hypotheses.get(1)) {
        (Some(first), Some(second)) => first.confidence - second.confidence,
        _ => 0.0,
    };

    diagnosis.low_confidence_ambiguity =
        diagnosis.confidence_gap < config.ambiguity_gap_threshold;

    if diagnosis.low_confidence_ambiguity && !diagnosis.hypotheses.is_empty() {
        let guidance = format!(
            "Top hypotheses are within {:.2} confidence of each other; \
             re-run diagnosis in deep-trace mode before trusting the selection.",
            diagnosis.confidence_gap.max(0.0)
        );
        diagnosis.review_guidance = match diagnosis.review_guidance.take() {
            Some(existing) => Some(format!("{}\n{}", existing, guidance)),
            None => Some(guidance),
        };
    }
}

/// Deterministic category-aware re-weighting.
///
/// The failure context hints at which family of hypotheses is more likely:
/// failing test files point at test problems, a lint step at lint problems,
/// a build step at build problems.
fn category_nudge(hypothesis: &Hypothesis, context: &FailureContext) -> f64 {
    let category = hypothesis.category.to_lowercase();
    let step = context.failing_step.to_lowercase();

    if !context.failing_test_files.is_empty()
        && (category.contains("test") || category.contains("flake"))
    {
        return CATEGORY_NUDGE;
    }

    let lint_step = ["lint", "fmt", "clippy", "format"]
        .iter()
        .any(|k| step.contains(k));
    if lint_step && (category.contains("lint") || category.contains("style")) {
        return CATEGORY_NUDGE;
    }

    let build_step = ["build", "compile"].iter().any(|k| step.contains(k));
    if build_step && (category.contains("build") || category.contains("compile")) {
        return CATEGORY_NUDGE;
    }

    0.0
}
