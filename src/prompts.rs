//! Prompt templates for strategy generation and quality review.
//!
//! Configuration, not engine logic: nothing here affects what the guards
//! accept or reject.

use crate::diagnosis::{Diagnosis, FailureContext, PatchPlan};
use crate::strategy::Strategy;

const STRATEGY_SYSTEM_PROMPT: &str = r#"You are a CI repair assistant. Given a diagnosis of a failed CI run, propose candidate patches at different risk tiers.

Respond with ONLY a JSON object of the form:
{"strategies": [{"id": "conservative", "label": "...", "risk_level": "low", "summary": "...", "diff": "..."}]}

RULES:
- Each "diff" must be a valid unified diff.
- Only touch files inside the allowed scope.
- risk_level must be one of: low, medium, high.
- Never suppress linters or type checkers, never add TODO placeholders,
  never weaken CI gates or TLS verification. Fix the cause.
- Order strategies from least to most invasive."#;

const REVIEW_SYSTEM_PROMPT: &str = r#"You are an adversarial patch reviewer. Judge whether the given patch is a genuine fix or superficial filler.

Respond with ONLY a JSON object of the form:
{"verdict": "GO", "slop_score": 0.1, "risk_level": "low", "reasons": ["..."], "suggested_adjustments": ["..."]}

RULES:
- verdict is GO or NO_GO.
- slop_score is a number in [0, 1]; higher means more filler, less fix.
- risk_level is low, medium, or high, judged from the patch itself.
- Be skeptical: a patch that only silences the symptom is NO_GO."#;

pub fn strategy_system_prompt() -> &'static str {
    STRATEGY_SYSTEM_PROMPT
}

pub fn review_system_prompt() -> &'static str {
    REVIEW_SYSTEM_PROMPT
}

/// Build the user prompt for strategy generation.
pub fn strategy_user_prompt(
    diagnosis: &Diagnosis,
    plan: &PatchPlan,
    context: &FailureContext,
    strategy_count: usize,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "CI workflow '{}' failed at step '{}'.\n\n",
        context.workflow_name, context.failing_step
    ));

    if let Some(selected) = diagnosis.selected() {
        prompt.push_str(&format!(
            "Diagnosed root cause ({} confidence {:.2}): {}\n",
            selected.category, selected.confidence, selected.id
        ));
        for evidence in &selected.evidence {
            prompt.push_str(&format!("  evidence: {}\n", evidence));
        }
    }
    if let Some(guidance) = &diagnosis.review_guidance {
        prompt.push_str(&format!("Reviewer guidance: {}\n", guidance));
    }

    prompt.push_str(&format!("\nFix intent: {}\n", plan.intent));
    if !plan.allowed_files.is_empty() {
        prompt.push_str(&format!(
            "Allowed file scope (globs): {}\n",
            plan.allowed_files.join(", ")
        ));
    }
    for hint in &plan.strategy_hints {
        prompt.push_str(&format!("Hint: {}\n", hint));
    }

    if !context.log_summary.is_empty() {
        prompt.push_str(&format!("\nLog summary:\n{}\n", context.log_summary));
    }
    if !context.log_excerpt.is_empty() {
        prompt.push_str(&format!("\nLog excerpt:\n{}\n", context.log_excerpt));
    }
    if !context.failing_test_files.is_empty() {
        prompt.push_str(&format!(
            "\nFailing test files: {}\n",
            context.failing_test_files.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "\nPropose {} candidate strategies at increasing risk tiers.",
        strategy_count
    ));

    prompt
}

/// Build the user prompt for reviewing one candidate.
///
/// Scoped to a single candidate so a malformed review of one cannot corrupt
/// another's.
pub fn review_user_prompt(strategy: &Strategy, plan: &PatchPlan) -> String {
    format!(
        "Fix intent: {}\n\nCandidate '{}' (declared risk: {}):\n{}\n\nPatch:\n```diff\n{}\n```\n\nReview this single patch.",
        plan.intent,
        strategy.id,
        strategy.risk_level.label(),
        strategy.summary,
        strategy.diff
    )
}
