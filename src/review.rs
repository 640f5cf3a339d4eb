//! Quality review adapter
//!
//! Asks the external model for an independent quality judgment of one
//! candidate and validates the shape of its answer. Every failure mode is
//! converted into a fail-closed NO_GO verdict; nothing from here can abort
//! the run or another candidate's review.

use serde::Deserialize;

use crate::client::{truncate_str, PatchModel};
use crate::diagnosis::PatchPlan;
use crate::error::EvalError;
use crate::prompts::{review_system_prompt, review_user_prompt};
use crate::strategy::{extract_json_object, QualityVerdict, RiskLevel, Strategy, Verdict};

/// The review of one candidate: the (possibly converted) verdict plus the
/// raw model output for the audit trail.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub verdict: QualityVerdict,
    /// Unmodified model response; on a transport failure, the error text.
    pub raw_response: String,
    /// The contained failure, when the review did not validate.
    pub failure: Option<EvalError>,
}

/// Review one candidate. One request per candidate: a malformed response
/// here cannot corrupt any other candidate's review.
pub async fn review_candidate<M: PatchModel>(
    model: &M,
    strategy: &Strategy,
    plan: &PatchPlan,
) -> ReviewOutcome {
    let user = review_user_prompt(strategy, plan);

    let raw_response = match model.review_candidate(review_system_prompt(), &user).await {
        Ok(text) => text,
        Err(e) => {
            let failure = EvalError::Generation(e.to_string());
            return ReviewOutcome {
                verdict: QualityVerdict::rejected(failure.reason()),
                raw_response: format!("(no response) {}", e),
                failure: Some(failure),
            };
        }
    };

    match validate_verdict(&raw_response) {
        Ok(verdict) => ReviewOutcome {
            verdict,
            raw_response,
            failure: None,
        },
        Err(failure) => ReviewOutcome {
            verdict: QualityVerdict::rejected(failure.reason()),
            raw_response,
            failure: Some(failure),
        },
    }
}

#[derive(Deserialize)]
struct RawVerdictJson {
    #[serde(default)]
    verdict: String,
    slop_score: Option<f64>,
    #[serde(default)]
    risk_level: String,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    suggested_adjustments: Vec<String>,
}

/// Parse and validate a quality-verdict payload.
///
/// Unparsable text is a `Generation` failure; well-formed JSON with
/// out-of-contract fields is a `SchemaViolation`.
pub fn validate_verdict(response: &str) -> Result<QualityVerdict, EvalError> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        EvalError::Generation(format!(
            "no JSON object in review response: {}",
            truncate_str(response, 120)
        ))
    })?;

    let raw: RawVerdictJson = serde_json::from_str(json_str)
        .map_err(|e| EvalError::Generation(e.to_string()))?;

    let verdict = Verdict::parse(&raw.verdict)
        .ok_or_else(|| EvalError::SchemaViolation(format!("unknown verdict {:?}", raw.verdict)))?;

    let risk_level = RiskLevel::parse(&raw.risk_level).ok_or_else(|| {
        EvalError::SchemaViolation(format!("unknown risk_level {:?}", raw.risk_level))
    })?;

    let slop_score = raw
        .slop_score
        .ok_or_else(|| EvalError::SchemaViolation("slop_score missing".to_string()))?;
    if !(0.0..=1.0).contains(&slop_score) {
        return Err(EvalError::SchemaViolation(format!(
            "slop_score out of range: {}",
            slop_score
        )));
    }

    Ok(QualityVerdict {
        verdict,
        slop_score,
        risk_level,
        reasons: raw.reasons,
        suggested_adjustments: raw.suggested_adjustments,
    })
}
