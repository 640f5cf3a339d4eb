//! Patch spectrum assembly
//!
//! Merges the scope, guard, and review results for each candidate into one
//! final entry and picks the canonical recommendation. NO_GO from any single
//! stage wins; reasons accumulate in stage order (scope, guard, review).

use uuid::Uuid;

use crate::error::EvalError;
use crate::scope::OUT_OF_SCOPE_REASON;
use crate::strategy::{PatchIndex, PatchIndexResult, QualityVerdict, RiskLevel, Verdict};

/// Everything known about one candidate after evaluation.
#[derive(Debug)]
pub struct CandidateEvaluation {
    pub strategy_id: String,
    pub touched_files: Vec<String>,
    pub scope_violation: Option<EvalError>,
    pub guard_violation: Option<EvalError>,
    /// `None` when deterministic screening rejected the candidate before any
    /// model call was made.
    pub review: Option<QualityVerdict>,
}

/// Merge one candidate's stage results into its final index entry.
pub fn merge(eval: CandidateEvaluation) -> PatchIndexResult {
    let mut reasons = Vec::new();
    let mut forced_no_go = false;

    if let Some(violation) = &eval.scope_violation {
        forced_no_go = true;
        reasons.push(OUT_OF_SCOPE_REASON.to_string());
        reasons.push(violation.reason());
    }
    if let Some(violation) = &eval.guard_violation {
        forced_no_go = true;
        reasons.push(violation.reason());
    }

    let (verdict, risk_level, slop_score) = match &eval.review {
        Some(review) => {
            reasons.extend(review.reasons.iter().cloned());
            let verdict = if forced_no_go || review.verdict == Verdict::NoGo {
                Verdict::NoGo
            } else {
                Verdict::Go
            };
            let risk = if forced_no_go {
                RiskLevel::High
            } else {
                review.risk_level
            };
            (verdict, risk, review.slop_score.clamp(0.0, 1.0))
        }
        None => {
            if !forced_no_go {
                // Unreachable in the normal flow; fail closed anyway.
                reasons.push("Quality review missing".to_string());
            }
            (Verdict::NoGo, RiskLevel::High, 1.0)
        }
    };

    PatchIndexResult {
        strategy_id: eval.strategy_id,
        verdict,
        risk_level,
        slop_score,
        touched_files: eval.touched_files,
        reasons,
    }
}

/// Assemble the ordered index and pick the canonical recommendation:
/// the GO candidate with the lowest final risk tier, ties broken by
/// generation order.
pub fn assemble(
    run_id: Uuid,
    evaluations: Vec<CandidateEvaluation>,
    notes: Vec<String>,
) -> PatchIndex {
    let results: Vec<PatchIndexResult> = evaluations.into_iter().map(merge).collect();

    let recommended = results
        .iter()
        .filter(|r| r.verdict.is_go())
        .min_by_key(|r| r.risk_level)
        .map(|r| r.strategy_id.clone());

    PatchIndex {
        run_id,
        results,
        recommended,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_go(id: &str, risk: RiskLevel) -> CandidateEvaluation {
        CandidateEvaluation {
            strategy_id: id.to_string(),
            touched_files: vec!["src/app.py".to_string()],
            scope_violation: None,
            guard_violation: None,
            review: Some(QualityVerdict {
                verdict: Verdict::Go,
                slop_score: 0.1,
                risk_level: risk,
                reasons: vec!["targeted fix".to_string()],
                suggested_adjustments: Vec::new(),
            }),
        }
    }

    fn scope_rejected(id: &str) -> CandidateEvaluation {
        CandidateEvaluation {
            strategy_id: id.to_string(),
            touched_files: vec!["secrets/key.pem".to_string()],
            scope_violation: Some(EvalError::ScopeViolation("secrets/key.pem".to_string())),
            guard_violation: None,
            review: None,
        }
    }

    #[test]
    fn test_scope_violation_overrides_go_review() {
        let mut eval = clean_go("a", RiskLevel::Low);
        eval.scope_violation = Some(EvalError::ScopeViolation("etc/passwd".to_string()));

        let result = merge(eval);
        assert_eq!(result.verdict, Verdict::NoGo);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.reasons.iter().any(|r| r == OUT_OF_SCOPE_REASON));
        // The GO review's reasons still accumulate for the audit trail
        assert!(result.reasons.iter().any(|r| r == "targeted fix"));
    }

    #[test]
    fn test_guard_violation_forces_no_go() {
        let mut eval = clean_go("a", RiskLevel::Low);
        eval.guard_violation =
            Some(EvalError::PatternViolation("always-true override".to_string()));

        let result = merge(eval);
        assert_eq!(result.verdict, Verdict::NoGo);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_short_circuited_candidate_fails_closed() {
        let result = merge(scope_rejected("a"));
        assert_eq!(result.verdict, Verdict::NoGo);
        assert_eq!(result.slop_score, 1.0);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_clean_candidate_keeps_review_verdict() {
        let result = merge(clean_go("b", RiskLevel::Medium));
        assert_eq!(result.verdict, Verdict::Go);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.slop_score, 0.1);
    }

    #[test]
    fn test_recommendation_prefers_lowest_risk() {
        let index = assemble(
            Uuid::new_v4(),
            vec![
                clean_go("aggressive", RiskLevel::High),
                clean_go("conservative", RiskLevel::Low),
                clean_go("balanced", RiskLevel::Medium),
            ],
            Vec::new(),
        );
        assert_eq!(index.recommended.as_deref(), Some("conservative"));
    }

    #[test]
    fn test_recommendation_tie_broken_by_generation_order() {
        let index = assemble(
            Uuid::new_v4(),
            vec![clean_go("first", RiskLevel::Low), clean_go("second", RiskLevel::Low)],
            Vec::new(),
        );
        assert_eq!(index.recommended.as_deref(), Some("first"));
    }

    #[test]
    fn test_no_go_spectrum_reports_no_safe_patch() {
        let index = assemble(
            Uuid::new_v4(),
            vec![scope_rejected("a"), scope_rejected("b")],
            Vec::new(),
        );
        assert!(index.recommended.is_none());
        assert!(index.no_safe_patch());
    }

    #[test]
    fn test_exactly_one_go_among_rejects() {
        let index = assemble(
            Uuid::new_v4(),
            vec![
                scope_rejected("a"),
                clean_go("b", RiskLevel::Medium),
                scope_rejected("c"),
            ],
            Vec::new(),
        );
        let go_count = index.results.iter().filter(|r| r.verdict.is_go()).count();
        assert_eq!(go_count, 1);
        assert_eq!(index.recommended.as_deref(), Some("b"));
    }

    #[test]
    fn test_index_preserves_generation_order() {
        let index = assemble(
            Uuid::new_v4(),
            vec![clean_go("x", RiskLevel::High), scope_rejected("y"), clean_go("z", RiskLevel::Low)],
            Vec::new(),
        );
        let ids: Vec<&str> = index.results.iter().map(|r| r.strategy_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }
}
