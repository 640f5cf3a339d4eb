//! Typed failures for per-candidate evaluation.
//!
//! Every variant here is *contained*: it is converted into a NO_GO verdict
//! with a reason string and never aborts the run or other candidates.
//! Abstention is deliberately not an error; it is a distinct run outcome
//! (see `strategy::RunOutcome`).

use thiserror::Error;

/// A failure while evaluating a single candidate.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The external model produced empty, truncated, or unparsable output,
    /// or the call timed out / was cancelled.
    #[error("Parse error: {0}")]
    Generation(String),

    /// The model responded with well-formed JSON whose fields violate the
    /// verdict contract (out-of-range slop_score, unknown enum value).
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// The candidate diff touches a path outside the allow-list.
    #[error("Out-of-scope file changes detected: {0}")]
    ScopeViolation(String),

    /// The candidate diff matched a banned suppression/bypass pattern.
    #[error("Banned pattern detected: {0}")]
    PatternViolation(String),
}

impl EvalError {
    /// Reason string recorded in the patch index for this failure.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_identifies_failure_mode() {
        let err = EvalError::Generation("unexpected end of input".to_string());
        assert!(err.reason().starts_with("Parse error:"));

        let err = EvalError::SchemaViolation("slop_score out of range: 1.7".to_string());
        assert!(err.reason().contains("slop_score out of range"));
    }
}
