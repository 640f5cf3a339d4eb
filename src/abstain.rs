//! Abstain classification
//!
//! Decides whether a CI failure is mechanically repairable at all. Runs
//! before anything else; when it fires, the run terminates with zero
//! generator calls. The signal tables are data, not control flow, so new
//! signals can be added without touching the evaluation logic.
//!
//! STRONG signals are explicit authorization/permission failures that no
//! code patch can fix (expired tokens, missing scopes, org policy). WEAK
//! signals are phrases that merely *sound* like authorization problems;
//! a bare "permission denied" is usually a chmod away from fixable.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::EngineConfig;
use crate::diagnosis::FailureContext;

/// One abstain signal: a label and the pattern that detects it.
pub struct SignalRule {
    pub label: &'static str,
    pub pattern: Regex,
}

fn rule(label: &'static str, pattern: &str) -> SignalRule {
    SignalRule {
        label,
        // Table patterns are compile-time constants; a bad one is a bug.
        pattern: Regex::new(pattern).expect("invalid abstain signal pattern"),
    }
}

fn strong_signals() -> &'static [SignalRule] {
    static RULES: OnceLock<Vec<SignalRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule("http-403", r"(?i)403 Forbidden"),
            rule("http-401", r"(?i)401 Unauthorized"),
            rule("http-auth-status", r"(?i)HTTP(?:/[\d.]+)?\s+(?:401|403)\b"),
            rule(
                "integration-access",
                r"(?i)not accessible by (?:integration|personal access token)",
            ),
            rule("bad-credentials", r"(?i)bad credentials"),
            rule(
                "token-scope",
                r"(?i)(?:insufficient|missing|requires?)[^\n]{0,40}(?:scope|permission)s?\b[^\n]{0,40}token|token[^\n]{0,40}(?:insufficient|missing|does not have)[^\n]{0,40}scopes?",
            ),
            rule("oauth-scope", r"(?i)oauth[^\n]{0,40}scope[^\n]{0,40}(?:denied|missing|required)"),
            rule("saml-sso", r"(?i)saml[^\n]{0,40}enforcement|organization has enabled[^\n]{0,40}sso"),
        ]
    })
}

fn weak_signals() -> &'static [SignalRule] {
    static RULES: OnceLock<Vec<SignalRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule("permission-denied", r"(?i)permission denied"),
            rule("access-denied", r"(?i)access denied"),
            rule("eacces", r"\bEACCES\b"),
        ]
    })
}

/// Classification recorded when the engine refuses to generate patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbstainReport {
    /// e.g. "NOT_PATCHABLE"
    pub classification: String,
    /// Labels and matched text of the signals that fired
    pub matched_signals: Vec<MatchedSignal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedSignal {
    pub label: String,
    pub matched_text: String,
    pub strength: SignalStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Strong,
    Weak,
}

pub const NOT_PATCHABLE: &str = "NOT_PATCHABLE";

/// Decide whether to abstain from patching this failure.
///
/// Any STRONG signal abstains. WEAK signals abstain only when the optional
/// `weak_signal_quorum` is configured and at least that many *distinct* weak
/// rules match; by default they never abstain on their own.
pub fn classify(context: &FailureContext, config: &EngineConfig) -> Option<AbstainReport> {
    let text = context.signal_text();
    let mut matched = Vec::new();

    for signal in strong_signals() {
        if let Some(m) = signal.pattern.find(&text) {
            matched.push(MatchedSignal {
                label: signal.label.to_string(),
                matched_text: m.as_str().to_string(),
                strength: SignalStrength::Strong,
            });
        }
    }

    let mut weak_matches = Vec::new();
    for signal in weak_signals() {
        if let Some(m) = signal.pattern.find(&text) {
            weak_matches.push(MatchedSignal {
                label: signal.label.to_string(),
                matched_text: m.as_str().to_string(),
                strength: SignalStrength::Weak,
            });
        }
    }

    let strong_fired = !matched.is_empty();
    let weak_fired = match config.weak_signal_quorum {
        Some(quorum) => quorum > 0 && weak_matches.len() >= quorum,
        None => false,
    };

    if !strong_fired && !weak_fired {
        return None;
    }

    matched.extend(weak_matches);
    Some(AbstainReport {
        classification: NOT_PATCHABLE.to_string(),
        matched_signals: matched,
        timestamp: Utc::now(),
    })
}
