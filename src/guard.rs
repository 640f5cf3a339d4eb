//! Deterministic pattern guard
//!
//! Scans the *added* lines of a candidate diff for banned markers:
//! suppression directives, unfinished-work placeholders, and CI/security
//! bypass anti-patterns. Never calls the model, so a bad candidate is
//! rejected at zero token cost. The rule table is data; evaluation logic
//! does not change when rules are added.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::EvalError;

/// Canonical reason strings, one per category.
pub const SUPPRESSION_REASON: &str = "Suppression directive detected";
pub const PLACEHOLDER_REASON: &str = "Unfinished placeholder marker detected";
pub const BYPASS_REASON: &str = "CI/security bypass anti-pattern detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Suppression,
    Placeholder,
    Bypass,
}

impl RuleCategory {
    pub fn reason(&self) -> &'static str {
        match self {
            RuleCategory::Suppression => SUPPRESSION_REASON,
            RuleCategory::Placeholder => PLACEHOLDER_REASON,
            RuleCategory::Bypass => BYPASS_REASON,
        }
    }
}

/// One banned-pattern rule.
pub struct GuardRule {
    pub category: RuleCategory,
    pub label: &'static str,
    pub pattern: Regex,
}

fn rule(category: RuleCategory, label: &'static str, pattern: &str) -> GuardRule {
    GuardRule {
        category,
        label,
        pattern: Regex::new(pattern).expect("invalid guard rule pattern"),
    }
}

fn rules() -> &'static [GuardRule] {
    static RULES: OnceLock<Vec<GuardRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        use RuleCategory::*;
        vec![
            // Suppression: directives that silence type checkers and linters
            rule(Suppression, "ts-ignore", r"@ts-(?:ignore|nocheck|expect-error)"),
            rule(Suppression, "eslint-disable", r"eslint-disable"),
            rule(Suppression, "type-ignore", r"#\s*type:\s*ignore"),
            rule(Suppression, "noqa", r"#\s*noqa"),
            rule(Suppression, "pylint-disable", r"pylint:\s*disable"),
            rule(Suppression, "rust-allow", r"#!?\[allow\("),
            rule(Suppression, "suppress-warnings", r"@SuppressWarnings"),
            // Placeholder: unfinished-work annotations
            rule(Placeholder, "todo-marker", r"\b(?:TODO|FIXME|HACK|XXX)\b"),
            rule(Placeholder, "rust-unimplemented", r"\b(?:unimplemented|todo)!\s*\("),
            // Bypass: always-succeeding gate overrides
            rule(Bypass, "always-true", r"\|\|\s*true\b"),
            rule(Bypass, "trailing-exit-zero", r";\s*exit\s+0\b"),
            rule(Bypass, "continue-on-error", r"continue-on-error:\s*true"),
            // Bypass: TLS/SSL verification disabling
            rule(Bypass, "python-verify-false", r"verify\s*=\s*False"),
            rule(Bypass, "node-reject-unauthorized", r"rejectUnauthorized\s*:\s*false"),
            rule(Bypass, "go-insecure-skip-verify", r"InsecureSkipVerify\s*:\s*true"),
            rule(Bypass, "curl-insecure", r"(?:^|\s)(?:--insecure|-k)(?:\s|$)"),
            rule(Bypass, "wget-no-check-cert", r"--no-check-certificate"),
            rule(Bypass, "git-ssl-no-verify", r"GIT_SSL_NO_VERIFY"),
            rule(Bypass, "git-config-ssl", r"sslVerify\s*(?:=|\s)\s*false"),
            // Bypass: forced insecure transport
            rule(Bypass, "allow-insecure", r"--allow-insecure\b"),
            rule(
                Bypass,
                "plaintext-endpoint",
                r#"(?i)(?:url|endpoint|registry|host|server|proxy|mirror|index|source|repo(?:sitory)?)\S*\s*[:=]\s*["']?http://"#,
            ),
        ]
    })
}

/// A banned pattern found in a diff.
#[derive(Debug, Clone)]
pub struct GuardHit {
    pub category: RuleCategory,
    pub label: &'static str,
    pub line: String,
}

/// Scan a candidate diff and return every banned-pattern hit.
///
/// Only added lines are scanned: a patch that *removes* a TODO or an
/// `|| true` must not be rejected for it.
pub fn scan(diff: &str) -> Vec<GuardHit> {
    let mut hits = Vec::new();

    for line in diff.lines() {
        if !line.starts_with('+') || line.starts_with("+++") {
            continue;
        }
        let added = &line[1..];
        for rule in rules() {
            if rule.pattern.is_match(added) {
                hits.push(GuardHit {
                    category: rule.category,
                    label: rule.label,
                    line: added.to_string(),
                });
            }
        }
    }

    hits
}

/// Scan a diff and convert any hit into the containment error.
///
/// The reason names the category's canonical string plus the specific rules
/// that fired, so every rejection is traceable.
pub fn check(diff: &str) -> Result<(), EvalError> {
    let hits = scan(diff);
    if hits.is_empty() {
        return Ok(());
    }

    let mut reasons: Vec<String> = Vec::new();
    for hit in &hits {
        let reason = format!("{} ({})", hit.category.reason(), hit.label);
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }
    Err(EvalError::PatternViolation(reasons.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(line: &str) -> String {
        format!("--- a/f\n+++ b/f\n@@ -1 +1 @@\n+{}\n", line)
    }

    #[test]
    fn test_clean_diff_passes() {
        let diff = added("return compute(total)");
        assert!(check(&diff).is_ok());
    }

    #[test]
    fn test_type_check_suppression_rejected() {
        for line in [
            "// @ts-ignore",
            "// @ts-expect-error",
            "x = f()  # type: ignore",
        ] {
            let hits = scan(&added(line));
            assert_eq!(hits.len(), 1, "expected hit for {:?}", line);
            assert_eq!(hits[0].category, RuleCategory::Suppression);
        }
    }

    #[test]
    fn test_lint_suppression_rejected() {
        for line in [
            "/* eslint-disable no-unused-vars */",
            "import os  # noqa",
            "# pylint: disable=broad-except",
            "#[allow(dead_code)]",
        ] {
            assert!(check(&added(line)).is_err(), "expected rejection for {:?}", line);
        }
    }

    #[test]
    fn test_placeholder_markers_rejected() {
        for line in ["# TODO: finish this", "// FIXME later", "/* HACK */", "todo!()"] {
            let hits = scan(&added(line));
            assert!(!hits.is_empty(), "expected hit for {:?}", line);
            assert_eq!(hits[0].category, RuleCategory::Placeholder);
        }
    }

    #[test]
    fn test_always_true_override_rejected() {
        let hits = scan(&added("  run: npm test || true"));
        assert_eq!(hits[0].category, RuleCategory::Bypass);
    }

    #[test]
    fn test_ignore_step_failure_rejected() {
        assert!(check(&added("    continue-on-error: true")).is_err());
    }

    #[test]
    fn test_tls_verification_disabling_rejected() {
        for line in [
            "resp = requests.get(url, verify=False)",
            "agent = new https.Agent({ rejectUnauthorized: false })",
            "tls.Config{InsecureSkipVerify: true}",
            "curl --insecure https://example.com",
            "wget --no-check-certificate https://example.com",
        ] {
            assert!(check(&added(line)).is_err(), "expected rejection for {:?}", line);
        }
    }

    #[test]
    fn test_insecure_transport_flag_rejected() {
        assert!(check(&added("deploy --allow-insecure")).is_err());
    }

    #[test]
    fn test_https_downgrade_in_config_rejected() {
        let diff = "--- a/ci.yml\n+++ b/ci.yml\n@@ -1 +1 @@\n\
            -registry: https://pkg.example.com\n+registry: http://pkg.example.com\n";
        let hits = scan(diff);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, RuleCategory::Bypass);
        assert_eq!(hits[0].label, "plaintext-endpoint");
    }

    #[test]
    fn test_plaintext_endpoint_assignment_rejected() {
        for line in [
            "index-url = http://pypi.internal/simple",
            "ENDPOINT=\"http://api.example.com\"",
        ] {
            assert!(check(&added(line)).is_err(), "expected rejection for {:?}", line);
        }
    }

    #[test]
    fn test_plain_http_link_in_prose_passes() {
        // Only key/value endpoint assignments count as a downgrade
        assert!(check(&added("# docs at http://example.com/guide")).is_ok());
    }

    #[test]
    fn test_removed_todo_line_is_not_punished() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,2 +1 @@\n-# TODO: remove\n context\n";
        assert!(check(diff).is_ok());
    }

    #[test]
    fn test_context_lines_are_not_scanned() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n # TODO: existing debt\n+fixed = True\n";
        assert!(check(diff).is_ok());
    }

    #[test]
    fn test_file_header_is_not_an_added_line() {
        // `+++ b/TODO.md` is a header, not content
        let diff = "--- a/TODO.md\n+++ b/TODO.md\n@@ -1 +1 @@\n+done\n";
        assert!(check(diff).is_ok());
    }

    #[test]
    fn test_reason_names_category_and_rule() {
        let err = check(&added("npm test || true")).unwrap_err();
        let reason = err.reason();
        assert!(reason.contains(BYPASS_REASON));
        assert!(reason.contains("always-true"));
    }

    #[test]
    fn test_multiple_hits_accumulate() {
        let diff = "--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n+# TODO: later\n+run || true\n";
        let hits = scan(diff);
        assert_eq!(hits.len(), 2);
    }
}
