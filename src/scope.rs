//! Diff scope validation
//!
//! Extracts every file path a unified diff touches and checks the set
//! against the patch plan's allow-list globs. An out-of-scope touch is a
//! hard rejection that overrides any GO from the model review.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::EvalError;

pub const OUT_OF_SCOPE_REASON: &str = "Out-of-scope file changes detected";

/// Paths git uses for additions/deletions; never a real touched file.
const NULL_DEVICE: &str = "/dev/null";

/// Result of scoping one candidate diff.
#[derive(Debug, Clone)]
pub struct ScopeReport {
    /// Every file the diff touches, deduplicated, in order of appearance
    pub touched_files: Vec<String>,
    /// Touched files not matched by any allow-list pattern
    pub out_of_scope: Vec<String>,
}

impl ScopeReport {
    pub fn violation(&self) -> Option<EvalError> {
        if self.out_of_scope.is_empty() {
            None
        } else {
            Some(EvalError::ScopeViolation(self.out_of_scope.join(", ")))
        }
    }
}

/// Check a candidate diff against the allow-list.
///
/// An empty allow-list imposes no restriction. Allow-list patterns that fail
/// to compile are dropped, which can only shrink the allowed set.
pub fn evaluate(diff: &str, allowed_globs: &[String]) -> ScopeReport {
    let touched_files = touched_files(diff);

    if allowed_globs.is_empty() {
        return ScopeReport {
            touched_files,
            out_of_scope: Vec::new(),
        };
    }

    let glob_set = GlobSet::compile(allowed_globs);
    let out_of_scope = touched_files
        .iter()
        .filter(|path| !glob_set.matches(path))
        .cloned()
        .collect();

    ScopeReport {
        touched_files,
        out_of_scope,
    }
}

fn binary_files_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Binary files (.+) and (.+) differ$").expect("invalid binary-files pattern")
    })
}

/// Extract every file path touched by a unified diff.
///
/// Covers modification (`---`/`+++`), addition and deletion (the other side
/// is `/dev/null`), renames (`rename from`/`rename to`, both names count),
/// and binary-file markers. Deduplicated, order of first appearance.
pub fn touched_files(diff: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    let mut push = |raw: &str| {
        if let Some(path) = clean_path(raw) {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    };

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("--- ") {
            push(rest);
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            push(rest);
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            push(rest);
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            push(rest);
        } else if let Some(caps) = binary_files_re().captures(line) {
            push(&caps[1]);
            push(&caps[2]);
        }
    }

    files
}

/// Strip the `a/`/`b/` prefix and any timestamp suffix; drop `/dev/null`.
fn clean_path(raw: &str) -> Option<String> {
    let mut path = raw.trim();
    // Timestamp suffix after a tab (`--- a/x.py\t2024-01-01 ...`)
    if let Some(tab) = path.find('\t') {
        path = &path[..tab];
    }
    if path == NULL_DEVICE {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// A compiled allow-list.
pub struct GlobSet {
    regexes: Vec<Regex>,
}

impl GlobSet {
    /// Compile glob patterns. Patterns that fail to compile are dropped.
    pub fn compile(globs: &[String]) -> Self {
        let regexes = globs
            .iter()
            .filter_map(|glob| match Regex::new(&glob_to_regex(glob)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(glob, error = %e, "dropping uncompilable allow-list pattern");
                    None
                }
            })
            .collect();
        Self { regexes }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regexes.iter().any(|re| re.is_match(path))
    }
}

/// Translate one glob into an anchored regex.
///
/// `**` matches across path separators (`**/` also matches zero
/// directories), `*` matches within one segment, `?` matches a single
/// non-separator character, everything else is literal.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');

    let bytes = glob.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &glob[i..];
        if rest.starts_with("**/") {
            out.push_str("(?:.*/)?");
            i += 3;
        } else if rest.starts_with("**") {
            out.push_str(".*");
            i += 2;
        } else if rest.starts_with('*') {
            out.push_str("[^/]*");
            i += 1;
        } else if rest.starts_with('?') {
            out.push_str("[^/]");
            i += 1;
        } else if let Some(ch) = rest.chars().next() {
            out.push_str(&regex::escape(&ch.to_string()));
            i += ch.len_utf8();
        } else {
            break;
        }
    }

    out.push('$');
    out
}
