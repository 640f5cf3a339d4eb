//! Run artifact persistence
//!
//! One directory per run holding the patch index, per-candidate raw diffs,
//! quality reviews, raw model responses, and the abstain report. These files
//! are the audit contract: every verdict must be traceable to a specific
//! reason and a specific raw response. Writes are best-effort; a failed
//! write is logged by the caller and never fails the run.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::abstain::AbstainReport;
use crate::strategy::{PatchIndex, QualityVerdict};

pub struct ArtifactStore {
    run_id: Uuid,
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create the run directory `<root>/run-<run_id>`.
    pub fn create(root: &Path, run_id: Uuid) -> anyhow::Result<Self> {
        let dir = root.join(format!("run-{}", run_id));
        fs::create_dir_all(&dir)?;
        Ok(Self { run_id, dir })
    }

    /// The run this store belongs to; the patch index is tagged with it so
    /// directory and index always agree.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_index(&self, index: &PatchIndex) -> anyhow::Result<()> {
        self.write_json("index.json", index)
    }

    pub fn write_abstain(&self, report: &AbstainReport) -> anyhow::Result<()> {
        self.write_json("abstain.json", report)
    }

    pub fn write_raw_strategies(&self, raw: &str) -> anyhow::Result<()> {
        self.write_text("raw-strategies.txt", raw)
    }

    /// Candidate-qualified names keep concurrent evaluations from ever
    /// writing the same path.
    pub fn write_candidate_diff(&self, strategy_id: &str, diff: &str) -> anyhow::Result<()> {
        self.write_text(&format!("candidate-{}.diff", sanitize(strategy_id)), diff)
    }

    pub fn write_quality_review(
        &self,
        strategy_id: &str,
        verdict: &QualityVerdict,
    ) -> anyhow::Result<()> {
        self.write_json(&format!("review-{}.json", sanitize(strategy_id)), verdict)
    }

    /// The raw model response, byte-for-byte, even (especially) when it was
    /// malformed.
    pub fn write_raw_review(&self, strategy_id: &str, raw: &str) -> anyhow::Result<()> {
        self.write_text(&format!("raw-review-{}.txt", sanitize(strategy_id)), raw)
    }

    fn write_text(&self, name: &str, content: &str) -> anyhow::Result<()> {
        fs::write(self.dir.join(name), content)?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(self.dir.join(name), content)?;
        Ok(())
    }
}

/// Strategy ids come from the model; keep them from escaping the run
/// directory or producing unusable filenames.
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
