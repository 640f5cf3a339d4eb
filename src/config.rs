//! Engine configuration
//!
//! Thresholds the engine's decision rules depend on. These were observed
//! constants in earlier iterations of the tool; they are configuration here
//! so operators can tune them without a rebuild.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_gap_threshold() -> f64 {
    0.15
}

fn default_max_attempts() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_cooldown_secs() -> u64 {
    2
}

fn default_strategy_count() -> usize {
    3
}

fn default_generator_model() -> String {
    "anthropic/claude-sonnet-4.5".to_string()
}

fn default_reviewer_model() -> String {
    "openai/gpt-oss-120b".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Below this top1-top2 confidence gap the diagnosis is flagged ambiguous.
    #[serde(default = "default_gap_threshold")]
    pub ambiguity_gap_threshold: f64,

    /// Number of distinct WEAK abstain signals that together force abstention.
    /// `None` (the default) means weak signals never abstain on their own;
    /// only STRONG signals do.
    #[serde(default)]
    pub weak_signal_quorum: Option<usize>,

    /// Total attempts per generator call (first try + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Hard timeout per generator call.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Cooldown before retrying after a rate-limit signal, when the
    /// response carries no retry-after hint.
    #[serde(default = "default_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,

    /// How many candidate strategies to request per run.
    #[serde(default = "default_strategy_count")]
    pub strategy_count: usize,

    /// Model used for candidate strategy generation.
    #[serde(default = "default_generator_model")]
    pub generator_model: String,

    /// Model used for the independent quality review. A different model than
    /// the generator so the reviewer does not share the generator's blind
    /// spots.
    #[serde(default = "default_reviewer_model")]
    pub reviewer_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ambiguity_gap_threshold: default_gap_threshold(),
            weak_signal_quorum: None,
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_timeout_secs(),
            rate_limit_cooldown_secs: default_cooldown_secs(),
            strategy_count: default_strategy_count(),
            generator_model: default_generator_model(),
            reviewer_model: default_reviewer_model(),
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file, or return defaults if it doesn't exist.
    ///
    /// A corrupt file is an error rather than silently ignored: a truncated
    /// config could quietly loosen the safety thresholds.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid engine config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Save config as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
