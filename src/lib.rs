//! patchguard library crate
//!
//! The safety-gated patch-generation engine of a CI self-healing tool.
//! Untrusted model output enters through `client::PatchModel`; everything
//! that leaves via `engine::PatchEngine::run` has passed the deterministic
//! scope and pattern guards plus a validated model review, or carries an
//! explicit NO_GO with traceable reasons.

pub mod abstain;
pub mod artifacts;
pub mod client;
pub mod config;
pub mod diagnosis;
pub mod engine;
pub mod error;
pub mod guard;
pub mod prompts;
pub mod resolve;
pub mod review;
pub mod scope;
pub mod spectrum;
pub mod strategy;

pub use abstain::AbstainReport;
pub use artifacts::ArtifactStore;
pub use client::{GeneratorClient, PatchModel};
pub use config::EngineConfig;
pub use diagnosis::{Diagnosis, FailureContext, Hypothesis, PatchPlan};
pub use engine::PatchEngine;
pub use error::EvalError;
pub use strategy::{
    PatchIndex, PatchIndexResult, QualityVerdict, RiskLevel, RunOutcome, Strategy, Verdict,
};
