//! Run orchestration
//!
//! The guard-and-spectrum pipeline: abstain classification first (terminal
//! when it fires), then confidence resolution, one strategy generation call,
//! and an independent concurrent evaluation of every candidate. All
//! per-candidate failures are contained; the engine itself never returns an
//! error for a candidate going wrong.

use futures::future::join_all;

use crate::abstain;
use crate::artifacts::ArtifactStore;
use crate::client::PatchModel;
use crate::config::EngineConfig;
use crate::diagnosis::{Diagnosis, FailureContext, PatchPlan};
use crate::prompts;
use crate::resolve;
use crate::review;
use crate::scope;
use crate::spectrum::{self, CandidateEvaluation};
use crate::strategy::{parse_strategies, PatchIndex, RunOutcome, Strategy};
use crate::guard;

pub struct PatchEngine {
    config: EngineConfig,
}

impl PatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one full run.
    ///
    /// The model handle is borrowed: the engine never owns, constructs, or
    /// shuts down the generator client. The diagnosis is normalized in place
    /// before any generation.
    pub async fn run<M: PatchModel + Sync>(
        &self,
        model: &M,
        diagnosis: &mut Diagnosis,
        plan: &PatchPlan,
        context: &FailureContext,
        artifacts: &ArtifactStore,
    ) -> RunOutcome {
        let run_id = artifacts.run_id();

        // Abstention is terminal: nothing downstream runs, no model calls.
        if let Some(report) = abstain::classify(context, &self.config) {
            tracing::info!(
                classification = %report.classification,
                signals = report.matched_signals.len(),
                "abstaining, failure judged not patchable"
            );
            persist(artifacts.write_abstain(&report), "abstain report");
            return RunOutcome::Abstained(report);
        }

        resolve::resolve_confidence(diagnosis, context, &self.config);
        if diagnosis.low_confidence_ambiguity {
            tracing::info!(
                gap = diagnosis.confidence_gap,
                "diagnosis is ambiguous, guidance attached"
            );
        }

        let strategies = match self.generate(model, diagnosis, plan, context, artifacts).await {
            Ok(strategies) => strategies,
            Err(note) => {
                // Fail closed: no candidates, no recommendation.
                tracing::warn!(%note, "strategy generation produced no candidates");
                let index = PatchIndex {
                    run_id,
                    results: Vec::new(),
                    recommended: None,
                    notes: vec![note],
                };
                persist(artifacts.write_index(&index), "patch index");
                return RunOutcome::Index(index);
            }
        };

        // Candidates share only read-only inputs; evaluate them concurrently.
        let evaluations = join_all(
            strategies
                .iter()
                .map(|strategy| self.evaluate_candidate(model, strategy, plan, artifacts)),
        )
        .await;

        let index = spectrum::assemble(run_id, evaluations, Vec::new());
        if index.no_safe_patch() {
            tracing::warn!(run_id = %run_id, "no safe patch available");
        } else {
            tracing::info!(run_id = %run_id, recommended = ?index.recommended, "patch spectrum assembled");
        }
        persist(artifacts.write_index(&index), "patch index");

        RunOutcome::Index(index)
    }

    async fn generate<M: PatchModel>(
        &self,
        model: &M,
        diagnosis: &Diagnosis,
        plan: &PatchPlan,
        context: &FailureContext,
        artifacts: &ArtifactStore,
    ) -> Result<Vec<Strategy>, String> {
        let user =
            prompts::strategy_user_prompt(diagnosis, plan, context, self.config.strategy_count);

        let raw = model
            .generate_strategies(prompts::strategy_system_prompt(), &user)
            .await
            .map_err(|e| format!("Strategy generation failed: {}", e))?;

        persist(artifacts.write_raw_strategies(&raw), "raw strategy response");

        parse_strategies(&raw).map_err(|e| format!("Strategy payload invalid: {}", e))
    }

    /// Evaluate one candidate: scope check, pattern guard, then the model
    /// review only if both deterministic stages passed.
    async fn evaluate_candidate<M: PatchModel>(
        &self,
        model: &M,
        strategy: &Strategy,
        plan: &PatchPlan,
        artifacts: &ArtifactStore,
    ) -> CandidateEvaluation {
        persist(
            artifacts.write_candidate_diff(&strategy.id, &strategy.diff),
            "candidate diff",
        );

        let scope_report = scope::evaluate(&strategy.diff, &plan.allowed_files);
        let scope_violation = scope_report.violation();
        let guard_violation = guard::check(&strategy.diff).err();

        if let Some(v) = &scope_violation {
            tracing::info!(strategy = %strategy.id, reason = %v, "candidate rejected by scope validator");
        }
        if let Some(v) = &guard_violation {
            tracing::info!(strategy = %strategy.id, reason = %v, "candidate rejected by pattern guard");
        }

        // Already rejected deterministically: skip the model review entirely.
        let review = if scope_violation.is_some() || guard_violation.is_some() {
            None
        } else {
            let outcome = review::review_candidate(model, strategy, plan).await;
            persist(
                artifacts.write_raw_review(&strategy.id, &outcome.raw_response),
                "raw review response",
            );
            persist(
                artifacts.write_quality_review(&strategy.id, &outcome.verdict),
                "quality review",
            );
            if let Some(failure) = &outcome.failure {
                tracing::info!(strategy = %strategy.id, reason = %failure, "review converted to NO_GO");
            }
            Some(outcome.verdict)
        };

        CandidateEvaluation {
            strategy_id: strategy.id.clone(),
            touched_files: scope_report.touched_files,
            scope_violation,
            guard_violation,
            review,
        }
    }
}

/// Artifact persistence is best-effort auditability, not correctness.
fn persist(result: anyhow::Result<()>, what: &str) {
    if let Err(e) = result {
        tracing::warn!(what, error = %e, "failed to persist artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Hypothesis;
    use crate::strategy::Verdict;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Mock generator: canned strategy payload, per-candidate canned reviews.
    struct MockModel {
        strategies_response: String,
        reviews: Mutex<std::collections::HashMap<String, String>>,
        generate_calls: AtomicUsize,
        review_calls: AtomicUsize,
    }

    impl MockModel {
        fn new(strategies_response: &str) -> Self {
            Self {
                strategies_response: strategies_response.to_string(),
                reviews: Mutex::new(std::collections::HashMap::new()),
                generate_calls: AtomicUsize::new(0),
                review_calls: AtomicUsize::new(0),
            }
        }

        fn with_review(self, strategy_id: &str, response: &str) -> Self {
            self.reviews
                .lock()
                .unwrap()
                .insert(strategy_id.to_string(), response.to_string());
            self
        }
    }

    impl PatchModel for MockModel {
        fn generate_strategies(
            &self,
            _system: &str,
            _user: &str,
        ) -> impl Future<Output = anyhow::Result<String>> + Send {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            let response = self.strategies_response.clone();
            async move { Ok(response) }
        }

        fn review_candidate(
            &self,
            _system: &str,
            user: &str,
        ) -> impl Future<Output = anyhow::Result<String>> + Send {
            self.review_calls.fetch_add(1, Ordering::SeqCst);
            // The review prompt names the candidate; route the canned answer.
            let reviews = self.reviews.lock().unwrap();
            let response = reviews
                .iter()
                .find(|(id, _)| user.contains(&format!("'{}'", id)))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| "no canned review".to_string());
            async move { Ok(response) }
        }
    }

    fn strategy_json(id: &str, risk: &str, diff: &str) -> String {
        serde_json::json!({
            "id": id, "label": id, "risk_level": risk, "summary": "s", "diff": diff
        })
        .to_string()
    }

    fn spectrum_response(entries: &[String]) -> String {
        format!(r#"{{"strategies": [{}]}}"#, entries.join(","))
    }

    fn go_review() -> &'static str {
        r#"{"verdict": "GO", "slop_score": 0.1, "risk_level": "low", "reasons": ["clean"]}"#
    }

    fn clean_diff(path: &str) -> String {
        format!("--- a/{p}\n+++ b/{p}\n@@ -1 +1 @@\n-old\n+new\n", p = path)
    }

    fn diagnosis() -> Diagnosis {
        Diagnosis::new(vec![
            Hypothesis::new("h1", "test-flake", 0.8),
            Hypothesis::new("h2", "build", 0.1),
        ])
    }

    fn engine() -> PatchEngine {
        PatchEngine::new(EngineConfig::default())
    }

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(root.path(), Uuid::new_v4()).unwrap();
        (root, store)
    }

    #[tokio::test]
    async fn test_abstain_makes_zero_model_calls() {
        let model = MockModel::new("unused");
        let (_root, artifacts) = store();
        let context = FailureContext {
            log_excerpt: "remote: 403 Forbidden".to_string(),
            ..Default::default()
        };

        let outcome = engine()
            .run(&model, &mut diagnosis(), &PatchPlan::new("fix"), &context, &artifacts)
            .await;

        assert!(matches!(outcome, RunOutcome::Abstained(_)));
        assert_eq!(model.generate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(model.review_calls.load(Ordering::SeqCst), 0);
        assert!(artifacts.dir().join("abstain.json").exists());
    }

    #[tokio::test]
    async fn test_weak_signal_alone_generates_exactly_once() {
        let response = spectrum_response(&[strategy_json(
            "conservative",
            "low",
            &clean_diff("src/app.py"),
        )]);
        let model = MockModel::new(&response).with_review("conservative", go_review());
        let (_root, artifacts) = store();
        let context = FailureContext {
            log_excerpt: "sh: ./ci.sh: Permission denied".to_string(),
            ..Default::default()
        };

        let outcome = engine()
            .run(&model, &mut diagnosis(), &PatchPlan::new("fix"), &context, &artifacts)
            .await;

        assert!(matches!(outcome, RunOutcome::Index(_)));
        assert_eq!(model.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_diagnosis_normalized_before_generation() {
        let response =
            spectrum_response(&[strategy_json("c", "low", &clean_diff("src/app.py"))]);
        let model = MockModel::new(&response).with_review("c", go_review());
        let (_root, artifacts) = store();

        let mut d = diagnosis();
        d.selected_hypothesis_id = Some("h2".to_string());
        engine()
            .run(&model, &mut d, &PatchPlan::new("fix"), &FailureContext::default(), &artifacts)
            .await;

        assert_eq!(d.selected_hypothesis_id.as_deref(), Some("h1"));
        assert!(!d.low_confidence_ambiguity);
    }

    #[tokio::test]
    async fn test_spectrum_with_mixed_candidates_has_one_go() {
        // A: bypass pattern in the diff; B: clean; C: out-of-scope edit
        let bad_diff = "--- a/ci.sh\n+++ b/ci.sh\n@@ -1 +1 @@\n-run tests\n+run tests || true\n";
        let out_of_scope = clean_diff("infra/secrets.tf");
        let response = spectrum_response(&[
            strategy_json("a", "low", bad_diff),
            strategy_json("b", "medium", &clean_diff("src/app.py")),
            strategy_json("c", "low", &out_of_scope),
        ]);
        let model = MockModel::new(&response).with_review("b", go_review());
        let (_root, artifacts) = store();
        let plan = PatchPlan::new("fix").with_allowed_files(vec![
            "src/**".to_string(),
            "ci.sh".to_string(),
        ]);

        let outcome = engine()
            .run(&model, &mut diagnosis(), &plan, &FailureContext::default(), &artifacts)
            .await;

        let index = match outcome {
            RunOutcome::Index(index) => index,
            RunOutcome::Abstained(_) => panic!("should not abstain"),
        };
        let go: Vec<_> = index.results.iter().filter(|r| r.verdict.is_go()).collect();
        assert_eq!(go.len(), 1);
        assert_eq!(go[0].strategy_id, "b");
        assert_eq!(index.recommended.as_deref(), Some("b"));

        // Only the clean candidate reached the model reviewer
        assert_eq!(model.review_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_candidates_skip_review_calls() {
        let bad_diff = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n+# TODO: finish\n";
        let response = spectrum_response(&[strategy_json("a", "low", bad_diff)]);
        let model = MockModel::new(&response);
        let (_root, artifacts) = store();

        engine()
            .run(
                &model,
                &mut diagnosis(),
                &PatchPlan::new("fix"),
                &FailureContext::default(),
                &artifacts,
            )
            .await;

        assert_eq!(model.review_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_review_contained_and_persisted() {
        let response =
            spectrum_response(&[strategy_json("b", "low", &clean_diff("src/app.py"))]);
        let model = MockModel::new(&response).with_review("b", "sure, GO I guess???");
        let (_root, artifacts) = store();

        let outcome = engine()
            .run(
                &model,
                &mut diagnosis(),
                &PatchPlan::new("fix"),
                &FailureContext::default(),
                &artifacts,
            )
            .await;

        let index = match outcome {
            RunOutcome::Index(index) => index,
            RunOutcome::Abstained(_) => panic!("should not abstain"),
        };
        assert_eq!(index.results[0].verdict, Verdict::NoGo);
        assert_eq!(index.results[0].slop_score, 1.0);
        assert!(index.no_safe_patch());

        // Raw malformed response persisted unmodified
        let raw =
            std::fs::read_to_string(artifacts.dir().join("raw-review-b.txt")).unwrap();
        assert_eq!(raw, "sure, GO I guess???");
    }

    #[tokio::test]
    async fn test_generation_failure_fails_closed() {
        struct FailingModel;
        impl PatchModel for FailingModel {
            fn generate_strategies(
                &self,
                _system: &str,
                _user: &str,
            ) -> impl Future<Output = anyhow::Result<String>> + Send {
                async { Err(anyhow::anyhow!("rate limited after 2 attempts")) }
            }
            fn review_candidate(
                &self,
                _system: &str,
                _user: &str,
            ) -> impl Future<Output = anyhow::Result<String>> + Send {
                async { Ok(String::new()) }
            }
        }

        let (_root, artifacts) = store();
        let outcome = engine()
            .run(
                &FailingModel,
                &mut diagnosis(),
                &PatchPlan::new("fix"),
                &FailureContext::default(),
                &artifacts,
            )
            .await;

        let index = match outcome {
            RunOutcome::Index(index) => index,
            RunOutcome::Abstained(_) => panic!("should not abstain"),
        };
        assert!(index.results.is_empty());
        assert!(index.no_safe_patch());
        assert!(index.notes[0].contains("Strategy generation failed"));
    }

    #[tokio::test]
    async fn test_artifacts_written_per_candidate() {
        let response = spectrum_response(&[
            strategy_json("conservative", "low", &clean_diff("src/a.py")),
            strategy_json("aggressive", "high", &clean_diff("src/b.py")),
        ]);
        let model = MockModel::new(&response)
            .with_review("conservative", go_review())
            .with_review("aggressive", go_review());
        let (_root, artifacts) = store();

        engine()
            .run(
                &model,
                &mut diagnosis(),
                &PatchPlan::new("fix"),
                &FailureContext::default(),
                &artifacts,
            )
            .await;

        for name in [
            "index.json",
            "raw-strategies.txt",
            "candidate-conservative.diff",
            "candidate-aggressive.diff",
            "review-conservative.json",
            "raw-review-aggressive.txt",
        ] {
            assert!(artifacts.dir().join(name).exists(), "missing artifact {}", name);
        }
    }
}
