use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Semaphore;

use config_rs::MapConfigSource;

use crate::model::{
    ChangeType, CheckStatus, CodeChange, ErrorInfo, FileChange, HealContext, IssueClassification,
    PatchProposal, Recommendation, RiskLevel, RuntimeFaultRule, Severity, TestType, Verdict,
};
use crate::{
    CONTRACT_DEPENDENCY, ContractPatchProposer, HealStage, HeuristicIssueClassifier,
    IssueClassifier, Narrator, PatchCritic, PatchProposer, PatchValidator, Result, SelfHealEngine,
    SelfHealError, SelfHealSettings, TestSynthesizer,
};

fn make_null_error() -> ErrorInfo {
    ErrorInfo::new("TypeError", "Cannot read property 'x' of undefined").with_location("a.ts", 10)
}

fn mock_config() -> MapConfigSource {
    MapConfigSource::new().with("SELF_HEAL_USE_MOCK_LLM", "true")
}

fn make_engine() -> SelfHealEngine {
    SelfHealEngine::new(Arc::new(mock_config())).expect("engine construction should succeed")
}

fn fixed_ctx() -> HealContext {
    HealContext {
        trace_id: "trace-fixed".to_string(),
        started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

async fn classify(error: &ErrorInfo) -> IssueClassification {
    HeuristicIssueClassifier
        .classify(&fixed_ctx(), error)
        .await
        .expect("classification should succeed")
}

fn change(replacement: &str) -> CodeChange {
    CodeChange {
        start_line: 1,
        end_line: 5,
        original: String::new(),
        replacement: replacement.to_string(),
        rationale: "test change".to_string(),
    }
}

fn proposal_with(files: Vec<FileChange>, new_dependencies: Vec<String>) -> PatchProposal {
    PatchProposal {
        id: "patch-test".to_string(),
        trace_id: "trace-fixed".to_string(),
        description: "test proposal".to_string(),
        files,
        new_dependencies,
        risk_assessment: RiskLevel::Low,
        rollback_plan: "revert".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Classifier

#[tokio::test]
async fn classifier_matches_null_rule_with_default_span() {
    let classification = classify(&make_null_error()).await;

    assert_eq!(classification.category, "runtime-error");
    assert_eq!(classification.subcategory, "null-dereference");
    assert_eq!(classification.confidence, 90);

    let analysis = classification
        .runtime_error_analysis
        .expect("null rule should attach an analysis");
    assert_eq!(analysis.rule, RuntimeFaultRule::Null);
    assert_eq!(analysis.target.file, "a.ts");
    assert_eq!(analysis.target.start_line, 10);
    assert_eq!(analysis.target.end_line, 15);
    assert!(!analysis.suggested_strategies.is_empty());
}

#[tokio::test]
async fn classifier_is_idempotent_for_rule_matches() {
    let error = make_null_error();
    let first = classify(&error).await;
    let second = classify(&error).await;

    assert_eq!(first.category, second.category);
    assert_eq!(first.subcategory, second.subcategory);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(
        first.runtime_error_analysis.map(|a| a.rule),
        second.runtime_error_analysis.map(|a| a.rule)
    );
}

#[tokio::test]
async fn classifier_covers_the_closed_rule_set() {
    let cases = vec![
        ("Error", "division by zero in ratio()", RuntimeFaultRule::DivZero),
        ("RangeError", "index out of bounds: 12", RuntimeFaultRule::Oob),
        ("Error", "result was NaN after scaling", RuntimeFaultRule::Nan),
        ("Error", "entered unreachable code", RuntimeFaultRule::Unreachable),
        ("RuntimeError", "invariant violated", RuntimeFaultRule::Other),
    ];

    for (error_type, message, expected) in cases {
        let classification = classify(&ErrorInfo::new(error_type, message)).await;
        let analysis = classification
            .runtime_error_analysis
            .unwrap_or_else(|| panic!("expected analysis for '{}'", message));
        assert_eq!(analysis.rule, expected, "message: {}", message);
    }
}

#[tokio::test]
async fn classifier_unmatched_error_has_no_analysis() {
    let classification = classify(&ErrorInfo::new("Error", "connection timeout to db")).await;

    assert!(classification.runtime_error_analysis.is_none());
    assert_eq!(classification.category, "network-error");
    assert!(classification.confidence < 60);
}

#[tokio::test]
async fn classifier_collects_components_from_context() {
    let error = make_null_error()
        .with_context("component", "billing")
        .with_context("unrelated", "noise");
    let classification = classify(&error).await;

    assert!(classification.affected_components.contains(&"a.ts".to_string()));
    assert!(classification.affected_components.contains(&"billing".to_string()));
    assert!(!classification.affected_components.contains(&"noise".to_string()));
}

// ---------------------------------------------------------------------------
// Proposer

#[tokio::test]
async fn proposer_emits_contract_guard_for_rule_match() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;

    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");

    assert_eq!(proposal.files.len(), 1);
    assert_eq!(proposal.files[0].path, "a.ts");
    assert_eq!(proposal.files[0].change_type, ChangeType::Modify);
    assert_eq!(proposal.files[0].changes[0].start_line, 10);
    assert_eq!(proposal.files[0].changes[0].end_line, 15);
    assert!(proposal
        .new_dependencies
        .contains(&CONTRACT_DEPENDENCY.to_string()));
    assert_eq!(proposal.risk_assessment, RiskLevel::Low);
    assert!(proposal.rollback_plan.contains("a.ts"));
}

#[tokio::test]
async fn proposer_risk_follows_high_risk_classification() {
    let ctx = fixed_ctx();
    let error = ErrorInfo::new("Error", "entered unreachable code").with_location("s.ts", 3);
    let classification = classify(&error).await;
    assert_eq!(classification.risk_level, RiskLevel::High);

    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");

    assert_eq!(proposal.risk_assessment, RiskLevel::High);
}

#[tokio::test]
async fn proposer_without_analysis_returns_placeholder() {
    let ctx = fixed_ctx();
    let error = ErrorInfo::new("Error", "connection timeout to db");
    let classification = classify(&error).await;

    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");

    // Empty files means "no actionable patch", not an error.
    assert!(proposal.files.is_empty());
    assert!(proposal.new_dependencies.is_empty());
}

// ---------------------------------------------------------------------------
// Validator

#[tokio::test]
async fn validator_passes_clean_guard_proposal() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;
    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");

    let validation = PatchValidator.validate(&proposal);

    assert_eq!(validation.verdict, Verdict::Pass);
    assert_eq!(validation.recommendation, Recommendation::Approve);
    assert_eq!(validation.risk_level, RiskLevel::Low);
    assert!(validation.critical_issues.is_empty());
    assert!(validation.warnings.is_empty());
    assert_eq!(validation.checklist.security, CheckStatus::Pass);
    assert_eq!(validation.checklist.type_check, CheckStatus::Pass);
}

#[test]
fn validator_flags_unguarded_undefined_sentinel() {
    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("result = undefined;")],
        }],
        vec![],
    );

    let validation = PatchValidator.validate(&proposal);

    assert_eq!(validation.verdict, Verdict::Fail);
    assert_eq!(validation.recommendation, Recommendation::Reject);
    assert_eq!(validation.risk_level, RiskLevel::High);
    assert_eq!(validation.critical_issues.len(), 1);
    assert_eq!(validation.critical_issues[0].issue_type, "type-error");
    assert_eq!(validation.checklist.type_check, CheckStatus::Fail);
}

#[test]
fn validator_allows_typeof_guarded_sentinel() {
    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("if (typeof value !== \"undefined\") { use(value); }")],
        }],
        vec![],
    );

    let validation = PatchValidator.validate(&proposal);
    assert_eq!(validation.verdict, Verdict::Pass);
}

#[test]
fn validator_treats_dynamic_evaluation_as_critical() {
    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("eval(payload);")],
        }],
        vec![],
    );

    let validation = PatchValidator.validate(&proposal);

    assert_eq!(validation.verdict, Verdict::Fail);
    assert_eq!(validation.risk_level, RiskLevel::Critical);
    assert_eq!(validation.recommendation, Recommendation::Reject);
    assert_eq!(validation.checklist.security, CheckStatus::Fail);
}

#[test]
fn validator_warns_on_file_deletion() {
    let proposal = proposal_with(
        vec![FileChange {
            path: "legacy.ts".to_string(),
            change_type: ChangeType::Delete,
            changes: vec![],
        }],
        vec![],
    );

    let validation = PatchValidator.validate(&proposal);

    assert_eq!(validation.verdict, Verdict::Warn);
    assert_eq!(validation.recommendation, Recommendation::ApproveWithChanges);
    assert_eq!(validation.warnings.len(), 1);
    assert_eq!(validation.warnings[0].issue_type, "compatibility");
    assert_eq!(validation.checklist.lint, CheckStatus::Fail);
}

#[test]
fn validator_reports_nested_loops_as_informational() {
    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("for (const a of xs) { for (const b of ys) { pair(a, b); } }")],
        }],
        vec![],
    );

    let validation = PatchValidator.validate(&proposal);

    assert_eq!(validation.verdict, Verdict::Pass);
    assert_eq!(validation.info.len(), 1);
    assert_eq!(validation.info[0].issue_type, "performance");
    assert_eq!(validation.checklist.performance, CheckStatus::Fail);
}

#[test]
fn validator_is_monotonic_under_added_critical_issues() {
    let base = proposal_with(
        vec![FileChange {
            path: "legacy.ts".to_string(),
            change_type: ChangeType::Delete,
            changes: vec![],
        }],
        vec![],
    );
    let baseline = PatchValidator.validate(&base);
    assert_eq!(baseline.verdict, Verdict::Warn);

    let mut worse = base.clone();
    worse.files.push(FileChange {
        path: "a.ts".to_string(),
        change_type: ChangeType::Modify,
        changes: vec![change("eval(payload);")],
    });
    let worsened = PatchValidator.validate(&worse);

    // Adding a critical issue can only push the verdict toward FAIL and
    // the recommendation toward REJECT.
    assert_eq!(worsened.verdict, Verdict::Fail);
    assert_eq!(worsened.recommendation, Recommendation::Reject);
}

// ---------------------------------------------------------------------------
// Critic

#[tokio::test]
async fn critic_flags_guard_after_early_return() {
    let error = make_null_error();
    let classification = classify(&error).await;

    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change(
                "return cached;\nrequires(value != null, \"value must be non-null\");",
            )],
        }],
        vec![CONTRACT_DEPENDENCY.to_string()],
    );
    let validation = PatchValidator.validate(&proposal);

    let critique = PatchCritic.critique(&proposal, &classification, &validation);

    assert_eq!(critique.risks.len(), 1);
    assert!(critique.risks[0].contains("contract placement"));
    assert!(critique.should_revise);
}

#[tokio::test]
async fn critic_flags_missing_infinity_check_for_nan() {
    let error = ErrorInfo::new("Error", "result was NaN after scaling").with_location("m.ts", 4);
    let classification = classify(&error).await;

    let proposal = proposal_with(
        vec![FileChange {
            path: "m.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("requires(!isNaN(value), \"value must be a number\");")],
        }],
        vec![CONTRACT_DEPENDENCY.to_string()],
    );
    let validation = PatchValidator.validate(&proposal);

    let critique = PatchCritic.critique(&proposal, &classification, &validation);

    assert!(critique.risks.iter().any(|r| r.contains("Infinity")));
    assert!(critique.should_revise);
}

#[tokio::test]
async fn critic_accepts_complete_guard_snippets() {
    let ctx = fixed_ctx();
    for message in [
        "Cannot read property 'x' of undefined",
        "division by zero in ratio()",
        "result was NaN after scaling",
    ] {
        let error = ErrorInfo::new("Error", message).with_location("a.ts", 10);
        let classification = classify(&error).await;
        let proposal = ContractPatchProposer
            .propose(&ctx, &error, &classification)
            .await
            .expect("proposal should succeed");
        let validation = PatchValidator.validate(&proposal);

        let critique = PatchCritic.critique(&proposal, &classification, &validation);
        assert!(
            critique.risks.is_empty(),
            "generated guard for '{}' should not raise risks: {:?}",
            message,
            critique.risks
        );
        assert!(!critique.should_revise);
    }
}

#[tokio::test]
async fn critic_skips_rule_checks_without_guard_dependency() {
    let error = make_null_error();
    let classification = classify(&error).await;

    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("return cached;\nrequires(value != null, \"x\");")],
        }],
        vec![],
    );
    let validation = PatchValidator.validate(&proposal);

    let critique = PatchCritic.critique(&proposal, &classification, &validation);
    assert!(critique.risks.is_empty());
}

#[tokio::test]
async fn critic_requests_revision_after_warn_with_many_warnings() {
    let error = make_null_error();
    let classification = classify(&error).await;

    let deletions = (0..3)
        .map(|i| FileChange {
            path: format!("old_{}.ts", i),
            change_type: ChangeType::Delete,
            changes: vec![],
        })
        .collect();
    let proposal = proposal_with(deletions, vec![]);
    let validation = PatchValidator.validate(&proposal);
    assert_eq!(validation.verdict, Verdict::Warn);
    assert_eq!(validation.warnings.len(), 3);

    let critique = PatchCritic.critique(&proposal, &classification, &validation);
    assert!(critique.risks.is_empty());
    assert!(critique.should_revise);
}

// ---------------------------------------------------------------------------
// Synthesizer

#[tokio::test]
async fn synthesizer_emits_regression_unit_and_integration_stubs() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;
    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");

    let suite = TestSynthesizer.synthesize(&ctx, &proposal, &classification);

    assert_eq!(suite.files.len(), 3);
    assert_eq!(suite.files[0].test_type, TestType::Regression);
    assert_eq!(suite.files[0].path, "tests/regression/null-1700000000.test.ts");
    assert_eq!(suite.files[1].test_type, TestType::Unit);
    assert_eq!(suite.files[1].path, "tests/unit/a.test.ts");
    assert_eq!(suite.files[2].test_type, TestType::Integration);

    // Base coverage plus two points per artifact.
    assert_eq!(suite.coverage.statement, 76);
    assert_eq!(suite.coverage.branch, 66);
    assert_eq!(suite.coverage.function, 86);
    assert_eq!(suite.coverage.line, 81);
}

#[tokio::test]
async fn synthesizer_handles_empty_proposals() {
    let ctx = fixed_ctx();
    let error = ErrorInfo::new("Error", "connection timeout to db");
    let classification = classify(&error).await;
    let proposal = proposal_with(vec![], vec![]);

    let suite = TestSynthesizer.synthesize(&ctx, &proposal, &classification);

    assert!(suite.files.is_empty());
    assert_eq!(suite.coverage.statement, 70);
    assert_eq!(suite.coverage.branch, 60);
    assert_eq!(suite.coverage.function, 80);
    assert_eq!(suite.coverage.line, 75);
}

#[tokio::test]
async fn synthesizer_coverage_is_capped() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;

    let files = (0..12)
        .map(|i| FileChange {
            path: format!("mod_{}.ts", i),
            change_type: ChangeType::Modify,
            changes: vec![change("guarded();")],
        })
        .collect();
    let proposal = proposal_with(files, vec![]);

    let suite = TestSynthesizer.synthesize(&ctx, &proposal, &classification);

    // 12 unit + 1 regression + 1 integration artifacts; bump saturates.
    assert_eq!(suite.files.len(), 14);
    assert_eq!(suite.coverage.statement, 90);
    assert_eq!(suite.coverage.branch, 80);
    assert_eq!(suite.coverage.function, 100);
    assert_eq!(suite.coverage.line, 95);
}

// ---------------------------------------------------------------------------
// Narrator

#[tokio::test]
async fn narrator_renders_rule_template_with_fingerprint() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;
    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");
    let validation = PatchValidator.validate(&proposal);
    let critique = PatchCritic.critique(&proposal, &classification, &validation);
    let suite = TestSynthesizer.synthesize(&ctx, &proposal, &classification);

    let narrative = Narrator.narrate(
        &ctx,
        &classification,
        &proposal,
        &validation,
        &critique,
        Some(&suite),
    );

    assert!(narrative.pr_body.contains("Self-heal: null"));
    assert!(narrative.pr_body.contains("null-1700000000"));
    assert!(narrative.pr_body.contains("`a.ts` lines 10-15"));
    assert!(narrative.pr_body.contains("| critical | 0 | 0 |"));
    assert!(narrative.commit_message.starts_with("fix: guard null fault in a.ts"));
    // Nothing to review on a clean pass.
    assert!(!narrative.pr_body.contains("Review Notes"));
}

#[tokio::test]
async fn narrator_falls_back_to_generic_template() {
    let ctx = fixed_ctx();
    let error = ErrorInfo::new("Error", "connection timeout to db");
    let classification = classify(&error).await;
    let proposal = ContractPatchProposer
        .propose(&ctx, &error, &classification)
        .await
        .expect("proposal should succeed");
    let validation = PatchValidator.validate(&proposal);
    let critique = PatchCritic.critique(&proposal, &classification, &validation);

    let narrative = Narrator.narrate(&ctx, &classification, &proposal, &validation, &critique, None);

    assert!(narrative.commit_message.starts_with("triage:"));
    assert!(narrative.pr_body.contains("Automated triage"));
    assert!(!narrative.pr_body.contains("Self-heal:"));
}

#[tokio::test]
async fn narrator_appends_review_notes_when_critique_has_findings() {
    let ctx = fixed_ctx();
    let error = make_null_error();
    let classification = classify(&error).await;
    let proposal = proposal_with(
        vec![FileChange {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modify,
            changes: vec![change("return cached;\nrequires(value != null, \"x\");")],
        }],
        vec![CONTRACT_DEPENDENCY.to_string()],
    );
    let validation = PatchValidator.validate(&proposal);
    let critique = PatchCritic.critique(&proposal, &classification, &validation);
    assert!(!critique.risks.is_empty());

    let narrative = Narrator.narrate(&ctx, &classification, &proposal, &validation, &critique, None);

    assert!(narrative.pr_body.contains("Review Notes"));
    assert!(narrative.pr_body.contains("contract placement"));
}

// ---------------------------------------------------------------------------
// Settings

#[test]
fn settings_defaults_are_valid() {
    let settings = SelfHealSettings::from_config(&MapConfigSource::new())
        .expect("default settings should construct");

    assert!(!settings.auto_apply);
    assert_eq!(settings.confidence_threshold, 0.7);
    assert_eq!(settings.max_retries, 3);
    assert!(settings.generate_tests);
    assert!(!settings.use_mock_llm);
}

#[test]
fn settings_reject_out_of_range_threshold() {
    let config = MapConfigSource::new().with("SELF_HEAL_CONFIDENCE_THRESHOLD", "1.5");
    assert!(matches!(
        SelfHealSettings::from_config(&config),
        Err(SelfHealError::Config(_))
    ));

    let config = MapConfigSource::new().with("SELF_HEAL_CONFIDENCE_THRESHOLD", "not-a-number");
    assert!(matches!(
        SelfHealSettings::from_config(&config),
        Err(SelfHealError::Config(_))
    ));
}

#[test]
fn settings_reject_zero_retries() {
    let config = MapConfigSource::new().with("SELF_HEAL_MAX_RETRIES", "0");
    assert!(matches!(
        SelfHealSettings::from_config(&config),
        Err(SelfHealError::Config(_))
    ));
}

// ---------------------------------------------------------------------------
// Engine

#[tokio::test]
async fn heal_end_to_end_null_scenario() {
    let engine = make_engine();
    let result = engine
        .heal(make_null_error())
        .await
        .expect("heal should return a result");

    assert!(result.success);
    assert!(result.error.is_none());

    let analysis = result
        .classification
        .runtime_error_analysis
        .as_ref()
        .expect("analysis expected");
    assert_eq!(analysis.rule, RuntimeFaultRule::Null);
    assert_eq!(analysis.target.start_line, 10);
    assert_eq!(analysis.target.end_line, 15);

    let proposal = result.proposal.as_ref().expect("proposal expected");
    assert_eq!(proposal.files.len(), 1);
    assert_eq!(proposal.files[0].path, "a.ts");
    assert!(proposal
        .new_dependencies
        .contains(&CONTRACT_DEPENDENCY.to_string()));

    let validation = result.validation.as_ref().expect("validation expected");
    assert_eq!(validation.verdict, Verdict::Pass);
    assert_eq!(validation.recommendation, Recommendation::Approve);

    let critique = result.critique.as_ref().expect("critique expected");
    assert!(critique.risks.is_empty());

    assert!(result.test_suite.is_some());
    assert!(
        result
            .pr_body
            .as_ref()
            .expect("pr body expected")
            .contains("Self-heal: null")
    );

    // Confidence 90 weighted by a PASS verdict.
    assert_eq!(result.metadata.confidence, 90);
    assert!(result.metadata.automated);
    assert!(result.metadata.duration_ms >= 0);
    assert!(result.metadata.end_time >= result.metadata.start_time);
}

#[tokio::test]
async fn heal_propagates_one_trace_id_through_all_stages() {
    let engine = make_engine();
    let result = engine
        .heal(make_null_error())
        .await
        .expect("heal should return a result");

    let trace_id = &result.classification.trace_id;
    assert!(!trace_id.is_empty());
    assert_eq!(&result.proposal.as_ref().unwrap().trace_id, trace_id);
    assert_eq!(&result.validation.as_ref().unwrap().trace_id, trace_id);
    assert_eq!(&result.critique.as_ref().unwrap().trace_id, trace_id);
    assert_eq!(&result.test_suite.as_ref().unwrap().trace_id, trace_id);
}

#[tokio::test]
async fn heal_confidence_is_weighted_by_verdict() {
    struct DeleteProposer;

    #[async_trait]
    impl PatchProposer for DeleteProposer {
        async fn propose(
            &self,
            ctx: &HealContext,
            _error: &ErrorInfo,
            _classification: &IssueClassification,
        ) -> Result<PatchProposal> {
            Ok(PatchProposal {
                id: "patch-delete".to_string(),
                trace_id: ctx.trace_id.clone(),
                description: "delete a legacy file".to_string(),
                files: vec![FileChange {
                    path: "legacy.ts".to_string(),
                    change_type: ChangeType::Delete,
                    changes: vec![],
                }],
                new_dependencies: vec![],
                risk_assessment: RiskLevel::Low,
                rollback_plan: "restore the file".to_string(),
            })
        }
    }

    let engine = make_engine().with_proposer(Arc::new(DeleteProposer));
    let result = engine
        .heal(make_null_error())
        .await
        .expect("heal should return a result");

    let validation = result.validation.as_ref().expect("validation expected");
    assert_eq!(validation.verdict, Verdict::Warn);

    // 90 * 0.7, rounded.
    assert_eq!(result.metadata.confidence, 63);
    assert!(!result.metadata.automated);
}

#[tokio::test]
async fn heal_skips_test_synthesis_when_disabled() {
    let config = mock_config().with("SELF_HEAL_GENERATE_TESTS", "false");
    let engine = SelfHealEngine::new(Arc::new(config)).expect("engine construction should succeed");

    let result = engine
        .heal(make_null_error())
        .await
        .expect("heal should return a result");

    assert!(result.success);
    assert!(result.test_suite.is_none());
    assert!(
        result
            .pr_body
            .as_ref()
            .expect("pr body expected")
            .contains("Test synthesis disabled")
    );
}

#[tokio::test]
async fn heal_converts_stage_failures_into_failed_results() {
    struct FailingClassifier;

    #[async_trait]
    impl IssueClassifier for FailingClassifier {
        async fn classify(
            &self,
            _ctx: &HealContext,
            _error: &ErrorInfo,
        ) -> Result<IssueClassification> {
            Err(SelfHealError::Stage {
                stage: HealStage::Classifying,
                message: "synthetic stage failure".to_string(),
            })
        }
    }

    let engine = make_engine().with_classifier(Arc::new(FailingClassifier));
    let result = engine
        .heal(make_null_error())
        .await
        .expect("stage failures must still yield a result");

    assert!(!result.success);
    let error = result.error.as_ref().expect("error message expected");
    assert!(error.contains("synthetic stage failure"));

    // The secondary classification also fails, so the fallback applies.
    assert_eq!(result.classification.category, "unknown");
    assert_eq!(result.classification.severity, Severity::High);
    assert_eq!(result.classification.confidence, 0);
    assert_eq!(result.metadata.confidence, 0);
    assert!(!result.metadata.automated);
    assert!(result.proposal.is_none());
    assert!(result.metadata.duration_ms >= 0);
}

#[tokio::test]
async fn heal_rejects_concurrent_invocations() {
    struct StallingClassifier {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl IssueClassifier for StallingClassifier {
        async fn classify(
            &self,
            ctx: &HealContext,
            error: &ErrorInfo,
        ) -> Result<IssueClassification> {
            let _permit = self.gate.acquire().await.expect("gate should stay open");
            HeuristicIssueClassifier.classify(ctx, error).await
        }
    }

    let gate = Arc::new(Semaphore::new(0));
    let engine = Arc::new(make_engine().with_classifier(Arc::new(StallingClassifier {
        gate: gate.clone(),
    })));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.heal(make_null_error()).await })
    };

    // Let the first run park inside its classification stage.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let conflict = engine.heal(make_null_error()).await;
    assert!(matches!(conflict, Err(SelfHealError::AlreadyInProgress)));

    // Release the stalled run and verify the guard is dropped afterwards.
    gate.add_permits(1);
    let result = first
        .await
        .expect("task should join")
        .expect("first heal should complete");
    assert!(result.success);

    gate.add_permits(1);
    let rerun = engine
        .heal(make_null_error())
        .await
        .expect("engine should accept a new run after completion");
    assert!(rerun.success);
}

#[tokio::test]
async fn heal_confidence_is_discounted_on_failed_validation() {
    struct UndefinedProposer;

    #[async_trait]
    impl PatchProposer for UndefinedProposer {
        async fn propose(
            &self,
            ctx: &HealContext,
            _error: &ErrorInfo,
            _classification: &IssueClassification,
        ) -> Result<PatchProposal> {
            Ok(PatchProposal {
                id: "patch-undef".to_string(),
                trace_id: ctx.trace_id.clone(),
                description: "reset the value".to_string(),
                files: vec![FileChange {
                    path: "a.ts".to_string(),
                    change_type: ChangeType::Modify,
                    changes: vec![change("value = undefined;")],
                }],
                new_dependencies: vec![],
                risk_assessment: RiskLevel::Low,
                rollback_plan: "revert".to_string(),
            })
        }
    }

    let engine = make_engine().with_proposer(Arc::new(UndefinedProposer));
    let result = engine
        .heal(make_null_error())
        .await
        .expect("heal should return a result");

    let validation = result.validation.as_ref().expect("validation expected");
    assert_eq!(validation.verdict, Verdict::Fail);
    assert_eq!(validation.recommendation, Recommendation::Reject);

    // 90 * 0.3, rounded; still a successful pipeline run.
    assert!(result.success);
    assert_eq!(result.metadata.confidence, 27);
    assert!(!result.metadata.automated);
    assert!(result.metadata.confidence <= 100);
}
