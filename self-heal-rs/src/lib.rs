 // self-heal-rs/src/lib.rs
 // Library interface for the self-healing remediation engine.
 //
 // Public API is intentionally minimal: callers construct a
 // `SelfHealEngine` and drive it through `heal()`.
 //
 // Design notes:
 // - This crate is a pure library crate; there is no HTTP server or
 //   standalone binary entrypoint.
 // - The pipeline produces structured proposals only; applying or
 //   reverting changes is delegated to an external version-control
 //   collaborator.
 // - At most one remediation is in flight system-wide; concurrent
 //   callers are rejected immediately rather than queued.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::instrument;

use config_rs::{ConfigError, ConfigSource};
use llm_client::{ModelClient, create_model_client};

pub mod model;

mod classifier;
mod critic;
mod narrator;
mod proposer;
mod synthesizer;
mod validator;

#[cfg(test)]
mod tests;

pub use crate::classifier::{HeuristicIssueClassifier, IssueClassifier};
pub use crate::critic::PatchCritic;
pub use crate::narrator::{Narrative, Narrator};
pub use crate::proposer::{CONTRACT_DEPENDENCY, ContractPatchProposer, PatchProposer};
pub use crate::synthesizer::TestSynthesizer;
pub use crate::validator::PatchValidator;

use crate::model::{
    ErrorInfo, HealContext, HealMetadata, IssueClassification, SelfHealResult, Verdict,
};

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, SelfHealError>;

/// Pipeline stages, in execution order, plus the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HealStage {
    Idle,
    Classifying,
    Proposing,
    Validating,
    Critiquing,
    Synthesizing,
    Narrating,
    Done,
    Failed,
}

impl HealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealStage::Idle => "idle",
            HealStage::Classifying => "classifying",
            HealStage::Proposing => "proposing",
            HealStage::Validating => "validating",
            HealStage::Critiquing => "critiquing",
            HealStage::Synthesizing => "synthesizing",
            HealStage::Narrating => "narrating",
            HealStage::Done => "done",
            HealStage::Failed => "failed",
        }
    }
}

impl fmt::Display for HealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level error type for this crate.
///
/// `heal()` itself only ever raises `AlreadyInProgress`; everything else
/// is converted into a failed `SelfHealResult` at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum SelfHealError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("self-heal already in progress; retry after the active run completes")]
    AlreadyInProgress,

    #[error("{stage} stage failed: {message}")]
    Stage { stage: HealStage, message: String },
}

/// Engine configuration, read once at construction.
///
/// Out-of-range threshold or retry values are construction errors, never
/// silently defaulted.
#[derive(Debug, Clone)]
pub struct SelfHealSettings {
    pub auto_apply: bool,
    /// Within [0, 1].
    pub confidence_threshold: f64,
    /// At least 1; bound on provider-level retry attempts.
    pub max_retries: u32,
    pub generate_tests: bool,
    pub use_mock_llm: bool,
    pub default_model: String,
}

impl SelfHealSettings {
    /// Construct settings from the configuration source.
    ///
    /// Reads:
    /// - SELF_HEAL_AUTO_APPLY: truthy flag (default: false)
    /// - SELF_HEAL_CONFIDENCE_THRESHOLD: f64 in [0, 1] (default: 0.7)
    /// - SELF_HEAL_MAX_RETRIES: integer >= 1 (default: 3)
    /// - SELF_HEAL_GENERATE_TESTS: truthy flag (default: true)
    /// - SELF_HEAL_USE_MOCK_LLM: truthy flag (default: false)
    /// - LLM_MODEL: default model name for provider requests
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        let confidence_threshold: f64 =
            config_rs::get_parsed_strict(config, "SELF_HEAL_CONFIDENCE_THRESHOLD", 0.7)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(SelfHealError::Config(ConfigError::Invalid {
                key: "SELF_HEAL_CONFIDENCE_THRESHOLD".to_string(),
                value: confidence_threshold.to_string(),
                reason: "must be within [0, 1]".to_string(),
            }));
        }

        let max_retries: u32 = config_rs::get_parsed_strict(config, "SELF_HEAL_MAX_RETRIES", 3)?;
        if max_retries < 1 {
            return Err(SelfHealError::Config(ConfigError::Invalid {
                key: "SELF_HEAL_MAX_RETRIES".to_string(),
                value: max_retries.to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }

        Ok(Self {
            auto_apply: config_rs::get_flag(config, "SELF_HEAL_AUTO_APPLY", false),
            confidence_threshold,
            max_retries,
            generate_tests: config_rs::get_flag(config, "SELF_HEAL_GENERATE_TESTS", true),
            use_mock_llm: config_rs::get_flag(config, "SELF_HEAL_USE_MOCK_LLM", false),
            default_model: config.get("LLM_MODEL", llm_client::DEFAULT_MODEL),
        })
    }
}

/// Core remediation engine.
///
/// Typical usage (inside an async context):
///
/// ```ignore
/// let engine = SelfHealEngine::new(Arc::new(EnvConfigSource::new()))?;
///
/// let result = engine.heal(error_info).await?;
/// ```
pub struct SelfHealEngine {
    settings: SelfHealSettings,
    config: Arc<dyn ConfigSource>,
    classifier: Arc<dyn IssueClassifier>,
    proposer: Arc<dyn PatchProposer>,
    validator: PatchValidator,
    critic: PatchCritic,
    synthesizer: TestSynthesizer,
    narrator: Narrator,
    // Created lazily via the factory and cached for the engine lifetime.
    model_client: OnceCell<Arc<dyn ModelClient>>,
    // Single-flight guard: at most one remediation in flight.
    in_flight: AtomicBool,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SelfHealEngine {
    /// Construct a new engine instance with default components.
    pub fn new(config: Arc<dyn ConfigSource>) -> Result<Self> {
        let settings = SelfHealSettings::from_config(config.as_ref())?;

        Ok(Self {
            settings,
            config,
            classifier: Arc::new(HeuristicIssueClassifier),
            proposer: Arc::new(ContractPatchProposer),
            validator: PatchValidator,
            critic: PatchCritic,
            synthesizer: TestSynthesizer,
            narrator: Narrator,
            model_client: OnceCell::new(),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Swap the classification strategy (e.g. an LLM-backed classifier).
    pub fn with_classifier(mut self, classifier: Arc<dyn IssueClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Swap the proposal strategy.
    pub fn with_proposer(mut self, proposer: Arc<dyn PatchProposer>) -> Self {
        self.proposer = proposer;
        self
    }

    pub fn settings(&self) -> &SelfHealSettings {
        &self.settings
    }

    /// Run the full remediation pipeline for one captured error.
    ///
    /// Exactly one `SelfHealResult` is produced per call. Stage failures
    /// are converted into `success: false` results; the only error this
    /// method raises is the single-flight conflict.
    #[instrument(
        name = "self_heal_run",
        skip(self, error_info),
        fields(error.error_type = %error_info.error_type)
    )]
    pub async fn heal(&self, error_info: ErrorInfo) -> Result<SelfHealResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics::increment_counter!("self_heal_conflicts_total");
            return Err(SelfHealError::AlreadyInProgress);
        }
        // Released on drop, whatever the outcome below.
        let _guard = FlightGuard(&self.in_flight);

        let ctx = HealContext::begin();
        let issue_id = format!("issue-{}", ctx.started_at.timestamp_millis());

        metrics::increment_counter!("self_heal_runs_total");
        tracing::info!(trace_id = %ctx.trace_id, issue_id = %issue_id, "heal run started");

        match self.run_pipeline(&ctx, &issue_id, &error_info).await {
            Ok(result) => {
                self.log_stage(&ctx, HealStage::Done);
                metrics::increment_counter!(
                    "self_heal_outcomes_total",
                    "outcome" => "success"
                );
                Ok(result)
            }
            Err(err) => {
                self.log_stage(&ctx, HealStage::Failed);
                metrics::increment_counter!(
                    "self_heal_outcomes_total",
                    "outcome" => "failure"
                );
                tracing::error!(trace_id = %ctx.trace_id, error = %err, "heal run failed");

                let classification = self.reclassify_after_failure(&ctx, &error_info).await;
                let end_time = Utc::now();

                Ok(SelfHealResult {
                    success: false,
                    issue_id,
                    classification,
                    proposal: None,
                    validation: None,
                    critique: None,
                    test_suite: None,
                    commit_message: None,
                    pr_body: None,
                    error: Some(err.to_string()),
                    metadata: HealMetadata {
                        start_time: ctx.started_at,
                        end_time,
                        duration_ms: (end_time - ctx.started_at).num_milliseconds(),
                        confidence: 0,
                        automated: false,
                    },
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        ctx: &HealContext,
        issue_id: &str,
        error_info: &ErrorInfo,
    ) -> Result<SelfHealResult> {
        let client = self.model_client().await;
        tracing::debug!(
            trace_id = %ctx.trace_id,
            configured = client.is_configured(),
            models = ?client.available_models(),
            "model client ready"
        );

        self.log_stage(ctx, HealStage::Classifying);
        let classification = self.classifier.classify(ctx, error_info).await?;

        self.log_stage(ctx, HealStage::Proposing);
        let proposal = self.proposer.propose(ctx, error_info, &classification).await?;

        self.log_stage(ctx, HealStage::Validating);
        let validation = self.validator.validate(&proposal);

        self.log_stage(ctx, HealStage::Critiquing);
        let critique = self.critic.critique(&proposal, &classification, &validation);

        let test_suite = if self.settings.generate_tests {
            self.log_stage(ctx, HealStage::Synthesizing);
            Some(
                self.synthesizer
                    .synthesize(ctx, &proposal, &classification),
            )
        } else {
            tracing::debug!(trace_id = %ctx.trace_id, "test synthesis disabled; skipping stage");
            None
        };

        self.log_stage(ctx, HealStage::Narrating);
        let narrative = self.narrator.narrate(
            ctx,
            &classification,
            &proposal,
            &validation,
            &critique,
            test_suite.as_ref(),
        );

        let weight = match validation.verdict {
            Verdict::Pass => 1.0,
            Verdict::Warn => 0.7,
            Verdict::Fail => 0.3,
        };
        let confidence = ((classification.confidence as f64) * weight).round() as u8;
        let automated = validation.recommendation == model::Recommendation::Approve;

        if self.settings.auto_apply
            && automated
            && (confidence as f64 / 100.0) >= self.settings.confidence_threshold
        {
            tracing::info!(
                trace_id = %ctx.trace_id,
                confidence,
                "result eligible for unattended application"
            );
        }

        let end_time = Utc::now();

        Ok(SelfHealResult {
            success: true,
            issue_id: issue_id.to_string(),
            classification,
            proposal: Some(proposal),
            validation: Some(validation),
            critique: Some(critique),
            test_suite,
            commit_message: Some(narrative.commit_message),
            pr_body: Some(narrative.pr_body),
            error: None,
            metadata: HealMetadata {
                start_time: ctx.started_at,
                end_time,
                duration_ms: (end_time - ctx.started_at).num_milliseconds(),
                confidence,
                automated,
            },
        })
    }

    async fn model_client(&self) -> &Arc<dyn ModelClient> {
        self.model_client
            .get_or_init(|| async {
                create_model_client(self.config.as_ref(), self.settings.use_mock_llm).await
            })
            .await
    }

    /// Best-effort diagnostic re-classification on the failure path.
    ///
    /// A secondary failure here is swallowed and replaced by the generic
    /// unknown/high/zero-confidence fallback.
    async fn reclassify_after_failure(
        &self,
        ctx: &HealContext,
        error_info: &ErrorInfo,
    ) -> IssueClassification {
        match self.classifier.classify(ctx, error_info).await {
            Ok(classification) => classification,
            Err(secondary) => {
                tracing::warn!(
                    trace_id = %ctx.trace_id,
                    error = %secondary,
                    "secondary classification failed; using fallback"
                );
                classifier::fallback_classification(&ctx.trace_id)
            }
        }
    }

    fn log_stage(&self, ctx: &HealContext, stage: HealStage) {
        tracing::info!(trace_id = %ctx.trace_id, stage = %stage, "stage transition");
    }
}
