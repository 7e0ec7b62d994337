// self-heal-rs/src/proposer.rs
// Patch proposal generation.
//
// The current implementation is template-driven: for rule-matched errors
// it assumes a contract-guard style fix scoped to the analysis target
// span. An LLM-backed proposer that drafts real replacement code is the
// planned successor behind the same trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::model::{
    ChangeType, CodeChange, ErrorInfo, FileChange, HealContext, IssueClassification, PatchProposal,
    RiskLevel, RuntimeFaultRule,
};

/// Dependency that supplies the contract-guard primitives the generated
/// snippets rely on.
pub const CONTRACT_DEPENDENCY: &str = "contracts";

/// Stand-in original text until a source extractor is wired in.
const ORIGINAL_PLACEHOLDER: &str = "(source extraction pending static analysis integration)";

#[async_trait]
pub trait PatchProposer: Send + Sync {
    async fn propose(
        &self,
        ctx: &HealContext,
        error: &ErrorInfo,
        classification: &IssueClassification,
    ) -> Result<PatchProposal>;
}

/// Default proposer: contract-guard insertion for rule matches, an
/// empty-file-list placeholder otherwise.
#[derive(Debug, Default)]
pub struct ContractPatchProposer;

#[async_trait]
impl PatchProposer for ContractPatchProposer {
    async fn propose(
        &self,
        ctx: &HealContext,
        _error: &ErrorInfo,
        classification: &IssueClassification,
    ) -> Result<PatchProposal> {
        let proposal = match &classification.runtime_error_analysis {
            Some(analysis) => {
                let rule = analysis.rule;
                let target = &analysis.target;

                let change = CodeChange {
                    start_line: target.start_line,
                    end_line: target.end_line,
                    original: ORIGINAL_PLACEHOLDER.to_string(),
                    replacement: guard_snippet(rule).to_string(),
                    rationale: format!(
                        "insert a {} contract guard ahead of the failing expression",
                        rule
                    ),
                };

                // Risk passthrough: the proposal is only high-risk when the
                // classification already was.
                let risk_assessment = if classification.risk_level == RiskLevel::High {
                    RiskLevel::High
                } else {
                    RiskLevel::Low
                };

                PatchProposal {
                    id: Uuid::new_v4().to_string(),
                    trace_id: ctx.trace_id.clone(),
                    description: format!(
                        "Insert a {} contract guard scoped to {}:{}-{}",
                        rule, target.file, target.start_line, target.end_line
                    ),
                    files: vec![FileChange {
                        path: target.file.clone(),
                        change_type: ChangeType::Modify,
                        changes: vec![change],
                    }],
                    new_dependencies: vec![CONTRACT_DEPENDENCY.to_string()],
                    risk_assessment,
                    rollback_plan: format!(
                        "Revert the guarded change in {} via version control; no data migration involved.",
                        target.file
                    ),
                }
            }
            None => PatchProposal {
                id: Uuid::new_v4().to_string(),
                trace_id: ctx.trace_id.clone(),
                description: format!(
                    "No automated patch template for category '{}'; manual triage required.",
                    classification.category
                ),
                files: Vec::new(),
                new_dependencies: Vec::new(),
                risk_assessment: RiskLevel::Low,
                rollback_plan: "No changes to roll back.".to_string(),
            },
        };

        tracing::debug!(
            trace_id = %ctx.trace_id,
            proposal_id = %proposal.id,
            file_count = proposal.files.len(),
            "drafted patch proposal"
        );

        Ok(proposal)
    }
}

/// Rule-specific guard snippet inserted at the target span.
pub(crate) fn guard_snippet(rule: RuntimeFaultRule) -> &'static str {
    match rule {
        RuntimeFaultRule::Null => {
            "requires(value != null, \"value must be non-null before use\");"
        }
        RuntimeFaultRule::DivZero => {
            "requires(denominator != 0 && !Object.is(denominator, -0), \"denominator must be non-zero\");"
        }
        RuntimeFaultRule::Oob => {
            "requires(index >= 0 && index < items.length, \"index must be within bounds\");"
        }
        RuntimeFaultRule::Nan => {
            "requires(Number.isFinite(value), \"value must be finite (not NaN or Infinity)\");"
        }
        RuntimeFaultRule::Unreachable => {
            "requires(isHandledVariant(state), \"state must be a handled variant\");"
        }
        RuntimeFaultRule::Other => {
            "requires(invariantHolds(), \"runtime invariant must hold at this boundary\");"
        }
    }
}
