// self-heal-rs/src/critic.rs
// Rule-specific completeness pass over contract-guard proposals.
//
// The critic looks for subtle omissions the validator's generic checks
// miss: a guard that arrives too late in control flow, a finiteness
// check that forgets Infinity, a zero check that forgets negative zero.

use crate::model::{
    IssueClassification, PatchCritique, PatchProposal, RuntimeFaultRule, ValidationResult, Verdict,
};
use crate::proposer::CONTRACT_DEPENDENCY;

const GUARD_MARKER: &str = "requires(";

#[derive(Debug, Default)]
pub struct PatchCritic;

impl PatchCritic {
    pub fn critique(
        &self,
        proposal: &PatchProposal,
        classification: &IssueClassification,
        validation: &ValidationResult,
    ) -> PatchCritique {
        let mut risks = Vec::new();
        let mut adjustments = Vec::new();

        // Rule-specific checks only apply to contract-guard proposals.
        let declares_guard = proposal
            .new_dependencies
            .iter()
            .any(|d| d == CONTRACT_DEPENDENCY);

        if let (Some(analysis), true) = (&classification.runtime_error_analysis, declares_guard) {
            for file in &proposal.files {
                for change in &file.changes {
                    inspect_snippet(
                        analysis.rule,
                        &file.path,
                        &change.replacement,
                        &mut risks,
                        &mut adjustments,
                    );
                }
            }
        }

        let should_revise = !risks.is_empty()
            || (validation.verdict == Verdict::Warn && validation.warnings.len() > 2);

        tracing::debug!(
            trace_id = %proposal.trace_id,
            risk_count = risks.len(),
            adjustment_count = adjustments.len(),
            should_revise,
            "critiqued patch proposal"
        );

        PatchCritique {
            trace_id: proposal.trace_id.clone(),
            risks,
            adjustments,
            should_revise,
        }
    }
}

fn inspect_snippet(
    rule: RuntimeFaultRule,
    path: &str,
    snippet: &str,
    risks: &mut Vec<String>,
    adjustments: &mut Vec<String>,
) {
    let has_guard = snippet.contains(GUARD_MARKER);

    match rule {
        RuntimeFaultRule::Null => {
            // A guard below an early return never runs for the case it
            // was written to cover.
            if has_guard {
                if let (Some(ret), Some(guard)) = (snippet.find("return"), snippet.find(GUARD_MARKER))
                {
                    if ret < guard {
                        risks.push(format!(
                            "contract placement: guard appears after an early return in {}",
                            path
                        ));
                    }
                }
            }
        }
        RuntimeFaultRule::Nan => {
            if has_guard && !snippet.contains("Infinity") && !snippet.contains("isFinite") {
                risks.push(format!(
                    "finiteness gap: NaN is guarded but Infinity is not checked in {}",
                    path
                ));
            }
        }
        RuntimeFaultRule::DivZero => {
            if has_guard && !snippet.contains("-0") {
                risks.push(format!(
                    "zero-comparison gap: negative zero is not compared in {}",
                    path
                ));
            }
        }
        RuntimeFaultRule::Oob => {
            if has_guard && !snippet.contains(">= 0") {
                adjustments.push(format!(
                    "also check the lower bound of the index in {}",
                    path
                ));
            }
        }
        RuntimeFaultRule::Unreachable | RuntimeFaultRule::Other => {
            if has_guard {
                adjustments.push(format!(
                    "narrow the contract in {} to the specific invariant that failed",
                    path
                ));
            }
        }
    }
}
