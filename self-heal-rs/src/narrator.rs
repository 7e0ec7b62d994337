// self-heal-rs/src/narrator.rs
// Commit message and pull-request narrative rendering.
//
// Template-driven for now; an LLM-backed narrator is the planned
// successor once prompt fixtures stabilize.

use crate::model::{
    HealContext, IssueClassification, PatchCritique, PatchProposal, TestSuite, ValidationResult,
};

/// Rendered narrative for one heal run.
#[derive(Debug, Clone)]
pub struct Narrative {
    pub commit_message: String,
    pub pr_body: String,
}

#[derive(Debug, Default)]
pub struct Narrator;

impl Narrator {
    pub fn narrate(
        &self,
        ctx: &HealContext,
        classification: &IssueClassification,
        proposal: &PatchProposal,
        validation: &ValidationResult,
        critique: &PatchCritique,
        suite: Option<&TestSuite>,
    ) -> Narrative {
        let narrative = match &classification.runtime_error_analysis {
            Some(analysis) => {
                let rule = analysis.rule;
                let target = &analysis.target;
                let fingerprint = rule.fingerprint(ctx.started_at);

                let commit_message = format!(
                    "fix: guard {} fault in {} ({})",
                    rule, target.file, fingerprint
                );

                let before_critical = validation.critical_issues.len();
                let before_warnings = validation.warnings.len();
                // Estimated improvement, not a re-run of the analyzer.
                let after_critical = before_critical.saturating_sub(1);
                let after_warnings = before_warnings.saturating_sub(1);

                let mut pr_body = format!(
                    "## Self-heal: {rule}\n\n\
                     Automated remediation for a captured `{rule}` runtime fault.\n\n\
                     - Fingerprint: `{fingerprint}`\n\
                     - Target: `{}` lines {}-{}\n\
                     - Strategy: {}\n\n\
                     ### Analyzer summary (estimated)\n\n\
                     | finding | before | after |\n\
                     |---|---|---|\n\
                     | critical | {before_critical} | {after_critical} |\n\
                     | warnings | {before_warnings} | {after_warnings} |\n\n\
                     The after-counts are an estimate derived from the validation pass,\n\
                     not a re-run of the analyzer.\n",
                    target.file,
                    target.start_line,
                    target.end_line,
                    analysis
                        .suggested_strategies
                        .first()
                        .map(String::as_str)
                        .unwrap_or("insert a defensive contract guard"),
                );

                pr_body.push_str(&validation_section(validation));
                pr_body.push_str(&tests_section(suite));
                pr_body.push_str(&review_notes(critique));

                Narrative {
                    commit_message,
                    pr_body,
                }
            }
            None => {
                let commit_message =
                    format!("triage: record {} finding", classification.category);

                let mut pr_body = format!(
                    "## Automated triage\n\n\
                     {}\n\n\
                     No rule-specific patch template matched this error; the attached\n\
                     classification is provided for manual follow-up.\n",
                    proposal.description
                );

                pr_body.push_str(&validation_section(validation));
                pr_body.push_str(&tests_section(suite));
                pr_body.push_str(&review_notes(critique));

                Narrative {
                    commit_message,
                    pr_body,
                }
            }
        };

        tracing::debug!(
            trace_id = %ctx.trace_id,
            commit_message = %narrative.commit_message,
            "rendered narrative"
        );

        narrative
    }
}

fn validation_section(validation: &ValidationResult) -> String {
    format!(
        "\n### Validation\n\n\
         - Verdict: {}\n\
         - Recommendation: {}\n\
         - Risk: {}\n",
        validation.verdict, validation.recommendation, validation.risk_level
    )
}

fn tests_section(suite: Option<&TestSuite>) -> String {
    match suite {
        Some(suite) => format!(
            "\n### Tests\n\n\
             {} synthesized test artifact(s); estimated line coverage {}%.\n",
            suite.files.len(),
            suite.coverage.line
        ),
        None => "\n### Tests\n\nTest synthesis disabled for this run.\n".to_string(),
    }
}

fn review_notes(critique: &PatchCritique) -> String {
    if critique.risks.is_empty() && critique.adjustments.is_empty() {
        return String::new();
    }

    let mut section = String::from("\n### Review Notes\n");

    if !critique.risks.is_empty() {
        section.push_str("\nRisks:\n");
        for risk in &critique.risks {
            section.push_str(&format!("- {}\n", risk));
        }
    }

    if !critique.adjustments.is_empty() {
        section.push_str("\nSuggested adjustments:\n");
        for adjustment in &critique.adjustments {
            section.push_str(&format!("- {}\n", adjustment));
        }
    }

    section
}
