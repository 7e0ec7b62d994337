// self-heal-rs/src/validator.rs
// Static screening of patch proposals.
//
// Four independent checks run against every code change; their findings
// are data, not errors. The verdict, aggregated risk, recommendation,
// and checklist are all derived from the collected issue buckets.

use crate::model::{
    ChangeType, CheckStatus, CodeChange, FileChange, PatchProposal, Recommendation, RiskLevel,
    Severity, ValidationChecklist, ValidationIssue, ValidationResult, Verdict,
};

pub const ISSUE_TYPE_SAFETY: &str = "type-error";
pub const ISSUE_TYPE_SECURITY: &str = "security";
pub const ISSUE_TYPE_PERFORMANCE: &str = "performance";
pub const ISSUE_TYPE_COMPATIBILITY: &str = "compatibility";

const EVAL_PATTERNS: &[&str] = &["eval(", "new Function("];

#[derive(Debug, Default)]
pub struct PatchValidator;

impl PatchValidator {
    pub fn validate(&self, proposal: &PatchProposal) -> ValidationResult {
        let mut critical_issues = Vec::new();
        let mut warnings = Vec::new();
        let mut info = Vec::new();

        for file in &proposal.files {
            check_compatibility(file, &mut warnings);

            for change in &file.changes {
                check_type_safety(file, change, &mut critical_issues);
                check_security(file, change, &mut critical_issues);
                check_performance(file, change, &mut info);
            }
        }

        let verdict = if !critical_issues.is_empty() {
            Verdict::Fail
        } else if !warnings.is_empty() {
            Verdict::Warn
        } else {
            Verdict::Pass
        };

        let risk_level = aggregate_risk(&critical_issues, &warnings);
        let recommendation = derive_recommendation(verdict, risk_level);
        let checklist = derive_checklist(&critical_issues, &warnings, &info);

        tracing::debug!(
            trace_id = %proposal.trace_id,
            verdict = %verdict,
            critical = critical_issues.len(),
            warning = warnings.len(),
            informational = info.len(),
            "validated patch proposal"
        );

        ValidationResult {
            trace_id: proposal.trace_id.clone(),
            verdict,
            critical_issues,
            warnings,
            info,
            risk_level,
            recommendation,
            checklist,
        }
    }
}

fn location(file: &FileChange, change: &CodeChange) -> String {
    format!("{}:{}-{}", file.path, change.start_line, change.end_line)
}

/// Unguarded `undefined`-like sentinel in replacement text.
///
/// A `typeof` comparison is the guarded form and is allowed.
fn check_type_safety(file: &FileChange, change: &CodeChange, out: &mut Vec<ValidationIssue>) {
    if change.replacement.contains("undefined") && !change.replacement.contains("typeof") {
        out.push(ValidationIssue {
            issue_type: ISSUE_TYPE_SAFETY.to_string(),
            severity: Severity::High,
            description: "replacement text references an unguarded 'undefined' sentinel".to_string(),
            location: location(file, change),
            recommendation: "guard the sentinel with a typeof check or remove it".to_string(),
        });
    }
}

/// Dynamic code evaluation constructs.
fn check_security(file: &FileChange, change: &CodeChange, out: &mut Vec<ValidationIssue>) {
    for pattern in EVAL_PATTERNS {
        if change.replacement.contains(pattern) {
            out.push(ValidationIssue {
                issue_type: ISSUE_TYPE_SECURITY.to_string(),
                severity: Severity::Critical,
                description: format!("replacement text uses dynamic code evaluation ({})", pattern),
                location: location(file, change),
                recommendation: "express the fix without dynamic evaluation".to_string(),
            });
            return;
        }
    }
}

/// Nested-loop patterns are surfaced as informational findings.
fn check_performance(file: &FileChange, change: &CodeChange, out: &mut Vec<ValidationIssue>) {
    let loop_count = change.replacement.matches("for (").count()
        + change.replacement.matches("for(").count();

    if loop_count >= 2 {
        out.push(ValidationIssue {
            issue_type: ISSUE_TYPE_PERFORMANCE.to_string(),
            severity: Severity::Low,
            description: "replacement text introduces nested loops".to_string(),
            location: location(file, change),
            recommendation: "verify the loop bounds are small or restructure the iteration"
                .to_string(),
        });
    }
}

/// File deletions are compatibility warnings.
fn check_compatibility(file: &FileChange, out: &mut Vec<ValidationIssue>) {
    if file.change_type == ChangeType::Delete {
        out.push(ValidationIssue {
            issue_type: ISSUE_TYPE_COMPATIBILITY.to_string(),
            severity: Severity::Medium,
            description: format!("proposal deletes {}", file.path),
            location: file.path.clone(),
            recommendation: "confirm no external consumers depend on the deleted file".to_string(),
        });
    }
}

fn aggregate_risk(critical_issues: &[ValidationIssue], warnings: &[ValidationIssue]) -> RiskLevel {
    if critical_issues.iter().any(|i| i.severity == Severity::Critical) {
        RiskLevel::Critical
    } else if !critical_issues.is_empty() {
        RiskLevel::High
    } else if warnings.len() > 3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn derive_recommendation(verdict: Verdict, risk_level: RiskLevel) -> Recommendation {
    if verdict == Verdict::Fail || risk_level == RiskLevel::Critical {
        Recommendation::Reject
    } else if verdict == Verdict::Warn || risk_level == RiskLevel::High {
        Recommendation::ApproveWithChanges
    } else {
        Recommendation::Approve
    }
}

fn derive_checklist(
    critical_issues: &[ValidationIssue],
    warnings: &[ValidationIssue],
    info: &[ValidationIssue],
) -> ValidationChecklist {
    let all = || critical_issues.iter().chain(warnings.iter()).chain(info.iter());

    let fail_if = |cond: bool| if cond { CheckStatus::Fail } else { CheckStatus::Pass };

    ValidationChecklist {
        type_check: fail_if(all().any(|i| i.issue_type == ISSUE_TYPE_SAFETY)),
        lint: fail_if(!warnings.is_empty()),
        // Nothing is executed here; synthesized tests run downstream.
        tests: CheckStatus::Pass,
        security: fail_if(
            critical_issues
                .iter()
                .any(|i| i.issue_type == ISSUE_TYPE_SECURITY),
        ),
        performance: fail_if(all().any(|i| i.issue_type == ISSUE_TYPE_PERFORMANCE)),
    }
}
