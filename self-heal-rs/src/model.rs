// self-heal-rs/src/model.rs
// Structured data model for the remediation pipeline.
//
// Every stage result carries the trace id generated at the start of a
// heal run, so one run can be correlated end-to-end across logs and
// downstream tooling.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Captured runtime error as supplied by the error-ingestion collaborator.
///
/// Immutable input: the pipeline never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub stack: Option<String>,
    pub error_type: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            error_type: error_type.into(),
            file: None,
            line: None,
            column: None,
            context: HashMap::new(),
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Per-run correlation state shared by every stage.
#[derive(Debug, Clone)]
pub struct HealContext {
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
}

impl HealContext {
    pub fn begin() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Closed set of well-known runtime failure shapes the classifier
/// recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFaultRule {
    Null,
    DivZero,
    Oob,
    Nan,
    Unreachable,
    Other,
}

impl RuntimeFaultRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeFaultRule::Null => "null",
            RuntimeFaultRule::DivZero => "divzero",
            RuntimeFaultRule::Oob => "oob",
            RuntimeFaultRule::Nan => "nan",
            RuntimeFaultRule::Unreachable => "unreachable",
            RuntimeFaultRule::Other => "other",
        }
    }

    /// Stable fingerprint for artifacts derived from this rule match.
    ///
    /// Synthesizer and narrator both derive it from the heal start time,
    /// so a single run names its artifacts consistently.
    pub fn fingerprint(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.as_str(), at.timestamp())
    }
}

impl fmt::Display for RuntimeFaultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Line span in a source file targeted by a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpan {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// Rule-specific analysis attached to a classification when the failure
/// shape matches one of the closed fault rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeErrorAnalysis {
    pub rule: RuntimeFaultRule,
    pub explanation: String,
    pub target: TargetSpan,
    /// Ordered by preference; the proposer takes the first strategy.
    pub suggested_strategies: Vec<String>,
}

/// Classifier output for one captured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueClassification {
    pub category: String,
    pub subcategory: String,
    pub severity: Severity,
    /// 0-100.
    pub confidence: u8,
    pub affected_components: Vec<String>,
    pub estimated_complexity: Complexity,
    pub risk_level: RiskLevel,
    pub trace_id: String,
    pub runtime_error_analysis: Option<RuntimeErrorAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Modify,
    Add,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChange {
    pub start_line: u32,
    pub end_line: u32,
    pub original: String,
    pub replacement: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    pub changes: Vec<CodeChange>,
}

/// Proposed minimal change set. Immutable once produced.
///
/// An empty `files` list means "no actionable patch", not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchProposal {
    pub id: String,
    pub trace_id: String,
    pub description: String,
    pub files: Vec<FileChange>,
    pub new_dependencies: Vec<String>,
    pub risk_assessment: RiskLevel,
    pub rollback_plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub location: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    ApproveWithChanges,
    Reject,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Approve => write!(f, "APPROVE"),
            Recommendation::ApproveWithChanges => write!(f, "APPROVE_WITH_CHANGES"),
            Recommendation::Reject => write!(f, "REJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Boolean-like pass/fail flags derived from which issue types are
/// present in a validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationChecklist {
    pub type_check: CheckStatus,
    pub lint: CheckStatus,
    pub tests: CheckStatus,
    pub security: CheckStatus,
    pub performance: CheckStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub trace_id: String,
    pub verdict: Verdict,
    pub critical_issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub checklist: ValidationChecklist,
}

/// Second-pass review looking for omissions the generic validation
/// checks miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchCritique {
    pub trace_id: String,
    pub risks: Vec<String>,
    pub adjustments: Vec<String>,
    pub should_revise: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Unit,
    Integration,
    Regression,
    Performance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFile {
    pub path: String,
    pub content: String,
    pub test_type: TestType,
}

/// Estimated percentages, not measured ones; nothing is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEstimate {
    pub statement: u8,
    pub branch: u8,
    pub function: u8,
    pub line: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: String,
    pub trace_id: String,
    pub description: String,
    pub files: Vec<TestFile>,
    pub coverage: CoverageEstimate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    /// 0-100, classification confidence weighted by validation verdict.
    pub confidence: u8,
    /// Whether the result is eligible for unattended application.
    pub automated: bool,
}

/// Terminal aggregate of one heal run. Produced exactly once per call
/// and never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealResult {
    pub success: bool,
    pub issue_id: String,
    pub classification: IssueClassification,
    pub proposal: Option<PatchProposal>,
    pub validation: Option<ValidationResult>,
    pub critique: Option<PatchCritique>,
    pub test_suite: Option<TestSuite>,
    pub commit_message: Option<String>,
    pub pr_body: Option<String>,
    pub error: Option<String>,
    pub metadata: HealMetadata,
}
