// self-heal-rs/src/classifier.rs
// Heuristic issue classification for captured runtime errors.

use async_trait::async_trait;

use crate::Result;
use crate::model::{
    Complexity, ErrorInfo, HealContext, IssueClassification, RiskLevel, RuntimeErrorAnalysis,
    RuntimeFaultRule, Severity, TargetSpan,
};

/// How many lines past the reported one the default repair span covers.
const DEFAULT_SPAN_LINES: u32 = 5;

/// Strategy interface for issue classification.
///
/// The default implementation is heuristic-only; an LLM-backed
/// implementation can be swapped in behind this trait without touching
/// the engine.
#[async_trait]
pub trait IssueClassifier: Send + Sync {
    async fn classify(&self, ctx: &HealContext, error: &ErrorInfo) -> Result<IssueClassification>;
}

/// Lookup/heuristic classifier over message and type-tag substrings.
///
/// Rules are evaluated in a fixed order and the first match wins, so no
/// two fault rules can both claim an error.
#[derive(Debug, Default)]
pub struct HeuristicIssueClassifier;

#[async_trait]
impl IssueClassifier for HeuristicIssueClassifier {
    async fn classify(&self, ctx: &HealContext, error: &ErrorInfo) -> Result<IssueClassification> {
        let classification = match match_fault_rule(error) {
            Some(rule) => rule_classification(ctx, error, rule),
            None => generic_classification(ctx, error),
        };

        tracing::debug!(
            trace_id = %ctx.trace_id,
            category = %classification.category,
            subcategory = %classification.subcategory,
            confidence = classification.confidence,
            "classified captured error"
        );

        Ok(classification)
    }
}

/// First-match-wins evaluation over the closed fault-rule set.
fn match_fault_rule(error: &ErrorInfo) -> Option<RuntimeFaultRule> {
    let msg = error.message.to_ascii_lowercase();
    let ty = error.error_type.to_ascii_lowercase();

    if msg.contains("cannot read propert")
        || msg.contains("null")
        || msg.contains("undefined")
        || ty.contains("nullpointer")
    {
        Some(RuntimeFaultRule::Null)
    } else if msg.contains("division by zero")
        || msg.contains("divide by zero")
        || msg.contains("divided by zero")
    {
        Some(RuntimeFaultRule::DivZero)
    } else if msg.contains("out of bounds") || msg.contains("out of range") || msg.contains("index out of")
    {
        Some(RuntimeFaultRule::Oob)
    } else if error.message.contains("NaN") || msg.contains("not a number") {
        Some(RuntimeFaultRule::Nan)
    } else if msg.contains("unreachable") {
        Some(RuntimeFaultRule::Unreachable)
    } else if ty.contains("runtimeerror") || error.context.contains_key("fault") {
        Some(RuntimeFaultRule::Other)
    } else {
        None
    }
}

fn rule_classification(
    ctx: &HealContext,
    error: &ErrorInfo,
    rule: RuntimeFaultRule,
) -> IssueClassification {
    let (subcategory, explanation, strategies, confidence, severity, risk_level) = rule_details(rule);

    let file = error.file.clone().unwrap_or_else(|| "unknown".to_string());
    let start_line = error.line.unwrap_or(1);
    let target = TargetSpan {
        file,
        start_line,
        end_line: start_line + DEFAULT_SPAN_LINES,
    };

    IssueClassification {
        category: "runtime-error".to_string(),
        subcategory: subcategory.to_string(),
        severity,
        confidence,
        affected_components: affected_components(error),
        estimated_complexity: Complexity::Low,
        risk_level,
        trace_id: ctx.trace_id.clone(),
        runtime_error_analysis: Some(RuntimeErrorAnalysis {
            rule,
            explanation: explanation.to_string(),
            target,
            suggested_strategies: strategies.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

type RuleDetails = (
    &'static str,
    &'static str,
    &'static [&'static str],
    u8,
    Severity,
    RiskLevel,
);

fn rule_details(rule: RuntimeFaultRule) -> RuleDetails {
    match rule {
        RuntimeFaultRule::Null => (
            "null-dereference",
            "A null or missing value was dereferenced at the reported location.",
            &[
                "insert a non-null contract guard at the function boundary",
                "tighten optional handling at the call site",
            ],
            90,
            Severity::High,
            RiskLevel::Medium,
        ),
        RuntimeFaultRule::DivZero => (
            "division-by-zero",
            "A division ran with an unchecked zero denominator.",
            &[
                "guard the denominator with a non-zero contract",
                "audit upstream values that can collapse to zero",
            ],
            88,
            Severity::High,
            RiskLevel::Medium,
        ),
        RuntimeFaultRule::Oob => (
            "index-out-of-bounds",
            "An index expression escaped the valid range of its collection.",
            &[
                "insert a bounds contract before the indexing expression",
                "clamp or validate the index where it is computed",
            ],
            85,
            Severity::High,
            RiskLevel::Medium,
        ),
        RuntimeFaultRule::Nan => (
            "nan-propagation",
            "A non-finite value propagated through an arithmetic path.",
            &[
                "guard the value with a finiteness contract",
                "trace the arithmetic that produced the non-finite value",
            ],
            80,
            Severity::Medium,
            RiskLevel::Low,
        ),
        RuntimeFaultRule::Unreachable => (
            "unreachable-branch",
            "Control flow reached a branch the program treats as impossible.",
            &[
                "add an exhaustive-handling contract at the branch point",
                "audit the state space for unhandled variants",
            ],
            75,
            Severity::High,
            RiskLevel::High,
        ),
        RuntimeFaultRule::Other => (
            "generic-runtime-fault",
            "A runtime invariant was violated without a more specific signature.",
            &["add a defensive contract at the failing boundary"],
            60,
            Severity::Medium,
            RiskLevel::Medium,
        ),
    }
}

/// Classification for errors outside the closed fault-rule set.
fn generic_classification(ctx: &HealContext, error: &ErrorInfo) -> IssueClassification {
    let msg = error.message.to_ascii_lowercase();
    let ty = error.error_type.to_ascii_lowercase();

    let (category, subcategory, severity, confidence) = if ty.contains("syntax") {
        ("syntax-error", "parse", Severity::Medium, 45)
    } else if msg.contains("timeout") || msg.contains("econnrefused") || msg.contains("network") {
        ("network-error", "connectivity", Severity::Medium, 50)
    } else if ty.contains("type") {
        ("type-error", "type-mismatch", Severity::Medium, 40)
    } else {
        ("unknown", "unclassified", Severity::Medium, 25)
    };

    IssueClassification {
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        severity,
        confidence,
        affected_components: affected_components(error),
        estimated_complexity: Complexity::Medium,
        risk_level: RiskLevel::Low,
        trace_id: ctx.trace_id.clone(),
        runtime_error_analysis: None,
    }
}

/// Infer affected components from the error location and context map.
fn affected_components(error: &ErrorInfo) -> Vec<String> {
    let mut components = Vec::new();

    if let Some(file) = &error.file {
        push_if_absent(&mut components, file);
    }

    for (k, v) in &error.context {
        let key = k.to_ascii_lowercase();
        if (key.contains("component") || key.contains("service") || key.contains("module"))
            && !v.is_empty()
        {
            push_if_absent(&mut components, v);
        }
    }

    components
}

fn push_if_absent(out: &mut Vec<String>, value: &str) {
    if !out.iter().any(|v| v == value) {
        out.push(value.to_string());
    }
}

/// Fallback classification for the failure path: generic unknown bucket
/// with zero confidence.
pub(crate) fn fallback_classification(trace_id: &str) -> IssueClassification {
    IssueClassification {
        category: "unknown".to_string(),
        subcategory: "unclassified".to_string(),
        severity: Severity::High,
        confidence: 0,
        affected_components: Vec::new(),
        estimated_complexity: Complexity::Medium,
        risk_level: RiskLevel::Medium,
        trace_id: trace_id.to_string(),
        runtime_error_analysis: None,
    }
}
