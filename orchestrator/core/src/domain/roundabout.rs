// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Roundabout State Machine
//!
//! The three-phase cycle every agent runs. Phase changes are a pure function
//! of the current phase and what happened, so the cycle can be driven without
//! a task runtime.
//!
//! ## Transition Table
//! | Phase | Outcome | Next |
//! |-------|---------|------|
//! | EMERGE | task succeeded | EMERGE |
//! | EMERGE | task failed | ADAPT |
//! | ADAPT | proceed | INTEGRATE |
//! | ADAPT | halt | ADAPT |
//! | INTEGRATE | plan valid | EMERGE |
//! | INTEGRATE | plan invalid | ADAPT |
//!
//! ADAPT is where failures are analysed ([`analyze_failures`]) and a
//! [`StrategicDecision`] is taken; INTEGRATE turns that analysis into a
//! [`TacticalPlan`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{CognitivePhase, FailureRecord};

/// Failures at or above this count always halt.
pub const MAX_FAILURES_BEFORE_HALT: usize = 3;

/// Plans below this confidence are rejected.
pub const MIN_PLAN_CONFIDENCE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    TaskSucceeded,
    TaskFailed,
    Proceed,
    Halt,
    PlanValid,
    PlanInvalid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Outcome {outcome:?} cannot occur in the {phase} phase")]
    Illegal {
        phase: CognitivePhase,
        outcome: PhaseOutcome,
    },
}

/// Next phase after `outcome` was observed in `phase`.
pub fn step(
    phase: CognitivePhase,
    outcome: PhaseOutcome,
) -> Result<CognitivePhase, TransitionError> {
    use CognitivePhase::*;
    use PhaseOutcome::*;

    match (phase, outcome) {
        (Emerge, TaskSucceeded) => Ok(Emerge),
        (Emerge, TaskFailed) => Ok(Adapt),
        (Adapt, Proceed) => Ok(Integrate),
        (Adapt, Halt) => Ok(Adapt),
        (Integrate, PlanValid) => Ok(Emerge),
        (Integrate, PlanInvalid) => Ok(Adapt),
        (phase, outcome) => Err(TransitionError::Illegal { phase, outcome }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Minor,
    Moderate,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Logic,
    Resource,
    Other,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Logic => write!(f, "logic"),
            FailureType::Resource => write!(f, "resource"),
            FailureType::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePattern {
    /// A single failure on record.
    Isolated,
    /// The last two failures happened in the same phase.
    Recurring(CognitivePhase),
    MixedPhase,
}

impl std::fmt::Display for FailurePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePattern::Isolated => write!(f, "isolated"),
            FailurePattern::Recurring(phase) => {
                write!(f, "recurring-{}", phase.to_string().to_lowercase())
            }
            FailurePattern::MixedPhase => write!(f, "mixed-phase"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub severity: FailureSeverity,
    pub failure_type: FailureType,
    pub pattern: FailurePattern,
    pub failure_count: usize,
    pub recommendation: String,
}

const RESOURCE_MARKERS: &[&str] = &[
    "budget",
    "quota",
    "resource",
    "exhausted",
    "limit",
    "denied",
    "circuit breaker",
    "timeout",
];

const LOGIC_MARKERS: &[&str] = &[
    "invalid",
    "parse",
    "logic",
    "assert",
    "unexpected",
    "contradict",
];

const CRITICAL_MARKERS: &[&str] = &["fatal", "unrecoverable", "panic", "corrupt"];

/// Classifies the failure history, most recent entry last.
pub fn analyze_failures(history: &[FailureRecord]) -> FailureAnalysis {
    let failure_count = history.len();
    let latest = history
        .last()
        .map(|record| record.error.to_lowercase())
        .unwrap_or_default();

    let failure_type = if RESOURCE_MARKERS.iter().any(|m| latest.contains(m)) {
        FailureType::Resource
    } else if LOGIC_MARKERS.iter().any(|m| latest.contains(m)) {
        FailureType::Logic
    } else {
        FailureType::Other
    };

    let pattern = match history {
        [] | [_] => FailurePattern::Isolated,
        [.., previous, last] if previous.phase == last.phase => {
            FailurePattern::Recurring(last.phase)
        }
        _ => FailurePattern::MixedPhase,
    };

    let severity = if failure_count >= MAX_FAILURES_BEFORE_HALT
        || CRITICAL_MARKERS.iter().any(|m| latest.contains(m))
    {
        FailureSeverity::Critical
    } else if failure_type == FailureType::Resource
        || matches!(pattern, FailurePattern::Recurring(_))
    {
        FailureSeverity::Moderate
    } else {
        FailureSeverity::Minor
    };

    let recommendation = match (severity, failure_type) {
        (FailureSeverity::Critical, _) => "escalate to parent and stop retrying".to_string(),
        (_, FailureType::Resource) => "reduce resource consumption before retrying".to_string(),
        (_, FailureType::Logic) if matches!(pattern, FailurePattern::Recurring(_)) => {
            "simplify the approach; the same step keeps failing".to_string()
        }
        (_, FailureType::Logic) => "retry with the failure as added context".to_string(),
        (_, FailureType::Other) if pattern == FailurePattern::MixedPhase => {
            "decompose the task into smaller steps".to_string()
        }
        _ => "retry the task".to_string(),
    };

    FailureAnalysis {
        severity,
        failure_type,
        pattern,
        failure_count,
        recommendation,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategicDecision {
    Proceed,
    HaltAndReportFailure { reason: String },
}

/// Inputs to the ADAPT strategic decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub analysis: &'a FailureAnalysis,
    pub resources_sufficient: bool,
    pub recursion_depth: u32,
    pub max_recursion_depth: u32,
}

pub fn decide_strategy(ctx: DecisionContext<'_>) -> StrategicDecision {
    let halt = |reason: String| StrategicDecision::HaltAndReportFailure { reason };

    if !ctx.resources_sufficient {
        return halt("insufficient resources remaining".to_string());
    }
    if ctx.analysis.failure_count >= MAX_FAILURES_BEFORE_HALT {
        return halt(format!(
            "failure limit reached ({} failures)",
            ctx.analysis.failure_count
        ));
    }
    if ctx.recursion_depth + 1 >= ctx.max_recursion_depth {
        return halt(format!(
            "recursion depth {} is too close to the maximum of {}",
            ctx.recursion_depth, ctx.max_recursion_depth
        ));
    }
    if ctx.analysis.severity == FailureSeverity::Critical {
        return halt(format!("unrecoverable {} failure", ctx.analysis.failure_type));
    }
    StrategicDecision::Proceed
}

/// What ADAPT hands to INTEGRATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationContext {
    pub analysis: FailureAnalysis,
    pub decision: StrategicDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanApproach {
    RetryWithContext,
    Decompose,
    ConserveResources,
    Simplify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalPlan {
    pub approach: PlanApproach,
    pub is_valid: bool,
    pub confidence: f64,
    pub rationale: String,
}

impl TacticalPlan {
    fn invalid(rationale: impl Into<String>) -> Self {
        Self {
            approach: PlanApproach::RetryWithContext,
            is_valid: false,
            confidence: 0.0,
            rationale: rationale.into(),
        }
    }
}

/// Builds the INTEGRATE plan. `agent_confidence` is the agent's current
/// confidence in `[0, 1]`.
pub fn build_tactical_plan(
    context: Option<&AdaptationContext>,
    agent_confidence: f64,
) -> TacticalPlan {
    let Some(context) = context else {
        return TacticalPlan::invalid("no adaptation context available");
    };
    if context.decision != StrategicDecision::Proceed {
        return TacticalPlan::invalid("strategic decision did not allow proceeding");
    }

    let analysis = &context.analysis;
    let approach = match (analysis.failure_type, analysis.pattern) {
        (FailureType::Resource, _) => PlanApproach::ConserveResources,
        (FailureType::Logic, FailurePattern::Recurring(_)) => PlanApproach::Simplify,
        (FailureType::Other, FailurePattern::MixedPhase) => PlanApproach::Decompose,
        _ => PlanApproach::RetryWithContext,
    };

    let base = match analysis.severity {
        FailureSeverity::Minor => 0.8,
        FailureSeverity::Moderate => 0.6,
        FailureSeverity::Critical => 0.3,
    };
    let confidence = base * (0.5 + 0.5 * agent_confidence.clamp(0.0, 1.0));

    TacticalPlan {
        approach,
        is_valid: confidence >= MIN_PLAN_CONFIDENCE,
        confidence,
        rationale: analysis.recommendation.clone(),
    }
}
