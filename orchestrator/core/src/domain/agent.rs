// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Domain Types
//!
//! Identity, role, configuration profile and the observable state of a
//! cognitive agent. The behaviour lives in
//! [`crate::application::cognitive_agent`]; everything here is plain data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::resource::{ResourceBudget, ResourceUsage};

pub const INITIAL_RESONANCE: f64 = 0.5;
pub const INITIAL_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an agent in the delegation hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// Top-level coordinator of a task tree.
    Coordinator,
    /// Agent that talks to the user directly.
    UserFacing,
    /// Delegated worker.
    Worker,
}

impl AgentRole {
    /// Role given to agents cloned by an agent of this role.
    pub fn child_role(&self) -> AgentRole {
        AgentRole::Worker
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "coordinator"),
            AgentRole::UserFacing => write!(f, "user-facing"),
            AgentRole::Worker => write!(f, "worker"),
        }
    }
}

/// Phase of the roundabout loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CognitivePhase {
    #[default]
    Emerge,
    Adapt,
    Integrate,
}

impl std::fmt::Display for CognitivePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CognitivePhase::Emerge => write!(f, "EMERGE"),
            CognitivePhase::Adapt => write!(f, "ADAPT"),
            CognitivePhase::Integrate => write!(f, "INTEGRATE"),
        }
    }
}

/// Immutable configuration assigned to an agent at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationProfile {
    /// Model identifier handed to the task runtime.
    pub model: String,

    /// Tool capabilities the agent may use.
    #[serde(default)]
    pub toolkit: Vec<String>,

    /// Scope key for memory retrieval.
    #[serde(default = "default_memory_scope")]
    pub memory_scope: String,

    #[serde(default)]
    pub entry_phase: CognitivePhase,

    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,

    /// Optional ceiling; a root without one gets the governor default, a
    /// child's derived budget is additionally capped by it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_budget: Option<ResourceBudget>,
}

impl ConfigurationProfile {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            toolkit: Vec::new(),
            memory_scope: default_memory_scope(),
            entry_phase: CognitivePhase::Emerge,
            max_recursion_depth: default_max_recursion_depth(),
            resource_budget: None,
        }
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.resource_budget = Some(budget);
        self
    }

    pub fn with_toolkit(mut self, toolkit: Vec<String>) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

fn default_memory_scope() -> String {
    "task".to_string()
}

fn default_max_recursion_depth() -> u32 {
    3
}

/// Snapshot of an agent's cognitive state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub phase: CognitivePhase,
    /// Attunement to the user, in `[0, 1]`.
    pub resonance: f64,
    /// Self-assessed likelihood of completing the task, in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AgentState {
    pub fn initial(phase: CognitivePhase) -> Self {
        Self {
            phase,
            resonance: INITIAL_RESONANCE,
            confidence: INITIAL_CONFIDENCE,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub phase: CognitivePhase,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(phase: CognitivePhase, error: impl Into<String>) -> Self {
        Self {
            phase,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Read-only view returned by `CognitiveAgent::get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: AgentId,
    pub role: AgentRole,
    pub phase: CognitivePhase,
    pub active: bool,
    pub child_count: usize,
    pub resource_usage: ResourceUsage,
    pub last_activity: DateTime<Utc>,
    pub recursion_depth: u32,
    pub parent_id: Option<AgentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    /// In EMERGE and active.
    Running,
    Adapting,
    Integrating,
    /// Stuck or otherwise judged failed by the parent.
    Failed,
    Inactive,
    /// The child's status could not be read.
    Error,
}

impl std::fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChildStatus::Running => "running",
            ChildStatus::Adapting => "adapting",
            ChildStatus::Integrating => "integrating",
            ChildStatus::Failed => "failed",
            ChildStatus::Inactive => "inactive",
            ChildStatus::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// Parent-side summary of one child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildAgentReport {
    pub child_id: AgentId,
    pub task_definition: String,
    pub status: ChildStatus,
    pub resource_usage: ResourceUsage,
    /// Milliseconds since the child was created.
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationFailure {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub error: String,
}

/// Outcome of a cascading termination. `terminated` lists the final status of
/// every agent in the subtree, descendants before ancestors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminationReport {
    pub terminated: Vec<AgentStatus>,
    pub failures: Vec<TerminationFailure>,
}

impl TerminationReport {
    pub fn merge(&mut self, other: TerminationReport) {
        self.terminated.extend(other.terminated);
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
