// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Collaborator ports for the cognitive agent. Task execution (LLM and tool
// calls) and memory retrieval are opaque to the control plane; it only sees
// the reported cost and a success signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentId, AgentRole};
use crate::domain::resource::ResourceUsage;
use crate::domain::roundabout::PlanApproach;

/// One EMERGE attempt handed to the task runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub agent_id: AgentId,
    pub role: AgentRole,
    pub model: String,
    pub top_level_goal: String,
    pub task_definition: String,
    pub toolkit: Vec<String>,
    pub memory_scope: String,
    /// 1-based count of EMERGE attempts by this agent.
    pub attempt: u32,
    /// Approach chosen by the last INTEGRATE phase, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanApproach>,
    #[serde(default)]
    pub context: Vec<MemorySnippet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub result: serde_json::Value,
    /// Resources actually consumed by the attempt.
    pub usage: ResourceUsage,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutput {
    pub fn succeeded(result: serde_json::Value, usage: ResourceUsage) -> Self {
        Self {
            result,
            usage,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, usage: ResourceUsage) -> Self {
        Self {
            result: serde_json::Value::Null,
            usage,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub agent_id: AgentId,
    pub state: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Failed to execute task: {0}")]
    ExecutionFailed(String),
    #[error("Failed to terminate agent: {0}")]
    TerminationFailed(String),
    #[error("Failed to read agent status: {0}")]
    StatusUnavailable(String),
    #[error("Memory retrieval failed: {0}")]
    RetrievalFailed(String),
}

/// Executes the opaque work of an agent and owns whatever external
/// resources it holds (sessions, sandboxes).
#[async_trait]
pub trait TaskRuntime: Send + Sync {
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutput, RuntimeError>;
    async fn status(&self, agent_id: AgentId) -> Result<RuntimeStatus, RuntimeError>;
    async fn terminate(&self, agent_id: AgentId) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub content: String,
    pub relevance: f64,
}

/// Supplies context for EMERGE attempts.
#[async_trait]
pub trait MemoryRetriever: Send + Sync {
    async fn retrieve(
        &self,
        memory_scope: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, RuntimeError>;
}
