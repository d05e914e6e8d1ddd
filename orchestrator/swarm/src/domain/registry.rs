// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Registry value types.

use arbor_core::domain::agent::{AgentId, AgentRole, AgentStatus, CognitivePhase};
use arbor_core::domain::resource::ResourceUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FactoryError {
    #[error("Agent {0} is not registered with the factory")]
    AgentNotFound(AgentId),

    /// The governor already tracks as many agents as the system allows.
    #[error("Cannot create agent: maximum system agents reached ({tracked}/{limit})")]
    CapacityReached { tracked: usize, limit: usize },
}

/// Flat, serializable view of one agent in a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub role: AgentRole,
    pub phase: CognitivePhase,
    pub active: bool,
    pub parent_id: Option<AgentId>,
    pub recursion_depth: u32,
    pub task_definition: String,
    pub child_count: usize,
    pub resource_usage: ResourceUsage,
    pub last_activity: DateTime<Utc>,
}

impl AgentSummary {
    pub fn from_status(status: AgentStatus, task_definition: impl Into<String>) -> Self {
        Self {
            id: status.id,
            role: status.role,
            phase: status.phase,
            active: status.active,
            parent_id: status.parent_id,
            recursion_depth: status.recursion_depth,
            task_definition: task_definition.into(),
            child_count: status.child_count,
            resource_usage: status.resource_usage,
            last_activity: status.last_activity,
        }
    }
}
