// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Context Thread
//!
//! The task-scoped record an agent executes against: goal, task, budget and
//! lineage. Roots sit at depth 0; a child thread is always one deeper than
//! the thread of the agent that cloned it and carries a budget carved out of
//! that agent's *remaining* budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{AgentId, ConfigurationProfile};
use crate::domain::resource::{ResourceBudget, ResourceUsage};

/// Share of the parent's remaining budget handed to each child.
pub const CHILD_BUDGET_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextThreadId(pub Uuid);

impl ContextThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextThreadId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextThread {
    pub id: ContextThreadId,
    pub top_level_goal: String,
    pub task_definition: String,
    pub profile: ConfigurationProfile,
    pub memory_scope: String,
    pub resource_budget: ResourceBudget,
    pub recursion_depth: u32,
    pub parent_agent_id: Option<AgentId>,
    pub workspace_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContextThread {
    /// Thread for a root agent. The profile's budget wins over `default_budget`.
    pub fn root(
        goal: impl Into<String>,
        task_definition: impl Into<String>,
        profile: ConfigurationProfile,
        default_budget: ResourceBudget,
    ) -> Self {
        let now = Utc::now();
        let goal = goal.into();
        let resource_budget = profile.resource_budget.unwrap_or(default_budget);
        Self {
            id: ContextThreadId::new(),
            workspace_branch: default_branch(&goal),
            top_level_goal: goal,
            task_definition: task_definition.into(),
            memory_scope: profile.memory_scope.clone(),
            profile,
            resource_budget,
            recursion_depth: 0,
            parent_agent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Thread for a child of the agent `parent_id` executing against `self`.
    /// `parent_usage` is what that agent has consumed so far.
    pub fn child(
        &self,
        parent_id: AgentId,
        parent_usage: &ResourceUsage,
        profile: ConfigurationProfile,
        task_definition: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let resource_budget = derive_child_budget(
            &self.resource_budget,
            parent_usage,
            profile.resource_budget.as_ref(),
        );
        Self {
            id: ContextThreadId::new(),
            top_level_goal: self.top_level_goal.clone(),
            task_definition: task_definition.into(),
            memory_scope: profile.memory_scope.clone(),
            profile,
            resource_budget,
            recursion_depth: self.recursion_depth + 1,
            parent_agent_id: Some(parent_id),
            workspace_branch: self.workspace_branch.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_agent_id.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Portion of the parent's unconsumed budget, optionally capped by the
/// child's own profile budget. Never exceeds `parent_budget - parent_usage`.
pub fn derive_child_budget(
    parent_budget: &ResourceBudget,
    parent_usage: &ResourceUsage,
    requested: Option<&ResourceBudget>,
) -> ResourceBudget {
    let share = parent_budget
        .remaining_after(parent_usage)
        .scaled(CHILD_BUDGET_FRACTION);
    match requested {
        Some(requested) => share.capped_by(requested),
        None => share,
    }
}

fn default_branch(goal: &str) -> String {
    let slug: String = goal
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "main".to_string()
    } else {
        format!("task/{}", slug.chars().take(40).collect::<String>())
    }
}
