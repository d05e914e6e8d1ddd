// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Governance Types
//!
//! Requests, responses and state labels of the resource governor.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Operation`] | closed set of metered operation kinds |
//! | [`ApprovalRequest`] / [`ApprovalResponse`] | one approval round-trip |
//! | [`ExternalApprovalRequest`] | untrusted form with the operation as a string |
//! | [`CircuitState`] | closed / half-open / open |
//! | [`SystemTempo`] | global throttle level |
//! | [`SystemMetrics`] / [`SystemStatus`] | read-only snapshots |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::agent::AgentId;
use crate::domain::context_thread::ContextThread;
use crate::domain::resource::{ResourceBudget, ResourceUsage};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Unknown operation type: {0}")]
    UnknownOperation(String),

    #[error("Unknown system tempo: {0}")]
    UnknownTempo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CloneAgent,
    LlmCall,
    MemoryAccess,
    ExternalApi,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CloneAgent => "clone_agent",
            Operation::LlmCall => "llm_call",
            Operation::MemoryAccess => "memory_access",
            Operation::ExternalApi => "external_api",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clone_agent" => Ok(Operation::CloneAgent),
            "llm_call" => Ok(Operation::LlmCall),
            "memory_access" => Ok(Operation::MemoryAccess),
            "external_api" => Ok(Operation::ExternalApi),
            other => Err(GovernanceError::UnknownOperation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub operation: Operation,
    pub requesting_agent_id: AgentId,
    pub estimated_cost: ResourceUsage,
    /// The requesting agent's own context thread.
    pub context_thread: ContextThread,
}

impl ApprovalRequest {
    pub fn new(
        operation: Operation,
        requesting_agent_id: AgentId,
        estimated_cost: ResourceUsage,
        context_thread: ContextThread,
    ) -> Self {
        Self {
            operation,
            requesting_agent_id,
            estimated_cost,
            context_thread,
        }
    }
}

/// Approval request as received from outside the process (dispatcher, UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalApprovalRequest {
    pub operation: String,
    pub requesting_agent_id: AgentId,
    #[serde(default)]
    pub estimated_cost: ResourceUsage,
    pub context_thread: ContextThread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_budget: Option<ResourceBudget>,
}

impl ApprovalResponse {
    pub fn approve(reason: impl Into<String>, updated_budget: ResourceBudget) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            updated_budget: Some(updated_budget),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            updated_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::HalfOpen => write!(f, "half-open"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SystemTempo {
    #[default]
    #[serde(rename = "High-Performance")]
    HighPerformance,
    #[serde(rename = "Low-Intensity")]
    LowIntensity,
    #[serde(rename = "Sleep")]
    Sleep,
}

impl SystemTempo {
    /// One step slower; Sleep stays Sleep.
    pub fn step_down(&self) -> SystemTempo {
        match self {
            SystemTempo::HighPerformance => SystemTempo::LowIntensity,
            SystemTempo::LowIntensity | SystemTempo::Sleep => SystemTempo::Sleep,
        }
    }
}

impl std::fmt::Display for SystemTempo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemTempo::HighPerformance => write!(f, "High-Performance"),
            SystemTempo::LowIntensity => write!(f, "Low-Intensity"),
            SystemTempo::Sleep => write!(f, "Sleep"),
        }
    }
}

impl FromStr for SystemTempo {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "high-performance" | "high" => Ok(SystemTempo::HighPerformance),
            "low-intensity" | "low" => Ok(SystemTempo::LowIntensity),
            "sleep" => Ok(SystemTempo::Sleep),
            _ => Err(GovernanceError::UnknownTempo(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub agent_id: AgentId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausedHierarchy {
    pub root_id: AgentId,
    pub reason: String,
    pub paused_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerInfo {
    pub status: CircuitState,
    pub error_rate: f64,
    pub cost_spike: bool,
    pub last_transition: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub active_agents: usize,
    pub total_resource_usage: ResourceUsage,
    pub circuit_breaker_info: CircuitBreakerInfo,
    pub system_tempo: SystemTempo,
    pub error_history: Vec<ErrorEntry>,
    pub paused_hierarchies: Vec<PausedHierarchy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    /// Breaker half-open, tempo reduced or hierarchies paused.
    Degraded,
    /// Breaker open or tempo Sleep.
    Halted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub health: HealthLevel,
    pub metrics: SystemMetrics,
}
