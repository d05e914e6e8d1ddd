// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, AgentRole, CognitivePhase};
use crate::domain::governance::{CircuitState, Operation, SystemTempo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernorEvent {
    ApprovalDenied {
        agent_id: AgentId,
        operation: Operation,
        reason: String,
        denied_at: DateTime<Utc>,
    },
    CircuitBreakerTransitioned {
        from: CircuitState,
        to: CircuitState,
        reason: String,
        transitioned_at: DateTime<Utc>,
    },
    CostSpikeDetected {
        agent_id: AgentId,
        ratio: f64,
        detected_at: DateTime<Utc>,
    },
    TempoChanged {
        from: SystemTempo,
        to: SystemTempo,
        changed_at: DateTime<Utc>,
    },
    HierarchyPaused {
        root_id: AgentId,
        reason: String,
        paused_at: DateTime<Utc>,
    },
    HierarchyResumed {
        root_id: AgentId,
        resumed_at: DateTime<Utc>,
    },
    AgentRemoved {
        agent_id: AgentId,
        removed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentCreated {
        agent_id: AgentId,
        role: AgentRole,
        created_at: DateTime<Utc>,
    },
    AgentCloned {
        parent_id: AgentId,
        child_id: AgentId,
        recursion_depth: u32,
        cloned_at: DateTime<Utc>,
    },
    PhaseChanged {
        agent_id: AgentId,
        from: CognitivePhase,
        to: CognitivePhase,
        changed_at: DateTime<Utc>,
    },
    AgentHalted {
        agent_id: AgentId,
        reason: String,
        halted_at: DateTime<Utc>,
    },
    AgentTerminated {
        agent_id: AgentId,
        terminated_at: DateTime<Utc>,
    },
}
