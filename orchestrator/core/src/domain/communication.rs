// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Communication strategy helpers used by user-facing agents. The scoring is
// intentionally simple: the agent state and the user state are compared on
// two axes and the gap picks one of three response strategies.

use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentState;

/// Gap below which the agent simply mirrors the user.
const MIRROR_THRESHOLD: f64 = 0.2;
/// Engagement gap at which the agent stops talking and listens.
const LISTEN_THRESHOLD: f64 = -0.3;
/// Fraction of the resonance gap closed per exchange.
const RESONANCE_STEP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Sentiment in `[-1, 1]`.
    pub valence: f64,
    /// Engagement in `[0, 1]`.
    pub engagement: f64,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            valence: 0.0,
            engagement: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationalDelta {
    /// User engagement minus agent resonance.
    pub resonance_gap: f64,
    /// Normalised user sentiment minus agent confidence.
    pub confidence_gap: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    Mirror,
    Harmonize,
    Listen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub text: String,
    #[serde(default)]
    pub user_state: UserState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub strategy: ResponseStrategy,
    pub delta: RelationalDelta,
    pub message: String,
    /// Agent resonance after the exchange.
    pub resonance: f64,
}

pub fn calculate_relational_delta(agent: &AgentState, user: &UserState) -> RelationalDelta {
    let resonance_gap = user.engagement.clamp(0.0, 1.0) - agent.resonance;
    let confidence_gap = (user.valence.clamp(-1.0, 1.0) + 1.0) / 2.0 - agent.confidence;
    RelationalDelta {
        resonance_gap,
        confidence_gap,
        magnitude: (resonance_gap.powi(2) + confidence_gap.powi(2)).sqrt(),
    }
}

pub fn choose_strategy(delta: &RelationalDelta) -> ResponseStrategy {
    if delta.magnitude < MIRROR_THRESHOLD {
        ResponseStrategy::Mirror
    } else if delta.resonance_gap <= LISTEN_THRESHOLD {
        ResponseStrategy::Listen
    } else {
        ResponseStrategy::Harmonize
    }
}

/// Resonance after one exchange: moves part of the way toward the user.
pub fn adjusted_resonance(agent: &AgentState, delta: &RelationalDelta) -> f64 {
    (agent.resonance + RESONANCE_STEP * delta.resonance_gap).clamp(0.0, 1.0)
}

pub fn compose_response(agent: &AgentState, input: &UserInput) -> AgentResponse {
    let delta = calculate_relational_delta(agent, &input.user_state);
    let strategy = choose_strategy(&delta);
    let message = match strategy {
        ResponseStrategy::Mirror => format!("Understood: {}", input.text.trim()),
        ResponseStrategy::Harmonize => "Let me connect that to what we are working on.".to_string(),
        ResponseStrategy::Listen => "I'm listening. Tell me more.".to_string(),
    };
    AgentResponse {
        strategy,
        delta,
        message,
        resonance: adjusted_resonance(agent, &delta),
    }
}
