// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `arbor-core`: Governed Agent Control Plane
//!
//! Decides whether a resource-consuming action may proceed and how agents are
//! born, supervised and retired.
//!
//! | Layer | Contents |
//! |-------|----------|
//! | [`domain`] | budgets, context threads, agent state, governance types, roundabout state machine |
//! | [`application`] | `ResourceGovernor`, `CognitiveAgent` |
//! | [`infrastructure`] | event bus, simulated task runtime, in-memory retriever |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{
    AgentError, AgentServices, CognitiveAgent, ResourceGovernor, RoundaboutOutcome,
};
