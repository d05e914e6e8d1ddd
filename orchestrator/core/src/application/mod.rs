// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cognitive_agent;
pub mod governor;

pub use cognitive_agent::{AgentError, AgentServices, CognitiveAgent, RoundaboutOutcome};
pub use governor::ResourceGovernor;
