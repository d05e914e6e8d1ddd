// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the root-agent registry.

pub mod agent_factory;

pub use agent_factory::AgentFactory;
