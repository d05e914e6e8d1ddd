// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `arbor-swarm`: Agent Factory
//!
//! Owns the root agents of every delegation tree. Children are owned by their
//! parents inside `arbor-core`; this crate only holds the roots and resolves
//! the weak parent ids agents carry.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `AgentSummary`, `FactoryError` |
//! | [`application`] | Application | `AgentFactory` |
//!
//! ## Key Concepts
//!
//! - **Root agent**: created through [`application::AgentFactory::create_agent`]
//!   and tracked with the governor without a parent.
//! - **Resolution**: any agent in any tree can be found by id through
//!   [`application::AgentFactory::resolve`]; a parent id is resolved the same way.
//! - **Bulk termination**: [`application::AgentFactory::terminate_all`] cascades
//!   through every tree and empties the registry.

pub mod application;
pub mod domain;

pub use application::AgentFactory;
pub use domain::*;
