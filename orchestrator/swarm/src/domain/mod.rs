// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Factory Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`registry`] | `AgentSummary`, `FactoryError` |

pub mod registry;

pub use registry::*;
