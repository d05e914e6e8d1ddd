// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure types and decision functions. Nothing here performs I/O or holds
//! shared state; the application layer owns both.

pub mod agent;
pub mod communication;
pub mod config;
pub mod context_thread;
pub mod events;
pub mod governance;
pub mod resource;
pub mod roundabout;
pub mod runtime;
