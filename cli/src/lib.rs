// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Arbor CLI library - exposes the command handlers so they can be tested
//! without spawning the binary.

pub mod commands;
