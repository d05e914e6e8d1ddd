// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Budget & Usage
//!
//! The four metered dimensions shared by every agent in the tree:
//!
//! | Dimension | Budget field | Usage field |
//! |-----------|--------------|-------------|
//! | LLM calls | `max_llm_calls` | `llm_calls` |
//! | Compute units | `max_compute_units` | `compute_units` |
//! | Storage | `max_storage_bytes` | `storage_bytes` |
//! | Wall-clock time | `max_execution_time_ms` | `execution_time_ms` |
//!
//! [`ResourceBudget`] is a ceiling, [`ResourceUsage`] is both an accumulated total
//! and a delta (the "partial budget" carried by approval requests). All values
//! are unsigned, so budgets are non-negative by construction.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Ceilings on the four resource dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub max_llm_calls: u64,
    pub max_compute_units: u64,
    pub max_storage_bytes: u64,
    pub max_execution_time_ms: u64,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            max_llm_calls: 100,
            max_compute_units: 10_000,
            max_storage_bytes: 100 * 1024 * 1024,
            max_execution_time_ms: 3_600_000,
        }
    }
}

impl ResourceBudget {
    pub fn zero() -> Self {
        Self {
            max_llm_calls: 0,
            max_compute_units: 0,
            max_storage_bytes: 0,
            max_execution_time_ms: 0,
        }
    }

    /// What is left of this budget after `usage` has been consumed.
    pub fn remaining_after(&self, usage: &ResourceUsage) -> ResourceBudget {
        ResourceBudget {
            max_llm_calls: self.max_llm_calls.saturating_sub(usage.llm_calls),
            max_compute_units: self.max_compute_units.saturating_sub(usage.compute_units),
            max_storage_bytes: self.max_storage_bytes.saturating_sub(usage.storage_bytes),
            max_execution_time_ms: self
                .max_execution_time_ms
                .saturating_sub(usage.execution_time_ms),
        }
    }

    /// Every ceiling multiplied by `factor` (floored). Factors outside `[0, 1]`
    /// are clamped so the result never exceeds `self`.
    pub fn scaled(&self, factor: f64) -> ResourceBudget {
        let factor = factor.clamp(0.0, 1.0);
        let scale = |value: u64| (value as f64 * factor).floor() as u64;
        ResourceBudget {
            max_llm_calls: scale(self.max_llm_calls),
            max_compute_units: scale(self.max_compute_units),
            max_storage_bytes: scale(self.max_storage_bytes),
            max_execution_time_ms: scale(self.max_execution_time_ms),
        }
    }

    /// Field-wise minimum of the two budgets.
    pub fn capped_by(&self, other: &ResourceBudget) -> ResourceBudget {
        ResourceBudget {
            max_llm_calls: self.max_llm_calls.min(other.max_llm_calls),
            max_compute_units: self.max_compute_units.min(other.max_compute_units),
            max_storage_bytes: self.max_storage_bytes.min(other.max_storage_bytes),
            max_execution_time_ms: self.max_execution_time_ms.min(other.max_execution_time_ms),
        }
    }

    /// True when no dimension of `self` exceeds the matching dimension of `other`.
    pub fn fits_within(&self, other: &ResourceBudget) -> bool {
        self.max_llm_calls <= other.max_llm_calls
            && self.max_compute_units <= other.max_compute_units
            && self.max_storage_bytes <= other.max_storage_bytes
            && self.max_execution_time_ms <= other.max_execution_time_ms
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_llm_calls == 0
            || self.max_compute_units == 0
            || self.max_execution_time_ms == 0
    }
}

/// Consumed (or estimated) resources. Missing dimensions of a partial
/// estimate are simply zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub llm_calls: u64,
    #[serde(default)]
    pub compute_units: u64,
    #[serde(default)]
    pub storage_bytes: u64,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ResourceUsage {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn llm_calls(count: u64) -> Self {
        Self {
            llm_calls: count,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// True iff every dimension stays within the matching ceiling.
    pub fn within(&self, budget: &ResourceBudget) -> bool {
        self.llm_calls <= budget.max_llm_calls
            && self.compute_units <= budget.max_compute_units
            && self.storage_bytes <= budget.max_storage_bytes
            && self.execution_time_ms <= budget.max_execution_time_ms
    }

    /// Values as an array in dimension order, for per-dimension statistics.
    pub fn dimensions(&self) -> [u64; 4] {
        [
            self.llm_calls,
            self.compute_units,
            self.storage_bytes,
            self.execution_time_ms,
        ]
    }

    pub fn saturating_sub(&self, other: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            llm_calls: self.llm_calls.saturating_sub(other.llm_calls),
            compute_units: self.compute_units.saturating_sub(other.compute_units),
            storage_bytes: self.storage_bytes.saturating_sub(other.storage_bytes),
            execution_time_ms: self.execution_time_ms.saturating_sub(other.execution_time_ms),
        }
    }
}

impl Add for ResourceUsage {
    type Output = ResourceUsage;

    fn add(self, rhs: ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            llm_calls: self.llm_calls.saturating_add(rhs.llm_calls),
            compute_units: self.compute_units.saturating_add(rhs.compute_units),
            storage_bytes: self.storage_bytes.saturating_add(rhs.storage_bytes),
            execution_time_ms: self.execution_time_ms.saturating_add(rhs.execution_time_ms),
        }
    }
}

impl AddAssign for ResourceUsage {
    fn add_assign(&mut self, rhs: ResourceUsage) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for ResourceUsage {
    fn sum<I: Iterator<Item = ResourceUsage>>(iter: I) -> Self {
        iter.fold(ResourceUsage::zero(), |acc, usage| acc + usage)
    }
}
