// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Governor
//!
//! Single writer of system-wide counters. Every metered action of every agent
//! passes through [`ResourceGovernor::request_approval`], and every consumed
//! resource is reported back through [`ResourceGovernor::update_resource_usage`].
//!
//! ## Approval Order
//! | Step | Denies when | Reason contains |
//! |------|-------------|-----------------|
//! | 1. circuit breaker | open, or half-open with trials used up | `circuit breaker is open` / `half-open` |
//! | 2. tempo | Sleep, unless `memory_access` | `Sleep mode` |
//! | 3. hierarchy pause | requester or an ancestor is paused | `hierarchy is paused` |
//! | 4a. `clone_agent` | depth, agent ceiling, safety margin | `Maximum recursion depth`, `Maximum system agents`, `Insufficient resource budget` |
//! | 4b. quota operations | matching ceiling × tempo factor exceeded | `quota exceeded` |
//!
//! ## Circuit Breaker
//! ```text
//! closed ──error rate / cost spike──▶ open ──cool-down / operator──▶ half-open
//!   ▲                                   ▲                                │
//!   └────── trial usage reported ───────┼────── trial error recorded ────┘
//! ```
//!
//! Only agents granted a half-open trial decide its outcome. Errors from
//! requesters the breaker turned away are recorded but do not reopen it.
//!
//! All state sits behind one `parking_lot::Mutex`; each public method takes
//! the lock exactly once, so callers observe every operation as atomic.
//! Domain events are published after the lock is released.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::domain::agent::AgentId;
use crate::domain::config::{GovernorConfigManifest, SystemResourceLimits};
use crate::domain::context_thread::ContextThread;
use crate::domain::events::GovernorEvent;
use crate::domain::governance::{
    ApprovalRequest, ApprovalResponse, CircuitBreakerInfo, CircuitState, ErrorEntry,
    ExternalApprovalRequest, HealthLevel, Operation, PausedHierarchy, SystemMetrics, SystemStatus,
    SystemTempo,
};
use crate::domain::resource::{ResourceBudget, ResourceUsage};
use crate::infrastructure::event_bus::EventBus;

/// Previous deltas needed before a cost spike can be detected.
const MIN_SPIKE_BASELINE: usize = 3;

pub struct ResourceGovernor {
    limits: SystemResourceLimits,
    default_budget: ResourceBudget,
    state: Mutex<GovernorState>,
    event_bus: Option<EventBus>,
}

struct BreakerState {
    status: CircuitState,
    opened_at: Option<DateTime<Utc>>,
    last_transition: DateTime<Utc>,
    trials_granted: u32,
    /// agents holding a half-open trial
    trial_agents: HashSet<AgentId>,
    cost_spike: bool,
}

struct GovernorState {
    usage: HashMap<AgentId, ResourceUsage>,
    /// agent -> parent, for every tracked agent
    lineage: HashMap<AgentId, Option<AgentId>>,
    error_history: VecDeque<ErrorEntry>,
    operations: VecDeque<DateTime<Utc>>,
    /// recent usage deltas per agent, oldest first
    usage_samples: HashMap<AgentId, VecDeque<(DateTime<Utc>, ResourceUsage)>>,
    breaker: BreakerState,
    tempo: SystemTempo,
    paused: HashMap<AgentId, PausedHierarchy>,
    pending_events: Vec<GovernorEvent>,
}

impl ResourceGovernor {
    pub fn new(limits: SystemResourceLimits) -> Self {
        Self::with_defaults(limits, ResourceBudget::default(), SystemTempo::default())
    }

    pub fn from_manifest(manifest: &GovernorConfigManifest) -> Self {
        Self::with_defaults(
            manifest.spec.limits.clone(),
            manifest.spec.default_budget,
            manifest.spec.initial_tempo,
        )
    }

    fn with_defaults(
        limits: SystemResourceLimits,
        default_budget: ResourceBudget,
        tempo: SystemTempo,
    ) -> Self {
        let now = Utc::now();
        Self {
            limits,
            default_budget,
            state: Mutex::new(GovernorState {
                usage: HashMap::new(),
                lineage: HashMap::new(),
                error_history: VecDeque::new(),
                operations: VecDeque::new(),
                usage_samples: HashMap::new(),
                breaker: BreakerState {
                    status: CircuitState::Closed,
                    opened_at: None,
                    last_transition: now,
                    trials_granted: 0,
                    trial_agents: HashSet::new(),
                    cost_spike: false,
                },
                tempo,
                paused: HashMap::new(),
                pending_events: Vec::new(),
            }),
            event_bus: None,
        }
    }

    /// Publish governor events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn limits(&self) -> &SystemResourceLimits {
        &self.limits
    }

    /// Budget for root agents whose profile carries none.
    pub fn default_budget(&self) -> ResourceBudget {
        self.default_budget
    }

    /// Runs `f` as one atomic step, then publishes what it emitted.
    fn with_state<R>(&self, f: impl FnOnce(&mut GovernorState, DateTime<Utc>) -> R) -> R {
        let now = Utc::now();
        let (result, events) = {
            let mut state = self.state.lock();
            state.refresh(&self.limits, now);
            let result = f(&mut state, now);
            (result, std::mem::take(&mut state.pending_events))
        };
        if let Some(bus) = &self.event_bus {
            for event in events {
                bus.publish_governor_event(event);
            }
        }
        result
    }

    pub fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        let response = self.with_state(|state, now| {
            match state.evaluate(&self.limits, request) {
                Ok(updated_budget) => {
                    if state.breaker.status == CircuitState::HalfOpen {
                        state.breaker.trials_granted += 1;
                        state.breaker.trial_agents.insert(request.requesting_agent_id);
                    }
                    ApprovalResponse::approve(
                        format!("{} approved", request.operation),
                        updated_budget,
                    )
                }
                Err(reason) => {
                    state.pending_events.push(GovernorEvent::ApprovalDenied {
                        agent_id: request.requesting_agent_id,
                        operation: request.operation,
                        reason: reason.clone(),
                        denied_at: now,
                    });
                    ApprovalResponse::deny(reason)
                }
            }
        });

        let outcome = if response.approved { "approved" } else { "denied" };
        metrics::counter!(
            "arbor_approvals_total",
            "operation" => request.operation.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        if response.approved {
            debug!(
                agent_id = %request.requesting_agent_id,
                operation = %request.operation,
                "Approval granted"
            );
        } else {
            warn!(
                agent_id = %request.requesting_agent_id,
                operation = %request.operation,
                reason = %response.reason,
                "Approval denied"
            );
        }
        response
    }

    /// Approval entry point for requests arriving from outside the process,
    /// where the operation is still an unchecked string. An unknown operation
    /// is only reported once the breaker, tempo and pause checks pass.
    pub fn request_approval_external(
        &self,
        request: &ExternalApprovalRequest,
    ) -> ApprovalResponse {
        let unknown = match request.operation.parse::<Operation>() {
            Ok(operation) => {
                return self.request_approval(&ApprovalRequest::new(
                    operation,
                    request.requesting_agent_id,
                    request.estimated_cost,
                    request.context_thread.clone(),
                ));
            }
            Err(e) => e,
        };

        let reason = self.with_state(|state, _| {
            state
                .screen(
                    &self.limits,
                    request.requesting_agent_id,
                    &request.context_thread,
                    &request.operation,
                )
                .err()
                .unwrap_or_else(|| unknown.to_string())
        });

        warn!(
            agent_id = %request.requesting_agent_id,
            operation = %request.operation,
            reason = %reason,
            "Rejecting malformed approval request"
        );
        metrics::counter!(
            "arbor_approvals_total",
            "operation" => "unknown",
            "outcome" => "denied"
        )
        .increment(1);
        ApprovalResponse::deny(reason)
    }

    /// Starts tracking an agent with zero usage. Re-tracking keeps usage.
    pub fn track_agent(&self, agent_id: AgentId, parent_id: Option<AgentId>) {
        let tracked = self.with_state(|state, _| {
            state.usage.entry(agent_id).or_default();
            state.lineage.insert(agent_id, parent_id);
            state.usage.len()
        });
        metrics::gauge!("arbor_tracked_agents").set(tracked as f64);
        debug!(agent_id = %agent_id, parent_id = ?parent_id, tracked, "Tracking agent");
    }

    pub fn update_resource_usage(&self, agent_id: AgentId, delta: ResourceUsage) {
        self.with_state(|state, now| {
            *state.usage.entry(agent_id).or_default() += delta;
            state.operations.push_back(now);

            let samples = state.usage_samples.entry(agent_id).or_default();
            let ratio = spike_ratio(samples.iter().map(|(_, d)| d), &delta);
            samples.push_back((now, delta));

            match ratio {
                Some(ratio) if ratio > self.limits.circuit_breaker.cost_spike_threshold => {
                    let root = state.hierarchy_root(agent_id);
                    warn!(
                        agent_id = %agent_id,
                        root_id = %root,
                        ratio,
                        "Cost spike detected"
                    );
                    state.pending_events.push(GovernorEvent::CostSpikeDetected {
                        agent_id,
                        ratio,
                        detected_at: now,
                    });
                    let reason = format!("cost spike detected (ratio {:.1})", ratio);
                    state.pause(root, reason, now);
                    state.breaker.cost_spike = true;
                    state.transition(CircuitState::Open, "cost spike", now);
                    metrics::counter!("arbor_circuit_breaker_trips_total", "cause" => "cost_spike")
                        .increment(1);
                }
                _ if state.holds_trial(agent_id) => {
                    state.transition(CircuitState::Closed, "successful trial", now);
                }
                _ => {}
            }
        });
    }

    pub fn record_error(&self, agent_id: AgentId, message: impl Into<String>) {
        let message = message.into();
        metrics::counter!("arbor_errors_recorded_total").increment(1);
        warn!(agent_id = %agent_id, error = %message, "Recording agent error");

        self.with_state(|state, now| {
            state.error_history.push_back(ErrorEntry {
                agent_id,
                message,
                timestamp: now,
            });

            let breaker = &self.limits.circuit_breaker;
            match state.breaker.status {
                CircuitState::HalfOpen if state.holds_trial(agent_id) => {
                    state.transition(CircuitState::Open, "failure during half-open trial", now);
                }
                CircuitState::HalfOpen => {
                    debug!(agent_id = %agent_id, "Error from non-trial agent while half-open");
                }
                CircuitState::Closed => {
                    let errors = state.error_history.len();
                    let samples = errors + state.operations.len();
                    let rate = state.error_rate();
                    if samples >= breaker.minimum_samples && rate >= breaker.error_rate_threshold {
                        let reason = format!(
                            "error rate {:.2} reached threshold {:.2}",
                            rate, breaker.error_rate_threshold
                        );
                        state.transition(CircuitState::Open, &reason, now);
                        metrics::counter!(
                            "arbor_circuit_breaker_trips_total",
                            "cause" => "error_rate"
                        )
                        .increment(1);

                        if errors >= self.limits.tempo.tempo_error_volume {
                            let next = state.tempo.step_down();
                            state.set_tempo(next, now);
                        }
                    }
                }
                CircuitState::Open => {}
            }
        });
    }

    /// True iff the agent's cumulative usage fits every ceiling of the
    /// thread's budget. Agents without usage history always fit.
    pub fn check_resource_limits(&self, agent_id: AgentId, context_thread: &ContextThread) -> bool {
        let state = self.state.lock();
        state
            .usage
            .get(&agent_id)
            .is_none_or(|usage| usage.within(&context_thread.resource_budget))
    }

    pub fn agent_usage(&self, agent_id: AgentId) -> Option<ResourceUsage> {
        self.state.lock().usage.get(&agent_id).copied()
    }

    /// Purges the agent's usage, lineage, samples and error entries.
    pub fn remove_agent(&self, agent_id: AgentId) {
        let tracked = self.with_state(|state, now| {
            let was_tracked = state.usage.remove(&agent_id).is_some();
            state.lineage.remove(&agent_id);
            state.usage_samples.remove(&agent_id);
            state.error_history.retain(|entry| entry.agent_id != agent_id);
            if was_tracked {
                state.pending_events.push(GovernorEvent::AgentRemoved {
                    agent_id,
                    removed_at: now,
                });
            }
            state.usage.len()
        });
        metrics::gauge!("arbor_tracked_agents").set(tracked as f64);
        debug!(agent_id = %agent_id, tracked, "Removed agent from governor");
    }

    pub fn pause_agent_hierarchy(&self, root_id: AgentId, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|state, now| state.pause(root_id, reason, now));
    }

    pub fn resume_agent_hierarchy(&self, root_id: AgentId) {
        self.with_state(|state, now| {
            if state.paused.remove(&root_id).is_some() {
                info!(root_id = %root_id, "Agent hierarchy resumed");
                state.pending_events.push(GovernorEvent::HierarchyResumed {
                    root_id,
                    resumed_at: now,
                });
            }
        });
    }

    pub fn is_hierarchy_paused(&self, root_id: AgentId) -> bool {
        self.state.lock().paused.contains_key(&root_id)
    }

    pub fn set_system_tempo(&self, tempo: SystemTempo) {
        self.with_state(|state, now| state.set_tempo(tempo, now));
    }

    pub fn get_system_tempo(&self) -> SystemTempo {
        self.state.lock().tempo
    }

    /// Operator override of the breaker state.
    pub fn set_circuit_breaker_state(&self, status: CircuitState) {
        self.with_state(|state, now| state.transition(status, "operator override", now));
    }

    pub fn circuit_breaker_state(&self) -> CircuitState {
        self.with_state(|state, _| state.breaker.status)
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        self.with_state(|state, _| state.metrics())
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let metrics = self.get_system_metrics();
        let health = match (metrics.circuit_breaker_info.status, metrics.system_tempo) {
            (CircuitState::Open, _) | (_, SystemTempo::Sleep) => HealthLevel::Halted,
            (CircuitState::HalfOpen, _) | (_, SystemTempo::LowIntensity) => HealthLevel::Degraded,
            _ if !metrics.paused_hierarchies.is_empty() => HealthLevel::Degraded,
            _ => HealthLevel::Healthy,
        };
        SystemStatus { health, metrics }
    }
}

impl Default for ResourceGovernor {
    fn default() -> Self {
        Self::new(SystemResourceLimits::default())
    }
}

impl GovernorState {
    /// Drops samples that left the window and applies the open → half-open
    /// cool-down. A window reaching past the representable time range purges
    /// nothing; a cool-down that cannot be represented never elapses.
    fn refresh(&mut self, limits: &SystemResourceLimits, now: DateTime<Utc>) {
        let breaker = &limits.circuit_breaker;
        let cutoff = span(breaker.time_window_ms).and_then(|window| now.checked_sub_signed(window));

        if let Some(cutoff) = cutoff {
            while self.error_history.front().is_some_and(|e| e.timestamp < cutoff) {
                self.error_history.pop_front();
            }
            while self.operations.front().is_some_and(|t| *t < cutoff) {
                self.operations.pop_front();
            }
            for samples in self.usage_samples.values_mut() {
                while samples.front().is_some_and(|(t, _)| *t < cutoff) {
                    samples.pop_front();
                }
            }
            self.usage_samples.retain(|_, samples| !samples.is_empty());
        }

        if self.breaker.status == CircuitState::Open {
            let cooldown = span(breaker.cooldown_ms);
            let cooled = self.breaker.opened_at.is_none_or(|opened| {
                cooldown.is_some_and(|cooldown| now.signed_duration_since(opened) >= cooldown)
            });
            if cooled {
                self.transition(CircuitState::HalfOpen, "cool-down elapsed", now);
            }
        }
    }

    /// Approval steps 1 to 3: breaker, tempo, hierarchy pause. They only
    /// need the operation's name, so malformed requests pass through here too.
    fn screen(
        &self,
        limits: &SystemResourceLimits,
        agent_id: AgentId,
        thread: &ContextThread,
        operation: &str,
    ) -> Result<(), String> {
        match self.breaker.status {
            CircuitState::Open => {
                return Err("Request denied: circuit breaker is open".to_string());
            }
            CircuitState::HalfOpen
                if self.breaker.trials_granted >= limits.circuit_breaker.half_open_max_trials =>
            {
                return Err(
                    "Request denied: circuit breaker is half-open: trial limit reached".to_string(),
                );
            }
            _ => {}
        }

        if self.tempo == SystemTempo::Sleep && operation != Operation::MemoryAccess.as_str() {
            return Err(format!(
                "Request denied: system is in Sleep mode ({} not permitted)",
                operation
            ));
        }

        if let Some(paused) = self.paused_ancestor(agent_id, thread) {
            return Err(format!(
                "Request denied: agent hierarchy is paused (root {}: {})",
                paused.root_id, paused.reason
            ));
        }

        Ok(())
    }

    /// Updated remaining budget on approval, denial reason otherwise.
    fn evaluate(
        &self,
        limits: &SystemResourceLimits,
        request: &ApprovalRequest,
    ) -> Result<ResourceBudget, String> {
        self.screen(
            limits,
            request.requesting_agent_id,
            &request.context_thread,
            request.operation.as_str(),
        )?;

        let thread = &request.context_thread;
        let budget = &thread.resource_budget;
        let current = self
            .usage
            .get(&request.requesting_agent_id)
            .copied()
            .unwrap_or_default();
        let committed = current + request.estimated_cost;

        match request.operation {
            Operation::CloneAgent => {
                if thread.recursion_depth >= limits.max_recursion_depth {
                    return Err(format!(
                        "Maximum recursion depth ({}) exceeded",
                        limits.max_recursion_depth
                    ));
                }

                let tracked = self.usage.len();
                if tracked >= limits.max_active_agents || tracked >= limits.max_system_agents {
                    let limit = limits.max_active_agents.min(limits.max_system_agents);
                    return Err(format!(
                        "Maximum system agents reached ({}/{})",
                        tracked, limit
                    ));
                }

                let allowed = budget.scaled(limits.budget_safety_margin);
                if !committed.within(&allowed) {
                    return Err(format!(
                        "Insufficient resource budget: committed usage would exceed {:.0}% \
                         of the assigned budget",
                        limits.budget_safety_margin * 100.0
                    ));
                }

                Ok(budget.remaining_after(&committed))
            }
            Operation::LlmCall | Operation::MemoryAccess | Operation::ExternalApi => {
                let factor = self.tempo_factor(limits);
                let scaled = budget.scaled(factor);
                let (used, ceiling) = match request.operation {
                    Operation::LlmCall => (committed.llm_calls, scaled.max_llm_calls),
                    Operation::MemoryAccess => (committed.storage_bytes, scaled.max_storage_bytes),
                    _ => (committed.compute_units, scaled.max_compute_units),
                };
                if used > ceiling {
                    return Err(format!(
                        "{} quota exceeded ({}/{} at {} tempo)",
                        request.operation, used, ceiling, self.tempo
                    ));
                }
                Ok(scaled.remaining_after(&committed))
            }
        }
    }

    fn tempo_factor(&self, limits: &SystemResourceLimits) -> f64 {
        match self.tempo {
            SystemTempo::HighPerformance => 1.0,
            SystemTempo::LowIntensity | SystemTempo::Sleep => limits.tempo.low_intensity_factor,
        }
    }

    /// First paused entry on the chain requester → parent → … → root.
    fn paused_ancestor(
        &self,
        agent_id: AgentId,
        thread: &ContextThread,
    ) -> Option<&PausedHierarchy> {
        let mut seen = HashSet::new();
        let mut cursor = Some(agent_id);
        while let Some(id) = cursor {
            if let Some(paused) = self.paused.get(&id) {
                return Some(paused);
            }
            if !seen.insert(id) {
                break;
            }
            let parent = self.lineage.get(&id).copied().flatten();
            cursor = match parent {
                None if id == agent_id => thread.parent_agent_id,
                parent => parent,
            };
        }
        None
    }

    fn holds_trial(&self, agent_id: AgentId) -> bool {
        self.breaker.status == CircuitState::HalfOpen
            && self.breaker.trial_agents.contains(&agent_id)
    }

    /// Topmost known ancestor of `agent_id` (itself for roots).
    fn hierarchy_root(&self, agent_id: AgentId) -> AgentId {
        let mut seen = HashSet::from([agent_id]);
        let mut current = agent_id;
        while let Some(Some(parent)) = self.lineage.get(&current) {
            if !seen.insert(*parent) {
                break;
            }
            current = *parent;
        }
        current
    }

    fn pause(&mut self, root_id: AgentId, reason: String, now: DateTime<Utc>) {
        if self.paused.contains_key(&root_id) {
            return;
        }
        warn!(root_id = %root_id, reason = %reason, "Agent hierarchy paused");
        self.pending_events.push(GovernorEvent::HierarchyPaused {
            root_id,
            reason: reason.clone(),
            paused_at: now,
        });
        self.paused.insert(
            root_id,
            PausedHierarchy {
                root_id,
                reason,
                paused_at: now,
            },
        );
    }

    fn set_tempo(&mut self, tempo: SystemTempo, now: DateTime<Utc>) {
        if self.tempo == tempo {
            return;
        }
        info!(from = %self.tempo, to = %tempo, "System tempo changed");
        self.pending_events.push(GovernorEvent::TempoChanged {
            from: self.tempo,
            to: tempo,
            changed_at: now,
        });
        self.tempo = tempo;
    }

    fn transition(&mut self, to: CircuitState, reason: &str, now: DateTime<Utc>) {
        let from = self.breaker.status;
        if from == to {
            return;
        }

        self.breaker.status = to;
        self.breaker.last_transition = now;
        self.breaker.trials_granted = 0;
        self.breaker.trial_agents.clear();
        match to {
            CircuitState::Open => {
                self.breaker.opened_at = Some(now);
                warn!(from = %from, reason, "Circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                info!(from = %from, reason, "Circuit breaker half-open");
            }
            CircuitState::Closed => {
                self.breaker.opened_at = None;
                self.breaker.cost_spike = false;
                self.error_history.clear();
                self.operations.clear();
                info!(from = %from, reason, "Circuit breaker closed");
            }
        }

        self.pending_events.push(GovernorEvent::CircuitBreakerTransitioned {
            from,
            to,
            reason: reason.to_string(),
            transitioned_at: now,
        });
    }

    fn error_rate(&self) -> f64 {
        let errors = self.error_history.len();
        let total = errors + self.operations.len();
        if total == 0 {
            0.0
        } else {
            errors as f64 / total as f64
        }
    }

    fn metrics(&self) -> SystemMetrics {
        let mut paused_hierarchies: Vec<PausedHierarchy> =
            self.paused.values().cloned().collect();
        paused_hierarchies.sort_by_key(|p| p.paused_at);

        SystemMetrics {
            active_agents: self.usage.len(),
            total_resource_usage: self.usage.values().copied().sum(),
            circuit_breaker_info: CircuitBreakerInfo {
                status: self.breaker.status,
                error_rate: self.error_rate(),
                cost_spike: self.breaker.cost_spike,
                last_transition: self.breaker.last_transition,
            },
            system_tempo: self.tempo,
            error_history: self.error_history.iter().cloned().collect(),
            paused_hierarchies,
        }
    }
}

/// Milliseconds as a signed span, `None` when out of range.
fn span(ms: u64) -> Option<Duration> {
    i64::try_from(ms).ok().and_then(Duration::try_milliseconds)
}

/// Largest per-dimension ratio of `latest` to the mean of `previous`.
/// `None` until enough previous deltas exist; dimensions with a zero mean
/// are ignored.
fn spike_ratio<'a>(
    previous: impl ExactSizeIterator<Item = &'a ResourceUsage>,
    latest: &ResourceUsage,
) -> Option<f64> {
    let count = previous.len();
    if count < MIN_SPIKE_BASELINE {
        return None;
    }

    let mut sums = [0u64; 4];
    for delta in previous {
        for (sum, value) in sums.iter_mut().zip(delta.dimensions()) {
            *sum = sum.saturating_add(value);
        }
    }

    sums.iter()
        .zip(latest.dimensions())
        .filter(|(sum, _)| **sum > 0)
        .map(|(sum, value)| value as f64 / (*sum as f64 / count as f64))
        .reduce(f64::max)
}
