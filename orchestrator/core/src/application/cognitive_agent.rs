// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cognitive Agent
//!
//! A node in the delegation tree. Each agent owns its children outright
//! (`HashMap<AgentId, CognitiveAgent>`); the parent link is only an id,
//! resolved through the owning tree or the factory. Every metered action goes
//! through the shared [`ResourceGovernor`] first.
//!
//! ## Roundabout
//! One call to [`CognitiveAgent::execute_roundabout_loop`] runs the current
//! phase once:
//!
//! | Phase | Work | On success | On failure |
//! |-------|------|-----------|------------|
//! | EMERGE | task attempt through the [`TaskRuntime`] | stay in EMERGE, return result | → ADAPT, `EMERGE phase failed` |
//! | ADAPT | failure analysis + strategic decision | → INTEGRATE | stay, `Agent halted` |
//! | INTEGRATE | tactical plan | → EMERGE | → ADAPT, `Failed to create valid tactical plan` |
//!
//! [`CognitiveAgent::run_to_completion`] drives the loop until EMERGE succeeds
//! or the agent halts.
//!
//! ## Termination
//! [`CognitiveAgent::terminate`] detaches the whole subtree and retires it in
//! post-order. A failing runtime teardown is recorded against the parent and
//! never stops the cascade. Descendants that were already terminated on
//! their own are detached without being retired again.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::governor::ResourceGovernor;
use crate::domain::agent::{
    AgentId, AgentRole, AgentState, AgentStatus, ChildAgentReport, ChildStatus, CognitivePhase,
    ConfigurationProfile, FailureRecord, TerminationFailure, TerminationReport,
};
use crate::domain::communication::{self, AgentResponse, RelationalDelta, UserInput, UserState};
use crate::domain::context_thread::ContextThread;
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::governance::{ApprovalRequest, Operation};
use crate::domain::resource::ResourceUsage;
use crate::domain::roundabout::{
    self, AdaptationContext, DecisionContext, FailureAnalysis, PhaseOutcome, PlanApproach,
    StrategicDecision, TacticalPlan, TransitionError,
};
use crate::domain::runtime::{MemoryRetriever, MemorySnippet, TaskRequest, TaskRuntime};
use crate::infrastructure::event_bus::EventBus;

/// Cost charged to the parent for spawning a child.
pub const CLONE_COST: ResourceUsage = ResourceUsage {
    llm_calls: 1,
    compute_units: 10,
    storage_bytes: 0,
    execution_time_ms: 0,
};

/// Estimate submitted before an EMERGE attempt.
pub const TASK_ATTEMPT_ESTIMATE: ResourceUsage = ResourceUsage {
    llm_calls: 1,
    compute_units: 0,
    storage_bytes: 0,
    execution_time_ms: 0,
};

/// Estimate submitted before a memory retrieval.
pub const MEMORY_ACCESS_ESTIMATE: ResourceUsage = ResourceUsage {
    llm_calls: 0,
    compute_units: 0,
    storage_bytes: 4096,
    execution_time_ms: 0,
};

const MEMORY_SNIPPET_LIMIT: usize = 5;
const CONFIDENCE_GAIN: f64 = 0.05;
const CONFIDENCE_LOSS: f64 = 0.1;

/// Children idle in ADAPT longer than this are reported as failed.
pub fn stale_adapt_threshold() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent cloning denied: {0}")]
    CloneDenied(String),

    #[error("{phase} phase failed: {reason}")]
    PhaseFailed { phase: CognitivePhase, reason: String },

    #[error("Agent halted: {0}")]
    Halted(String),

    #[error("Failed to create valid tactical plan")]
    InvalidTacticalPlan,

    #[error("Agent {0} is not active")]
    Inactive(AgentId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Collaborators shared by every agent of a tree.
#[derive(Clone)]
pub struct AgentServices {
    pub governor: Arc<ResourceGovernor>,
    pub runtime: Arc<dyn TaskRuntime>,
    pub event_bus: EventBus,
    pub retriever: Option<Arc<dyn MemoryRetriever>>,
}

impl AgentServices {
    pub fn new(governor: Arc<ResourceGovernor>, runtime: Arc<dyn TaskRuntime>) -> Self {
        Self {
            governor,
            runtime,
            event_bus: EventBus::with_default_capacity(),
            retriever: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn MemoryRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }
}

/// What one successful roundabout step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundaboutOutcome {
    Emerge {
        result: serde_json::Value,
        usage: ResourceUsage,
    },
    Adapt {
        analysis: FailureAnalysis,
    },
    Integrate {
        plan: TacticalPlan,
    },
}

pub struct CognitiveAgent {
    id: AgentId,
    role: AgentRole,
    profile: ConfigurationProfile,
    context_thread: ContextThread,
    state: AgentState,
    children: HashMap<AgentId, CognitiveAgent>,
    parent_id: Option<AgentId>,
    resource_usage: ResourceUsage,
    failure_history: Vec<FailureRecord>,
    active: bool,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    attempts: u32,
    adaptation: Option<AdaptationContext>,
    plan: Option<PlanApproach>,
    services: AgentServices,
}

impl std::fmt::Debug for CognitiveAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitiveAgent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("phase", &self.state.phase)
            .field("active", &self.active)
            .field("recursion_depth", &self.context_thread.recursion_depth)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl CognitiveAgent {
    /// Builds an agent in its profile's entry phase. The parent id is taken
    /// from the context thread. Governor tracking is up to the caller.
    pub fn new(
        role: AgentRole,
        profile: ConfigurationProfile,
        context_thread: ContextThread,
        services: AgentServices,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            role,
            state: AgentState::initial(profile.entry_phase),
            parent_id: context_thread.parent_agent_id,
            profile,
            context_thread,
            children: HashMap::new(),
            resource_usage: ResourceUsage::zero(),
            failure_history: Vec::new(),
            active: true,
            created_at: now,
            last_activity: now,
            attempts: 0,
            adaptation: None,
            plan: None,
            services,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn profile(&self) -> &ConfigurationProfile {
        &self.profile
    }

    pub fn context_thread(&self) -> &ContextThread {
        &self.context_thread
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn phase(&self) -> CognitivePhase {
        self.state.phase
    }

    pub fn parent_id(&self) -> Option<AgentId> {
        self.parent_id
    }

    pub fn resource_usage(&self) -> ResourceUsage {
        self.resource_usage
    }

    pub fn failure_history(&self) -> &[FailureRecord] {
        &self.failure_history
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn governor(&self) -> &Arc<ResourceGovernor> {
        &self.services.governor
    }

    fn ensure_active(&self) -> Result<(), AgentError> {
        if self.active {
            Ok(())
        } else {
            Err(AgentError::Inactive(self.id))
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.last_activity = now;
        self.state.timestamp = now;
    }

    fn advance(&mut self, outcome: PhaseOutcome) -> Result<(), AgentError> {
        let from = self.state.phase;
        let to = roundabout::step(from, outcome)?;
        self.state.phase = to;
        self.touch();
        if from != to {
            debug!(agent_id = %self.id, from = %from, to = %to, "Phase changed");
            self.services.event_bus.publish_agent_event(AgentLifecycleEvent::PhaseChanged {
                agent_id: self.id,
                from,
                to,
                changed_at: self.last_activity,
            });
        }
        Ok(())
    }

    fn adjust_confidence(&mut self, delta: f64) {
        self.state.confidence = (self.state.confidence + delta).clamp(0.0, 1.0);
    }

    fn consume(&mut self, usage: ResourceUsage) {
        self.resource_usage += usage;
        self.services.governor.update_resource_usage(self.id, usage);
    }

    /// Runs the current phase once.
    pub async fn execute_roundabout_loop(&mut self) -> Result<RoundaboutOutcome, AgentError> {
        self.ensure_active()?;
        match self.state.phase {
            CognitivePhase::Emerge => self.emerge().await,
            CognitivePhase::Adapt => self.adapt(),
            CognitivePhase::Integrate => self.integrate(),
        }
    }

    /// Steps the loop until EMERGE succeeds. EMERGE failures are absorbed
    /// into the ADAPT cycle; halts, invalid plans and the step limit surface.
    pub async fn run_to_completion(
        &mut self,
        max_steps: usize,
    ) -> Result<RoundaboutOutcome, AgentError> {
        for _ in 0..max_steps {
            match self.execute_roundabout_loop().await {
                Ok(outcome @ RoundaboutOutcome::Emerge { .. }) => return Ok(outcome),
                Ok(_) | Err(AgentError::PhaseFailed { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::Halted(format!("step limit of {} reached", max_steps)))
    }

    async fn emerge(&mut self) -> Result<RoundaboutOutcome, AgentError> {
        let approval = self.services.governor.request_approval(&ApprovalRequest::new(
            Operation::LlmCall,
            self.id,
            TASK_ATTEMPT_ESTIMATE,
            self.context_thread.clone(),
        ));
        if !approval.approved {
            return self.fail_emerge(approval.reason, false);
        }

        self.attempts += 1;
        let context = self.retrieve_context().await;
        let request = TaskRequest {
            agent_id: self.id,
            role: self.role,
            model: self.profile.model.clone(),
            top_level_goal: self.context_thread.top_level_goal.clone(),
            task_definition: self.context_thread.task_definition.clone(),
            toolkit: self.profile.toolkit.clone(),
            memory_scope: self.context_thread.memory_scope.clone(),
            attempt: self.attempts,
            plan: self.plan,
            context,
        };

        debug!(agent_id = %self.id, attempt = self.attempts, "Running task attempt");
        match self.services.runtime.execute(request).await {
            Ok(output) => {
                self.consume(output.usage);
                if output.success {
                    self.adjust_confidence(CONFIDENCE_GAIN);
                    self.advance(PhaseOutcome::TaskSucceeded)?;
                    info!(agent_id = %self.id, attempt = self.attempts, "Task attempt succeeded");
                    Ok(RoundaboutOutcome::Emerge {
                        result: output.result,
                        usage: output.usage,
                    })
                } else {
                    let reason = output
                        .error
                        .unwrap_or_else(|| "task reported failure".to_string());
                    self.fail_emerge(reason, true)
                }
            }
            Err(e) => self.fail_emerge(e.to_string(), true),
        }
    }

    fn fail_emerge(
        &mut self,
        reason: String,
        report: bool,
    ) -> Result<RoundaboutOutcome, AgentError> {
        warn!(agent_id = %self.id, reason = %reason, "EMERGE phase failed");
        if report {
            self.services
                .governor
                .record_error(self.id, format!("EMERGE phase failed: {}", reason));
        }
        self.failure_history
            .push(FailureRecord::new(CognitivePhase::Emerge, reason.clone()));
        self.adjust_confidence(-CONFIDENCE_LOSS);
        self.advance(PhaseOutcome::TaskFailed)?;
        Err(AgentError::PhaseFailed {
            phase: CognitivePhase::Emerge,
            reason,
        })
    }

    async fn retrieve_context(&self) -> Vec<MemorySnippet> {
        let Some(retriever) = &self.services.retriever else {
            return Vec::new();
        };

        let approval = self.services.governor.request_approval(&ApprovalRequest::new(
            Operation::MemoryAccess,
            self.id,
            MEMORY_ACCESS_ESTIMATE,
            self.context_thread.clone(),
        ));
        if !approval.approved {
            debug!(
                agent_id = %self.id,
                reason = %approval.reason,
                "Memory access denied; continuing without context"
            );
            return Vec::new();
        }

        match retriever
            .retrieve(
                &self.context_thread.memory_scope,
                &self.context_thread.task_definition,
                MEMORY_SNIPPET_LIMIT,
            )
            .await
        {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(
                    agent_id = %self.id,
                    error = %e,
                    "Memory retrieval failed; continuing without context"
                );
                Vec::new()
            }
        }
    }

    fn adapt(&mut self) -> Result<RoundaboutOutcome, AgentError> {
        let analysis = roundabout::analyze_failures(&self.failure_history);
        let remaining = self
            .context_thread
            .resource_budget
            .remaining_after(&self.resource_usage);
        let resources_sufficient = self
            .services
            .governor
            .check_resource_limits(self.id, &self.context_thread)
            && !remaining.is_exhausted();

        let decision = roundabout::decide_strategy(DecisionContext {
            analysis: &analysis,
            resources_sufficient,
            recursion_depth: self.context_thread.recursion_depth,
            max_recursion_depth: self.profile.max_recursion_depth,
        });

        debug!(
            agent_id = %self.id,
            severity = ?analysis.severity,
            failure_type = %analysis.failure_type,
            pattern = %analysis.pattern,
            "Failure analysis complete"
        );

        match decision {
            StrategicDecision::Proceed => {
                self.adaptation = Some(AdaptationContext {
                    analysis: analysis.clone(),
                    decision: StrategicDecision::Proceed,
                });
                self.advance(PhaseOutcome::Proceed)?;
                Ok(RoundaboutOutcome::Adapt { analysis })
            }
            StrategicDecision::HaltAndReportFailure { reason } => {
                self.advance(PhaseOutcome::Halt)?;
                warn!(agent_id = %self.id, reason = %reason, "Agent halted");
                self.services.event_bus.publish_agent_event(AgentLifecycleEvent::AgentHalted {
                    agent_id: self.id,
                    reason: reason.clone(),
                    halted_at: self.last_activity,
                });
                Err(AgentError::Halted(reason))
            }
        }
    }

    fn integrate(&mut self) -> Result<RoundaboutOutcome, AgentError> {
        let plan = roundabout::build_tactical_plan(self.adaptation.as_ref(), self.state.confidence);
        if plan.is_valid {
            self.plan = Some(plan.approach);
            self.adaptation = None;
            self.advance(PhaseOutcome::PlanValid)?;
            info!(
                agent_id = %self.id,
                approach = ?plan.approach,
                confidence = plan.confidence,
                "Tactical plan accepted"
            );
            Ok(RoundaboutOutcome::Integrate { plan })
        } else {
            warn!(agent_id = %self.id, rationale = %plan.rationale, "Tactical plan rejected");
            self.failure_history.push(FailureRecord::new(
                CognitivePhase::Integrate,
                AgentError::InvalidTacticalPlan.to_string(),
            ));
            self.adaptation = None;
            self.advance(PhaseOutcome::PlanInvalid)?;
            Err(AgentError::InvalidTacticalPlan)
        }
    }

    /// Spawns a child under governor approval and returns it. A denial leaves
    /// the child map and usage totals untouched.
    pub fn clone_agent(
        &mut self,
        profile: ConfigurationProfile,
        task_definition: impl Into<String>,
    ) -> Result<&mut CognitiveAgent, AgentError> {
        self.ensure_active()?;

        let child_thread = self.context_thread.child(
            self.id,
            &self.resource_usage,
            profile.clone(),
            task_definition,
        );

        let approval = self.services.governor.request_approval(&ApprovalRequest::new(
            Operation::CloneAgent,
            self.id,
            CLONE_COST,
            self.context_thread.clone(),
        ));
        if !approval.approved {
            self.services
                .governor
                .record_error(self.id, format!("Agent cloning denied: {}", approval.reason));
            return Err(AgentError::CloneDenied(approval.reason));
        }

        let child = CognitiveAgent::new(
            self.role.child_role(),
            profile,
            child_thread,
            self.services.clone(),
        );
        let child_id = child.id;
        let depth = child.context_thread.recursion_depth;

        self.services.governor.track_agent(child_id, Some(self.id));
        self.consume(CLONE_COST);
        self.touch();

        info!(
            parent_id = %self.id,
            child_id = %child_id,
            recursion_depth = depth,
            "Cloned child agent"
        );
        self.services.event_bus.publish_agent_event(AgentLifecycleEvent::AgentCloned {
            parent_id: self.id,
            child_id,
            recursion_depth: depth,
            cloned_at: self.last_activity,
        });

        Ok(self.children.entry(child_id).or_insert(child))
    }

    pub fn get_child_agent(&self, child_id: AgentId) -> Option<&CognitiveAgent> {
        self.children.get(&child_id)
    }

    pub fn get_child_agent_mut(&mut self, child_id: AgentId) -> Option<&mut CognitiveAgent> {
        self.children.get_mut(&child_id)
    }

    /// Direct children, oldest first.
    pub fn list_child_agents(&self) -> Vec<&CognitiveAgent> {
        let mut children: Vec<&CognitiveAgent> = self.children.values().collect();
        children.sort_by_key(|child| child.created_at);
        children
    }

    /// Searches the whole subtree below this agent.
    pub fn find_descendant(&self, agent_id: AgentId) -> Option<&CognitiveAgent> {
        let mut stack: Vec<&CognitiveAgent> = self.children.values().collect();
        while let Some(agent) = stack.pop() {
            if agent.id == agent_id {
                return Some(agent);
            }
            stack.extend(agent.children.values());
        }
        None
    }

    pub fn find_descendant_mut(&mut self, agent_id: AgentId) -> Option<&mut CognitiveAgent> {
        if self.children.contains_key(&agent_id) {
            return self.children.get_mut(&agent_id);
        }
        self.children
            .values_mut()
            .find_map(|child| child.find_descendant_mut(agent_id))
    }

    /// Detaches a child, reports on it and retires its subtree.
    pub async fn remove_child_agent(&mut self, child_id: AgentId) -> Option<ChildAgentReport> {
        let mut child = self.children.remove(&child_id)?;
        let report = self.child_report(&child).await;
        let termination = child.terminate().await;
        if !termination.is_clean() {
            debug!(
                parent_id = %self.id,
                child_id = %child_id,
                failures = termination.failures.len(),
                "Removed child terminated with failures"
            );
        }
        self.touch();
        Some(report)
    }

    /// One report per child. A child whose status cannot be read is reported
    /// as `Error`; enumeration never stops early.
    pub async fn get_child_agent_reports(&self) -> Vec<ChildAgentReport> {
        join_all(self.list_child_agents().into_iter().map(|child| self.child_report(child))).await
    }

    async fn child_report(&self, child: &CognitiveAgent) -> ChildAgentReport {
        let now = Utc::now();
        let mut report = ChildAgentReport {
            child_id: child.id,
            task_definition: child.context_thread.task_definition.clone(),
            status: ChildStatus::Running,
            resource_usage: child.resource_usage,
            execution_time_ms: (now - child.created_at).num_milliseconds().max(0) as u64,
            runtime_state: None,
            error: None,
            timestamp: now,
        };

        match self.services.runtime.status(child.id).await {
            Ok(runtime_status) => {
                report.runtime_state = Some(runtime_status.state);
                let idle = now - child.last_activity;
                report.status = match (child.active, child.state.phase) {
                    (false, _) => ChildStatus::Inactive,
                    (true, CognitivePhase::Adapt) if idle > stale_adapt_threshold() => {
                        report.error = Some(format!(
                            "Agent stuck in ADAPT phase for {} minutes",
                            idle.num_minutes()
                        ));
                        ChildStatus::Failed
                    }
                    (true, CognitivePhase::Emerge) => ChildStatus::Running,
                    (true, CognitivePhase::Adapt) => ChildStatus::Adapting,
                    (true, CognitivePhase::Integrate) => ChildStatus::Integrating,
                };
            }
            Err(e) => {
                warn!(
                    parent_id = %self.id,
                    child_id = %child.id,
                    error = %e,
                    "Child status check failed"
                );
                self.services
                    .governor
                    .record_error(self.id, format!("Child agent status check failed: {}", e));
                report.status = ChildStatus::Error;
                report.error = Some(e.to_string());
            }
        }
        report
    }

    /// Terminates this agent and every descendant. All of them end inactive
    /// and untracked even when some runtime teardowns fail.
    pub async fn terminate(&mut self) -> TerminationReport {
        let mut report = TerminationReport::default();
        if !self.active && self.children.is_empty() {
            return report;
        }

        for mut descendant in self.detach_subtree() {
            descendant.retire(&mut report).await;
        }
        self.retire(&mut report).await;

        info!(
            agent_id = %self.id,
            terminated = report.terminated.len(),
            failures = report.failures.len(),
            "Agent hierarchy terminated"
        );
        report
    }

    /// Empties the child map recursively, returning descendants in
    /// post-order (children before their parent).
    fn detach_subtree(&mut self) -> Vec<CognitiveAgent> {
        let mut ordered = Vec::new();
        let mut stack: Vec<(CognitiveAgent, bool)> =
            self.children.drain().map(|(_, child)| (child, false)).collect();

        while let Some((mut agent, expanded)) = stack.pop() {
            if expanded {
                ordered.push(agent);
                continue;
            }
            let grandchildren: Vec<CognitiveAgent> =
                agent.children.drain().map(|(_, child)| child).collect();
            stack.push((agent, true));
            stack.extend(grandchildren.into_iter().map(|child| (child, false)));
        }
        ordered
    }

    async fn retire(&mut self, report: &mut TerminationReport) {
        if !self.active {
            return;
        }
        self.active = false;
        self.touch();

        if let Err(e) = self.services.runtime.terminate(self.id).await {
            let blame = self.parent_id.unwrap_or(self.id);
            warn!(
                agent_id = %self.id,
                parent_id = %blame,
                error = %e,
                "Child agent termination failed"
            );
            self.services.governor.record_error(
                blame,
                format!("Child agent termination failed: {}: {}", self.id, e),
            );
            report.failures.push(TerminationFailure {
                agent_id: self.id,
                parent_id: self.parent_id,
                error: e.to_string(),
            });
        }

        self.services.governor.remove_agent(self.id);
        metrics::counter!("arbor_agents_terminated_total").increment(1);
        self.services.event_bus.publish_agent_event(AgentLifecycleEvent::AgentTerminated {
            agent_id: self.id,
            terminated_at: self.last_activity,
        });
        report.terminated.push(self.get_status());
    }

    pub fn get_status(&self) -> AgentStatus {
        AgentStatus {
            id: self.id,
            role: self.role,
            phase: self.state.phase,
            active: self.active,
            child_count: self.children.len(),
            resource_usage: self.resource_usage,
            last_activity: self.last_activity,
            recursion_depth: self.context_thread.recursion_depth,
            parent_id: self.parent_id,
        }
    }

    /// Re-tasks a halted or finished agent and starts it over from its
    /// entry phase with a clean failure history.
    pub fn reassign_task(&mut self, task_definition: impl Into<String>) -> Result<(), AgentError> {
        self.ensure_active()?;
        self.context_thread.task_definition = task_definition.into();
        self.context_thread.touch();
        self.failure_history.clear();
        self.adaptation = None;
        self.plan = None;
        self.state.phase = self.profile.entry_phase;
        self.touch();
        info!(agent_id = %self.id, task = %self.context_thread.task_definition, "Agent re-tasked");
        Ok(())
    }

    pub fn calculate_relational_delta(&self, user_state: &UserState) -> RelationalDelta {
        communication::calculate_relational_delta(&self.state, user_state)
    }

    pub fn process_input(&mut self, input: &UserInput) -> Result<AgentResponse, AgentError> {
        self.ensure_active()?;
        let response = communication::compose_response(&self.state, input);
        self.state.resonance = response.resonance;
        self.touch();
        Ok(response)
    }
}
