// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Simulated collaborators. `SimulatedTaskRuntime` stands in for the LLM/tool
// executor: it replays scripted outcomes per agent and can be told to fail
// status reads or teardown for chosen agents. `InMemoryRetriever` serves
// memory snippets from a keyword index. Both back the CLI simulation and the
// test suites.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::debug;

use crate::domain::agent::AgentId;
use crate::domain::resource::ResourceUsage;
use crate::domain::runtime::{
    MemoryRetriever, MemorySnippet, RuntimeError, RuntimeStatus, TaskOutput, TaskRequest,
    TaskRuntime,
};

/// Next result the runtime should produce for an agent.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed {
        result: serde_json::Value,
        usage: ResourceUsage,
    },
    /// Task ran but reported failure.
    Fail { error: String, usage: ResourceUsage },
    /// The runtime itself errored.
    Error(String),
}

impl ScriptedOutcome {
    pub fn fail(error: impl Into<String>) -> Self {
        ScriptedOutcome::Fail {
            error: error.into(),
            usage: ResourceUsage::llm_calls(1),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptedOutcome::Error(message.into())
    }
}

#[derive(Default)]
struct SimulationState {
    scripts: HashMap<AgentId, VecDeque<ScriptedOutcome>>,
    /// Consumed by agents without a script of their own.
    shared_script: VecDeque<ScriptedOutcome>,
    failing_status: HashSet<AgentId>,
    failing_terminate: HashSet<AgentId>,
    terminate_calls: Vec<AgentId>,
    requests: Vec<TaskRequest>,
    started: HashMap<AgentId, Instant>,
}

pub struct SimulatedTaskRuntime {
    state: Mutex<SimulationState>,
    default_usage: ResourceUsage,
}

impl SimulatedTaskRuntime {
    pub fn new() -> Self {
        Self::with_default_usage(ResourceUsage {
            llm_calls: 1,
            compute_units: 25,
            storage_bytes: 1024,
            execution_time_ms: 250,
        })
    }

    /// Usage reported by unscripted successful attempts.
    pub fn with_default_usage(default_usage: ResourceUsage) -> Self {
        Self {
            state: Mutex::new(SimulationState::default()),
            default_usage,
        }
    }

    pub fn script(&self, agent_id: AgentId, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.state
            .lock()
            .scripts
            .entry(agent_id)
            .or_default()
            .extend(outcomes);
    }

    pub fn script_shared(&self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.state.lock().shared_script.extend(outcomes);
    }

    pub fn fail_status_for(&self, agent_id: AgentId) {
        self.state.lock().failing_status.insert(agent_id);
    }

    pub fn fail_terminate_for(&self, agent_id: AgentId) {
        self.state.lock().failing_terminate.insert(agent_id);
    }

    /// Every agent `terminate` was called for, in call order.
    pub fn terminate_calls(&self) -> Vec<AgentId> {
        self.state.lock().terminate_calls.clone()
    }

    pub fn executed_requests(&self) -> Vec<TaskRequest> {
        self.state.lock().requests.clone()
    }

    fn next_outcome(&self, agent_id: AgentId) -> Option<ScriptedOutcome> {
        let mut state = self.state.lock();
        if let Some(outcome) = state.scripts.get_mut(&agent_id).and_then(VecDeque::pop_front) {
            return Some(outcome);
        }
        state.shared_script.pop_front()
    }
}

impl Default for SimulatedTaskRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRuntime for SimulatedTaskRuntime {
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutput, RuntimeError> {
        let agent_id = request.agent_id;
        {
            let mut state = self.state.lock();
            state.started.entry(agent_id).or_insert_with(Instant::now);
            state.requests.push(request.clone());
        }

        let outcome = self.next_outcome(agent_id);
        debug!(
            agent_id = %agent_id,
            attempt = request.attempt,
            scripted = outcome.is_some(),
            "Simulated task attempt"
        );

        match outcome {
            Some(ScriptedOutcome::Succeed { result, usage }) => {
                Ok(TaskOutput::succeeded(result, usage))
            }
            Some(ScriptedOutcome::Fail { error, usage }) => Ok(TaskOutput::failed(error, usage)),
            Some(ScriptedOutcome::Error(message)) => Err(RuntimeError::ExecutionFailed(message)),
            None => Ok(TaskOutput::succeeded(
                serde_json::json!({
                    "agent_id": agent_id.to_string(),
                    "task": request.task_definition,
                    "attempt": request.attempt,
                    "context_snippets": request.context.len(),
                }),
                self.default_usage,
            )),
        }
    }

    async fn status(&self, agent_id: AgentId) -> Result<RuntimeStatus, RuntimeError> {
        let state = self.state.lock();
        if state.failing_status.contains(&agent_id) {
            return Err(RuntimeError::StatusUnavailable(format!(
                "no status for agent {}",
                agent_id
            )));
        }

        let label = if state.terminate_calls.contains(&agent_id) {
            "terminated"
        } else if state.started.contains_key(&agent_id) {
            "running"
        } else {
            "idle"
        };
        Ok(RuntimeStatus {
            agent_id,
            state: label.to_string(),
            uptime_seconds: state
                .started
                .get(&agent_id)
                .map(|started| started.elapsed().as_secs())
                .unwrap_or(0),
        })
    }

    async fn terminate(&self, agent_id: AgentId) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.terminate_calls.push(agent_id);
        if state.failing_terminate.contains(&agent_id) {
            return Err(RuntimeError::TerminationFailed(format!(
                "agent {} did not shut down",
                agent_id
            )));
        }
        state.started.remove(&agent_id);
        Ok(())
    }
}

/// Keyword-matching memory store keyed by memory scope.
#[derive(Default)]
pub struct InMemoryRetriever {
    documents: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, memory_scope: impl Into<String>, content: impl Into<String>) {
        self.documents
            .write()
            .entry(memory_scope.into())
            .or_default()
            .push(content.into());
    }
}

#[async_trait]
impl MemoryRetriever for InMemoryRetriever {
    async fn retrieve(
        &self,
        memory_scope: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, RuntimeError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|term| term.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.documents.read();
        let mut snippets: Vec<MemorySnippet> = documents
            .get(memory_scope)
            .map(|docs| {
                docs.iter()
                    .filter_map(|doc| {
                        let lowered = doc.to_lowercase();
                        let hits = terms
                            .iter()
                            .filter(|term| lowered.contains(term.as_str()))
                            .count();
                        (hits > 0).then(|| MemorySnippet {
                            content: doc.clone(),
                            relevance: hits as f64 / terms.len() as f64,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        snippets.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        snippets.truncate(limit);
        Ok(snippets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentRole;

    fn request(agent_id: AgentId) -> TaskRequest {
        TaskRequest {
            agent_id,
            role: AgentRole::Worker,
            model: "sim".to_string(),
            top_level_goal: "goal".to_string(),
            task_definition: "task".to_string(),
            toolkit: vec![],
            memory_scope: "task".to_string(),
            attempt: 1,
            plan: None,
            context: vec![],
        }
    }

    #[tokio::test]
    async fn test_scripted_outcomes_then_default() {
        let runtime = SimulatedTaskRuntime::new();
        let agent = AgentId::new();
        runtime.script(agent, [ScriptedOutcome::fail("bad"), ScriptedOutcome::error("crash")]);

        let first = runtime.execute(request(agent)).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("bad"));

        assert!(runtime.execute(request(agent)).await.is_err());

        let third = runtime.execute(request(agent)).await.unwrap();
        assert!(third.success);
        assert_eq!(third.usage.llm_calls, 1);
    }

    #[tokio::test]
    async fn test_failing_status_and_terminate() {
        let runtime = SimulatedTaskRuntime::new();
        let agent = AgentId::new();
        runtime.fail_status_for(agent);
        runtime.fail_terminate_for(agent);

        assert!(runtime.status(agent).await.is_err());
        assert!(runtime.terminate(agent).await.is_err());
        assert_eq!(runtime.terminate_calls(), vec![agent]);

        let other = AgentId::new();
        assert_eq!(runtime.status(other).await.unwrap().state, "idle");
    }

    #[tokio::test]
    async fn test_retriever_ranks_by_term_overlap() {
        let retriever = InMemoryRetriever::new();
        retriever.insert("task", "deploy the service to staging");
        retriever.insert("task", "service health checks");
        retriever.insert("other", "deploy service");

        let snippets = retriever.retrieve("task", "deploy service", 5).await.unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].content, "deploy the service to staging");
        assert_eq!(snippets[0].relevance, 1.0);
        assert_eq!(snippets[1].relevance, 0.5);
    }
}
