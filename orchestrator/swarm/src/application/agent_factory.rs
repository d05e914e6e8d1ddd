// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Factory
//!
//! Registry of root [`CognitiveAgent`]s keyed by id. Every agent created here
//! shares the factory's [`AgentServices`], so all trees answer to the same
//! governor, runtime and event bus.
//!
//! Only roots live in the registry. Descendants stay owned by their parents
//! and are reached through [`AgentFactory::resolve`], which is also how a
//! child's weak parent id is turned back into an agent.

use std::collections::HashMap;

use arbor_core::application::{AgentServices, CognitiveAgent};
use arbor_core::domain::agent::{AgentId, AgentRole, ConfigurationProfile, TerminationReport};
use arbor_core::domain::context_thread::ContextThread;
use arbor_core::domain::events::AgentLifecycleEvent;
use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use crate::domain::{AgentSummary, FactoryError};

pub struct AgentFactory {
    services: AgentServices,
    agents: HashMap<AgentId, CognitiveAgent>,
}

impl AgentFactory {
    pub fn new(services: AgentServices) -> Self {
        Self {
            services,
            agents: HashMap::new(),
        }
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    /// Builds a root agent, tracks it with the governor and registers it.
    ///
    /// Fails when the governor already tracks as many agents as the tighter of
    /// the two agent ceilings allows.
    pub fn create_agent(
        &mut self,
        role: AgentRole,
        profile: ConfigurationProfile,
        context_thread: ContextThread,
    ) -> Result<&mut CognitiveAgent, FactoryError> {
        let governor = &self.services.governor;
        let limits = governor.limits();
        let limit = limits.max_active_agents.min(limits.max_system_agents);
        let tracked = governor.get_system_metrics().active_agents;
        if tracked >= limit {
            warn!(tracked, limit, "Agent creation refused at system capacity");
            return Err(FactoryError::CapacityReached { tracked, limit });
        }

        let agent = CognitiveAgent::new(role, profile, context_thread, self.services.clone());
        let agent_id = agent.id();
        governor.track_agent(agent_id, agent.parent_id());

        info!(
            agent_id = %agent_id,
            role = ?role,
            task = %agent.context_thread().task_definition,
            "Created agent"
        );
        self.services.event_bus.publish_agent_event(AgentLifecycleEvent::AgentCreated {
            agent_id,
            role,
            created_at: Utc::now(),
        });
        metrics::gauge!("arbor_factory_root_agents").set((self.agents.len() + 1) as f64);

        Ok(self.agents.entry(agent_id).or_insert(agent))
    }

    /// Registered root agent by id.
    pub fn get_agent(&self, agent_id: AgentId) -> Option<&CognitiveAgent> {
        self.agents.get(&agent_id)
    }

    pub fn get_agent_mut(&mut self, agent_id: AgentId) -> Option<&mut CognitiveAgent> {
        self.agents.get_mut(&agent_id)
    }

    /// Active root agents, oldest first.
    pub fn list_active_agents(&self) -> Vec<&CognitiveAgent> {
        let mut active: Vec<&CognitiveAgent> =
            self.agents.values().filter(|a| a.is_active()).collect();
        active.sort_by_key(|agent| agent.context_thread().created_at);
        active
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Any agent in any registered tree.
    pub fn resolve(&self, agent_id: AgentId) -> Option<&CognitiveAgent> {
        self.agents.get(&agent_id).or_else(|| {
            self.agents
                .values()
                .find_map(|root| root.find_descendant(agent_id))
        })
    }

    pub fn resolve_mut(&mut self, agent_id: AgentId) -> Option<&mut CognitiveAgent> {
        if self.agents.contains_key(&agent_id) {
            return self.agents.get_mut(&agent_id);
        }
        self.agents
            .values_mut()
            .find_map(|root| root.find_descendant_mut(agent_id))
    }

    /// Follows an agent's parent id. `None` for roots and for parents that are
    /// no longer registered.
    pub fn resolve_parent(&self, agent: &CognitiveAgent) -> Option<&CognitiveAgent> {
        agent.parent_id().and_then(|parent_id| self.resolve(parent_id))
    }

    /// Every agent of every tree, each root followed by its descendants.
    pub fn summaries(&self) -> Vec<AgentSummary> {
        let mut summaries = Vec::new();
        let mut roots: Vec<&CognitiveAgent> = self.agents.values().collect();
        roots.sort_by_key(|agent| agent.context_thread().created_at);

        for root in roots {
            let mut stack = vec![root];
            while let Some(agent) = stack.pop() {
                summaries.push(AgentSummary::from_status(
                    agent.get_status(),
                    agent.context_thread().task_definition.clone(),
                ));
                let mut children = agent.list_child_agents();
                children.reverse();
                stack.extend(children);
            }
        }
        summaries
    }

    /// Terminates one root and its subtree, then drops it from the registry.
    pub async fn terminate_agent(
        &mut self,
        agent_id: AgentId,
    ) -> Result<TerminationReport, FactoryError> {
        let mut agent = self
            .agents
            .remove(&agent_id)
            .ok_or(FactoryError::AgentNotFound(agent_id))?;
        let report = agent.terminate().await;
        metrics::gauge!("arbor_factory_root_agents").set(self.agents.len() as f64);
        Ok(report)
    }

    /// Terminates every registered tree and clears the registry. One report
    /// per root; a failing tree does not stop the others.
    pub async fn terminate_all(&mut self) -> Vec<TerminationReport> {
        let mut roots: Vec<CognitiveAgent> = self.agents.drain().map(|(_, agent)| agent).collect();
        let reports = join_all(roots.iter_mut().map(|agent| agent.terminate())).await;

        let failures: usize = reports.iter().map(|report| report.failures.len()).sum();
        info!(roots = reports.len(), failures, "Terminated all agents");
        metrics::gauge!("arbor_factory_root_agents").set(0.0);
        reports
    }
}
