// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for the agent factory registry.

use arbor_core::application::{AgentServices, ResourceGovernor};
use arbor_core::domain::agent::{AgentId, AgentRole, ConfigurationProfile};
use arbor_core::domain::config::SystemResourceLimits;
use arbor_core::domain::context_thread::ContextThread;
use arbor_core::domain::events::AgentLifecycleEvent;
use arbor_core::domain::resource::ResourceBudget;
use arbor_core::infrastructure::event_bus::{DomainEvent, EventBus};
use arbor_core::infrastructure::runtime::SimulatedTaskRuntime;
use arbor_swarm::{AgentFactory, FactoryError};
use std::sync::Arc;

struct Fixture {
    factory: AgentFactory,
    governor: Arc<ResourceGovernor>,
    runtime: Arc<SimulatedTaskRuntime>,
    event_bus: EventBus,
}

fn fixture(limits: SystemResourceLimits) -> Fixture {
    let governor = Arc::new(ResourceGovernor::new(limits));
    let runtime = Arc::new(SimulatedTaskRuntime::new());
    let event_bus = EventBus::with_default_capacity();
    let services =
        AgentServices::new(governor.clone(), runtime.clone()).with_event_bus(event_bus.clone());
    Fixture {
        factory: AgentFactory::new(services),
        governor,
        runtime,
        event_bus,
    }
}

fn profile() -> ConfigurationProfile {
    ConfigurationProfile::new("test-model")
}

fn thread(task: &str) -> ContextThread {
    ContextThread::root("Migrate billing", task, profile(), ResourceBudget::default())
}

fn root_id(fx: &mut Fixture, task: &str) -> AgentId {
    fx.factory
        .create_agent(AgentRole::Coordinator, profile(), thread(task))
        .unwrap()
        .id()
}

#[test]
fn test_create_agent_registers_and_tracks() {
    let mut fx = fixture(SystemResourceLimits::default());
    let mut events = fx.event_bus.subscribe();

    let agent = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("plan")).unwrap();
    let agent_id = agent.id();
    assert!(agent.parent_id().is_none());
    assert_eq!(agent.context_thread().recursion_depth, 0);

    assert!(fx.factory.get_agent(agent_id).is_some());
    assert_eq!(fx.factory.len(), 1);
    assert_eq!(fx.governor.agent_usage(agent_id), Some(Default::default()));
    assert_eq!(fx.governor.get_system_metrics().active_agents, 1);

    let created = events.drain().into_iter().any(|event| {
        matches!(
            event,
            DomainEvent::AgentLifecycle(AgentLifecycleEvent::AgentCreated {
                agent_id: id,
                role: AgentRole::Coordinator,
                ..
            })
                if id == agent_id
        )
    });
    assert!(created);
}

#[test]
fn test_unknown_agent_lookups() {
    let fx = fixture(SystemResourceLimits::default());
    assert!(fx.factory.get_agent(AgentId::new()).is_none());
    assert!(fx.factory.resolve(AgentId::new()).is_none());
    assert!(fx.factory.is_empty());
}

#[test]
fn test_creation_refused_at_capacity() {
    let mut fx = fixture(SystemResourceLimits {
        max_active_agents: 2,
        ..SystemResourceLimits::default()
    });
    fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("a")).unwrap();
    fx.factory.create_agent(AgentRole::UserFacing, profile(), thread("b")).unwrap();

    let err = fx
        .factory
        .create_agent(AgentRole::Coordinator, profile(), thread("c"))
        .unwrap_err();
    assert_eq!(err, FactoryError::CapacityReached { tracked: 2, limit: 2 });
    assert_eq!(fx.factory.len(), 2);
}

#[test]
fn test_resolve_descendants_and_parents() {
    let mut fx = fixture(SystemResourceLimits::default());
    let root = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("root")).unwrap();
    let root_id = root.id();
    let child = root.clone_agent(profile(), "child").unwrap();
    let child_id = child.id();
    let grandchild_id = child.clone_agent(profile(), "grandchild").unwrap().id();

    // Only roots are registered
    assert!(fx.factory.get_agent(child_id).is_none());

    let grandchild = fx.factory.resolve(grandchild_id).unwrap();
    let parent = fx.factory.resolve_parent(grandchild).unwrap();
    assert_eq!(parent.id(), child_id);
    let grandparent = fx.factory.resolve_parent(parent).unwrap();
    assert_eq!(grandparent.id(), root_id);
    assert!(fx.factory.resolve_parent(grandparent).is_none());

    fx.factory.resolve_mut(grandchild_id).unwrap().reassign_task("retasked").unwrap();
    assert_eq!(
        fx.factory.resolve(grandchild_id).unwrap().context_thread().task_definition,
        "retasked"
    );
}

#[test]
fn test_summaries_list_every_tree_depth_first() {
    let mut fx = fixture(SystemResourceLimits::default());
    let root = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("root")).unwrap();
    let child = root.clone_agent(profile(), "child").unwrap();
    child.clone_agent(profile(), "grandchild").unwrap();
    root.clone_agent(profile(), "second child").unwrap();

    let summaries = fx.factory.summaries();
    let tasks: Vec<&str> = summaries.iter().map(|s| s.task_definition.as_str()).collect();
    assert_eq!(tasks, vec!["root", "child", "grandchild", "second child"]);
    assert_eq!(summaries[2].recursion_depth, 2);
    assert_eq!(summaries[0].child_count, 2);

    let json = serde_json::to_value(&summaries[1]).unwrap();
    assert_eq!(json["role"], "worker");
}

#[tokio::test]
async fn test_list_active_agents_skips_halted_roots() {
    let mut fx = fixture(SystemResourceLimits::default());
    let first = root_id(&mut fx, "first");
    let second = root_id(&mut fx, "second");

    // A terminated root stays registered until removed but is not active
    fx.factory.get_agent_mut(first).unwrap().terminate().await;

    let active: Vec<AgentId> = fx.factory.list_active_agents().iter().map(|a| a.id()).collect();
    assert_eq!(active, vec![second]);
}

#[tokio::test]
async fn test_terminate_agent_removes_tree() {
    let mut fx = fixture(SystemResourceLimits::default());
    let root = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("root")).unwrap();
    let root_id = root.id();
    root.clone_agent(profile(), "child").unwrap();

    let report = fx.factory.terminate_agent(root_id).await.unwrap();
    assert_eq!(report.terminated.len(), 2);
    assert!(report.is_clean());
    assert!(fx.factory.get_agent(root_id).is_none());
    assert_eq!(fx.governor.get_system_metrics().active_agents, 0);

    let err = fx.factory.terminate_agent(root_id).await.unwrap_err();
    assert_eq!(err, FactoryError::AgentNotFound(root_id));
}

#[tokio::test]
async fn test_terminate_all_cascades_and_clears() {
    let mut fx = fixture(SystemResourceLimits::default());
    let a = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("a")).unwrap();
    let a_child = a.clone_agent(profile(), "a child").unwrap().id();
    let b = fx.factory.create_agent(AgentRole::UserFacing, profile(), thread("b")).unwrap();
    let b_child = b.clone_agent(profile(), "b child").unwrap().id();
    fx.runtime.fail_terminate_for(a_child);

    let reports = fx.factory.terminate_all().await;

    assert_eq!(reports.len(), 2);
    let terminated: usize = reports.iter().map(|r| r.terminated.len()).sum();
    assert_eq!(terminated, 4);
    assert!(reports.iter().flat_map(|r| &r.terminated).all(|status| !status.active));

    let failures: Vec<_> = reports.iter().flat_map(|r| &r.failures).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].agent_id, a_child);

    assert!(fx.factory.is_empty());
    assert!(fx.runtime.terminate_calls().contains(&b_child));
    assert_eq!(fx.governor.get_system_metrics().active_agents, 0);
}

#[tokio::test]
async fn test_created_agents_share_the_governor() {
    let mut fx = fixture(SystemResourceLimits::default());
    let agent = fx.factory.create_agent(AgentRole::Coordinator, profile(), thread("work")).unwrap();
    let agent_id = agent.id();
    agent.execute_roundabout_loop().await.unwrap();

    let usage = fx.governor.agent_usage(agent_id).unwrap();
    assert_eq!(usage.llm_calls, 1);
    assert_eq!(fx.governor.get_system_metrics().total_resource_usage, usage);
}
