// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for the resource governor: approval ordering, quotas,
//! circuit breaker, tempo and hierarchy pausing.

use arbor_core::application::ResourceGovernor;
use arbor_core::domain::agent::{AgentId, ConfigurationProfile};
use arbor_core::domain::config::{CircuitBreakerConfig, SystemResourceLimits, TempoConfig};
use arbor_core::domain::context_thread::ContextThread;
use arbor_core::domain::events::GovernorEvent;
use arbor_core::domain::governance::{
    ApprovalRequest, CircuitState, ExternalApprovalRequest, HealthLevel, Operation, SystemTempo,
};
use arbor_core::domain::resource::{ResourceBudget, ResourceUsage};
use arbor_core::infrastructure::event_bus::{DomainEvent, EventBus};

fn thread_at_depth(depth: u32, parent: Option<AgentId>) -> ContextThread {
    let mut thread = ContextThread::root(
        "governor test",
        "task",
        ConfigurationProfile::new("test-model"),
        ResourceBudget::default(),
    );
    thread.recursion_depth = depth;
    thread.parent_agent_id = parent;
    thread
}

fn request(operation: Operation, agent: AgentId, thread: &ContextThread) -> ApprovalRequest {
    ApprovalRequest::new(operation, agent, ResourceUsage::llm_calls(1), thread.clone())
}

fn tracked_root(governor: &ResourceGovernor) -> AgentId {
    let agent = AgentId::new();
    governor.track_agent(agent, None);
    agent
}

fn with_breaker(circuit_breaker: CircuitBreakerConfig) -> ResourceGovernor {
    ResourceGovernor::new(SystemResourceLimits {
        circuit_breaker,
        ..SystemResourceLimits::default()
    })
}

fn external(operation: &str, agent: AgentId) -> ExternalApprovalRequest {
    ExternalApprovalRequest {
        operation: operation.to_string(),
        requesting_agent_id: agent,
        estimated_cost: ResourceUsage::zero(),
        context_thread: thread_at_depth(0, None),
    }
}

/// Test 1: clone at the maximum depth is refused
#[test]
fn test_clone_denied_at_max_recursion_depth() {
    let governor = ResourceGovernor::new(SystemResourceLimits {
        max_recursion_depth: 3,
        ..SystemResourceLimits::default()
    });
    let agent = tracked_root(&governor);

    let depth_two = thread_at_depth(2, None);
    let shallow = governor.request_approval(&request(Operation::CloneAgent, agent, &depth_two));
    assert!(shallow.approved, "depth 2 may still clone: {}", shallow.reason);

    let depth_three = thread_at_depth(3, None);
    let deep = governor.request_approval(&request(Operation::CloneAgent, agent, &depth_three));
    assert!(!deep.approved);
    assert!(deep.reason.contains("recursion depth"), "reason: {}", deep.reason);
    assert_eq!(deep.reason, "Maximum recursion depth (3) exceeded");
    assert!(deep.updated_budget.is_none());
}

/// Test 2: the agent ceiling counts every tracked agent
#[test]
fn test_clone_denied_at_max_system_agents() {
    let governor = ResourceGovernor::new(SystemResourceLimits {
        max_active_agents: 20,
        max_system_agents: 20,
        ..SystemResourceLimits::default()
    });
    let agents: Vec<AgentId> = (0..20).map(|_| tracked_root(&governor)).collect();
    assert_eq!(governor.get_system_metrics().active_agents, 20);
    let clone = request(Operation::CloneAgent, agents[0], &thread_at_depth(0, None));

    let response = governor.request_approval(&clone);
    assert!(!response.approved);
    assert!(response.reason.contains("Maximum system agents"), "reason: {}", response.reason);

    governor.remove_agent(agents[19]);
    let response = governor.request_approval(&clone);
    assert!(response.approved, "reason: {}", response.reason);
}

/// Test 3: the smaller of the two ceilings binds
#[test]
fn test_active_agent_ceiling_reports_binding_limit() {
    let governor = ResourceGovernor::default();
    let agents: Vec<AgentId> = (0..10).map(|_| tracked_root(&governor)).collect();

    let clone = request(Operation::CloneAgent, agents[0], &thread_at_depth(0, None));
    let response = governor.request_approval(&clone);
    assert_eq!(response.reason, "Maximum system agents reached (10/10)");
}

/// Test 4: committed usage past the safety margin blocks cloning
#[test]
fn test_clone_denied_when_budget_margin_exceeded() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let thread = thread_at_depth(0, None);

    // 89 of 100 calls used; one more reaches the 90% margin exactly
    governor.update_resource_usage(agent, ResourceUsage::llm_calls(89));
    let at_margin = governor.request_approval(&request(Operation::CloneAgent, agent, &thread));
    assert!(at_margin.approved, "reason: {}", at_margin.reason);
    assert_eq!(at_margin.updated_budget.unwrap().max_llm_calls, 10);

    governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    let over = governor.request_approval(&request(Operation::CloneAgent, agent, &thread));
    assert!(!over.approved);
    assert!(over.reason.contains("Insufficient resource budget"), "reason: {}", over.reason);
}

/// Test 5: quota operations check their own ceiling, scaled by tempo
#[test]
fn test_quota_exceeded_and_tempo_scaling() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let thread = thread_at_depth(0, None);

    governor.update_resource_usage(agent, ResourceUsage::llm_calls(60));
    let ok = governor.request_approval(&request(Operation::LlmCall, agent, &thread));
    assert!(ok.approved);
    assert_eq!(ok.updated_budget.unwrap().max_llm_calls, 39);

    // Low-Intensity halves the ceiling to 50 calls
    governor.set_system_tempo(SystemTempo::LowIntensity);
    let scaled = governor.request_approval(&request(Operation::LlmCall, agent, &thread));
    assert!(!scaled.approved);
    assert!(scaled.reason.contains("quota exceeded"), "reason: {}", scaled.reason);

    // memory_access is metered on storage, untouched so far
    let storage = ApprovalRequest::new(
        Operation::MemoryAccess,
        agent,
        ResourceUsage {
            storage_bytes: 1024,
            ..ResourceUsage::default()
        },
        thread.clone(),
    );
    assert!(governor.request_approval(&storage).approved);
}

/// Test 6: repeated errors open the breaker and block every approval
#[test]
fn test_error_rate_opens_circuit_breaker() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let thread = thread_at_depth(0, None);

    for _ in 0..3 {
        governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    }
    governor.record_error(agent, "first");
    governor.record_error(agent, "second");
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Closed, "2 of 5 is below 0.5");

    governor.record_error(agent, "third");
    let metrics = governor.get_system_metrics();
    assert_eq!(metrics.circuit_breaker_info.status, CircuitState::Open);
    assert!((metrics.circuit_breaker_info.error_rate - 0.5).abs() < 1e-9);
    assert_eq!(metrics.error_history.len(), 3);

    for operation in [Operation::LlmCall, Operation::MemoryAccess, Operation::CloneAgent] {
        let response = governor.request_approval(&request(operation, agent, &thread));
        assert!(!response.approved);
        assert!(response.reason.contains("circuit breaker is open"), "reason: {}", response.reason);
    }
    assert_eq!(governor.get_system_status().health, HealthLevel::Halted);
}

/// Test 7: with default settings one error against one operation already trips
#[test]
fn test_single_failure_at_threshold_opens_breaker() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);

    governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    governor.record_error(agent, "first attempt failed");

    let info = governor.get_system_metrics().circuit_breaker_info;
    assert!((info.error_rate - 0.5).abs() < 1e-9);
    assert_eq!(info.status, CircuitState::Open);

    let response = governor.request_approval(&request(
        Operation::LlmCall,
        agent,
        &thread_at_depth(0, None),
    ));
    assert!(response.reason.contains("circuit breaker is open"), "reason: {}", response.reason);
}

/// Test 8: a raised sample floor holds the breaker closed until reached
#[test]
fn test_breaker_waits_for_configured_minimum_samples() {
    let governor = with_breaker(CircuitBreakerConfig {
        minimum_samples: 5,
        ..CircuitBreakerConfig::default()
    });
    let agent = tracked_root(&governor);
    for _ in 0..4 {
        governor.record_error(agent, "early failure");
    }
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Closed);

    governor.record_error(agent, "fifth");
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Open);
}

/// Test 9: half-open admits a limited number of trials
#[test]
fn test_half_open_trial_then_close() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let thread = thread_at_depth(0, None);

    governor.set_circuit_breaker_state(CircuitState::HalfOpen);
    let trial = governor.request_approval(&request(Operation::LlmCall, agent, &thread));
    assert!(trial.approved);

    let second = governor.request_approval(&request(Operation::LlmCall, agent, &thread));
    assert!(!second.approved);
    assert!(second.reason.contains("half-open"), "reason: {}", second.reason);
    assert_eq!(governor.get_system_status().health, HealthLevel::Degraded);

    // Successful trial reports usage and closes the breaker
    governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Closed);
    assert!(governor.request_approval(&request(Operation::LlmCall, agent, &thread)).approved);
}

/// Test 10: a failure of the trial holder re-opens the breaker
#[test]
fn test_half_open_failure_reopens() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);

    governor.set_circuit_breaker_state(CircuitState::HalfOpen);
    let trial = governor.request_approval(&request(
        Operation::LlmCall,
        agent,
        &thread_at_depth(0, None),
    ));
    assert!(trial.approved);

    governor.record_error(agent, "trial failed");
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Open);
}

/// Test 11: requesters turned away while half-open cannot decide the trial
#[test]
fn test_turned_away_requester_does_not_reopen_breaker() {
    let governor = ResourceGovernor::default();
    let trial_holder = tracked_root(&governor);
    let latecomer = tracked_root(&governor);
    let thread = thread_at_depth(0, None);

    governor.set_circuit_breaker_state(CircuitState::HalfOpen);
    let trial = governor.request_approval(&request(Operation::LlmCall, trial_holder, &thread));
    assert!(trial.approved);

    let denied = governor.request_approval(&request(Operation::CloneAgent, latecomer, &thread));
    assert!(!denied.approved);
    assert!(denied.reason.contains("trial limit reached"), "reason: {}", denied.reason);

    // What a denied clone records against its requester
    governor.record_error(latecomer, format!("Agent cloning denied: {}", denied.reason));
    governor.update_resource_usage(latecomer, ResourceUsage::llm_calls(1));
    assert_eq!(governor.circuit_breaker_state(), CircuitState::HalfOpen);

    governor.update_resource_usage(trial_holder, ResourceUsage::llm_calls(1));
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Closed);
}

/// Test 12: open becomes half-open once the cool-down elapsed
#[test]
fn test_cooldown_moves_open_to_half_open() {
    let governor = with_breaker(CircuitBreakerConfig {
        cooldown_ms: 0,
        ..CircuitBreakerConfig::default()
    });
    governor.set_circuit_breaker_state(CircuitState::Open);
    assert_eq!(governor.circuit_breaker_state(), CircuitState::HalfOpen);
}

/// Test 13: spans beyond the clock's range keep every sample and never cool down
#[test]
fn test_unrepresentable_breaker_spans_do_not_panic() {
    let governor = with_breaker(CircuitBreakerConfig {
        time_window_ms: 100_000_000_000_000_000,
        cooldown_ms: u64::MAX,
        minimum_samples: 5,
        ..CircuitBreakerConfig::default()
    });
    let agent = tracked_root(&governor);
    governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    governor.record_error(agent, "kept");

    let metrics = governor.get_system_metrics();
    assert_eq!(metrics.error_history.len(), 1);
    assert_eq!(metrics.circuit_breaker_info.status, CircuitState::Closed);

    governor.set_circuit_breaker_state(CircuitState::Open);
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Open);
}

/// Test 14: heavy error volume also steps tempo down
#[test]
fn test_error_volume_reduces_tempo() {
    let governor = ResourceGovernor::new(SystemResourceLimits {
        circuit_breaker: CircuitBreakerConfig {
            minimum_samples: 5,
            ..CircuitBreakerConfig::default()
        },
        tempo: TempoConfig {
            tempo_error_volume: 5,
            ..TempoConfig::default()
        },
        ..SystemResourceLimits::default()
    });
    let agent = tracked_root(&governor);
    for i in 0..5 {
        governor.record_error(agent, format!("failure {}", i));
    }
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Open);
    assert_eq!(governor.get_system_tempo(), SystemTempo::LowIntensity);
}

/// Test 15: Sleep admits only memory access
#[test]
fn test_sleep_mode_allows_only_memory_access() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let thread = thread_at_depth(0, None);
    governor.set_system_tempo(SystemTempo::Sleep);
    assert_eq!(governor.get_system_tempo(), SystemTempo::Sleep);

    for operation in [Operation::CloneAgent, Operation::LlmCall, Operation::ExternalApi] {
        let response = governor.request_approval(&request(operation, agent, &thread));
        assert!(!response.approved);
        assert!(response.reason.contains("Sleep mode"), "reason: {}", response.reason);
    }

    let memory =
        ApprovalRequest::new(Operation::MemoryAccess, agent, ResourceUsage::zero(), thread);
    assert!(governor.request_approval(&memory).approved);
}

/// Test 16: pausing a root freezes its whole subtree until resumed
#[test]
fn test_pause_and_resume_hierarchy() {
    let governor = ResourceGovernor::default();
    let root = tracked_root(&governor);
    let child = AgentId::new();
    let grandchild = AgentId::new();
    governor.track_agent(child, Some(root));
    governor.track_agent(grandchild, Some(child));
    let unrelated = tracked_root(&governor);
    let deep = thread_at_depth(2, None);
    let top = thread_at_depth(0, None);

    governor.pause_agent_hierarchy(root, "operator review");
    governor.pause_agent_hierarchy(root, "second pause is a no-op");
    let paused = governor.get_system_metrics().paused_hierarchies;
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].reason, "operator review");

    for agent in [root, child, grandchild] {
        let response = governor.request_approval(&request(Operation::LlmCall, agent, &deep));
        assert!(!response.approved);
        assert!(response.reason.contains("hierarchy is paused"), "reason: {}", response.reason);
    }
    assert!(governor.request_approval(&request(Operation::LlmCall, unrelated, &top)).approved);

    governor.resume_agent_hierarchy(root);
    governor.resume_agent_hierarchy(root);
    assert!(!governor.is_hierarchy_paused(root));
    assert!(governor.request_approval(&request(Operation::LlmCall, grandchild, &deep)).approved);
}

/// Test 17: untracked requesters are resolved through their thread's parent
#[test]
fn test_pause_walk_uses_thread_parent_for_untracked_agent() {
    let governor = ResourceGovernor::default();
    let root = tracked_root(&governor);
    governor.pause_agent_hierarchy(root, "frozen");

    let stranger = AgentId::new();
    let thread = thread_at_depth(1, Some(root));
    let response = governor.request_approval(&request(Operation::LlmCall, stranger, &thread));
    assert!(!response.approved);
    assert!(response.reason.contains("hierarchy is paused"));
}

/// Test 18: usage totals are field-wise sums and removal purges them
#[test]
fn test_usage_roundtrip_and_removal() {
    let governor = ResourceGovernor::default();
    let a = tracked_root(&governor);
    let b = tracked_root(&governor);

    let deltas = [
        ResourceUsage {
            llm_calls: 1,
            compute_units: 10,
            storage_bytes: 100,
            execution_time_ms: 5,
        },
        ResourceUsage {
            llm_calls: 2,
            compute_units: 0,
            storage_bytes: 50,
            execution_time_ms: 7,
        },
        ResourceUsage {
            llm_calls: 0,
            compute_units: 3,
            storage_bytes: 0,
            execution_time_ms: 11,
        },
    ];
    for delta in deltas {
        governor.update_resource_usage(a, delta);
    }
    governor.update_resource_usage(b, ResourceUsage::llm_calls(4));

    let expected_a = ResourceUsage {
        llm_calls: 3,
        compute_units: 13,
        storage_bytes: 150,
        execution_time_ms: 23,
    };
    assert_eq!(governor.agent_usage(a), Some(expected_a));
    assert_eq!(
        governor.get_system_metrics().total_resource_usage,
        expected_a + ResourceUsage::llm_calls(4)
    );

    governor.record_error(a, "a failed");
    governor.record_error(b, "b failed");
    governor.remove_agent(a);

    let metrics = governor.get_system_metrics();
    assert_eq!(metrics.total_resource_usage, ResourceUsage::llm_calls(4));
    assert_eq!(metrics.active_agents, 1);
    assert_eq!(metrics.error_history.len(), 1);
    assert_eq!(metrics.error_history[0].agent_id, b);
    assert_eq!(governor.agent_usage(a), None);
}

/// Test 19: limit checks are pure reads over the thread's budget
#[test]
fn test_check_resource_limits() {
    let governor = ResourceGovernor::default();
    let thread = thread_at_depth(0, None);
    let fresh = AgentId::new();
    assert!(governor.check_resource_limits(fresh, &thread), "no history is always within limits");

    let agent = tracked_root(&governor);
    governor.update_resource_usage(agent, ResourceUsage::llm_calls(100));
    assert!(governor.check_resource_limits(agent, &thread));
    governor.update_resource_usage(agent, ResourceUsage::llm_calls(1));
    assert!(!governor.check_resource_limits(agent, &thread));
}

/// Test 20: a burst far above the trailing average pauses the tree root
#[test]
fn test_cost_spike_pauses_root_and_opens_breaker() {
    let governor = ResourceGovernor::default();
    let root = tracked_root(&governor);
    let child = AgentId::new();
    governor.track_agent(child, Some(root));
    let compute = |units| ResourceUsage {
        compute_units: units,
        ..ResourceUsage::default()
    };

    for _ in 0..3 {
        governor.update_resource_usage(child, compute(10));
    }
    assert_eq!(governor.circuit_breaker_state(), CircuitState::Closed);

    governor.update_resource_usage(child, compute(100));

    let metrics = governor.get_system_metrics();
    assert!(metrics.circuit_breaker_info.cost_spike);
    assert_eq!(metrics.circuit_breaker_info.status, CircuitState::Open);
    assert!(governor.is_hierarchy_paused(root));
    assert!(!governor.is_hierarchy_paused(child));
}

/// Test 21: malformed operations are rejected at the trust boundary
#[test]
fn test_external_request_with_unknown_operation() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);

    let response = governor.request_approval_external(&external("launch_missiles", agent));
    assert!(!response.approved);
    assert!(response.reason.contains("Unknown operation type"));

    assert!(governor.request_approval_external(&external("memory_access", agent)).approved);
}

/// Test 22: breaker, tempo and pause are reported before an unknown operation
#[test]
fn test_external_unknown_operation_follows_approval_order() {
    let governor = ResourceGovernor::default();
    let agent = tracked_root(&governor);
    let malformed = external("launch_missiles", agent);

    governor.pause_agent_hierarchy(agent, "audit");
    let paused = governor.request_approval_external(&malformed);
    assert!(paused.reason.contains("hierarchy is paused"), "reason: {}", paused.reason);

    governor.set_system_tempo(SystemTempo::Sleep);
    let asleep = governor.request_approval_external(&malformed);
    assert!(asleep.reason.contains("Sleep mode"), "reason: {}", asleep.reason);

    governor.set_circuit_breaker_state(CircuitState::Open);
    let open = governor.request_approval_external(&malformed);
    assert!(!open.approved);
    assert!(open.reason.contains("circuit breaker is open"), "reason: {}", open.reason);
}

/// Test 23: denials and breaker transitions are published
#[tokio::test]
async fn test_governor_events_published() {
    let event_bus = EventBus::new(64);
    let mut receiver = event_bus.subscribe();
    let governor = ResourceGovernor::default().with_event_bus(event_bus);
    let agent = tracked_root(&governor);

    governor.set_system_tempo(SystemTempo::Sleep);
    governor.request_approval(&request(Operation::LlmCall, agent, &thread_at_depth(0, None)));
    governor.set_circuit_breaker_state(CircuitState::Open);

    let events = receiver.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::Governor(GovernorEvent::TempoChanged { to: SystemTempo::Sleep, .. })
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::Governor(GovernorEvent::ApprovalDenied { operation: Operation::LlmCall, .. })
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::Governor(GovernorEvent::CircuitBreakerTransitioned {
            to: CircuitState::Open,
            ..
        })
    )));
}
