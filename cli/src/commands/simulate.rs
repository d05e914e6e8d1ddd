// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `arbor simulate` - drive a scripted agent tree against a governor
//!
//! Builds a governor from the loaded configuration, creates a coordinator,
//! clones workers under it and runs every worker's roundabout loop against a
//! scripted runtime. The first worker is scripted to fail `--failures` times
//! before succeeding. Child reports and system status are printed before the
//! whole tree is terminated.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use arbor_core::application::{AgentServices, ResourceGovernor, RoundaboutOutcome};
use arbor_core::domain::agent::{
    AgentId, AgentRole, ChildAgentReport, ChildStatus, ConfigurationProfile, TerminationFailure,
};
use arbor_core::domain::config::GovernorConfigManifest;
use arbor_core::domain::context_thread::ContextThread;
use arbor_core::domain::governance::{HealthLevel, SystemStatus, SystemTempo};
use arbor_core::infrastructure::runtime::{ScriptedOutcome, SimulatedTaskRuntime};
use arbor_swarm::{AgentFactory, AgentSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Top-level goal for the coordinator
    #[arg(long, default_value = "Prepare the quarterly report")]
    pub goal: String,

    /// Number of workers to clone under the coordinator
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Scripted failures for the first worker before it succeeds
    #[arg(long, default_value_t = 1)]
    pub failures: usize,

    /// Roundabout steps allowed per worker
    #[arg(long, default_value_t = 12)]
    pub max_steps: usize,

    /// Model name placed on every profile
    #[arg(long, default_value = "simulated")]
    pub model: String,

    /// Start the governor in this tempo (High-Performance, Low-Intensity, Sleep)
    #[arg(long)]
    pub tempo: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub agent_id: AgentId,
    pub completed: bool,
    pub failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub goal: String,
    pub coordinator_id: AgentId,
    pub clone_denials: Vec<String>,
    pub workers: Vec<WorkerOutcome>,
    pub child_reports: Vec<ChildAgentReport>,
    pub agents: Vec<AgentSummary>,
    pub status: SystemStatus,
    pub terminated: usize,
    pub termination_failures: Vec<TerminationFailure>,
}

pub async fn execute(args: SimulateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = GovernorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let report = run(&manifest, &args).await?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_table(&report),
    }
    Ok(())
}

/// Runs one simulation and returns what it observed. The tree is terminated
/// before returning.
pub async fn run(
    manifest: &GovernorConfigManifest,
    args: &SimulateArgs,
) -> Result<SimulationReport> {
    let governor = Arc::new(ResourceGovernor::from_manifest(manifest));
    if let Some(tempo) = &args.tempo {
        let tempo: SystemTempo = tempo.parse().context("Invalid --tempo")?;
        governor.set_system_tempo(tempo);
    }

    let runtime = Arc::new(SimulatedTaskRuntime::new());
    let mut factory = AgentFactory::new(AgentServices::new(governor.clone(), runtime.clone()));

    let profile = ConfigurationProfile::new(args.model.clone());
    let thread = ContextThread::root(
        args.goal.clone(),
        "coordinate the workers",
        profile.clone(),
        governor.default_budget(),
    );
    let coordinator = factory.create_agent(AgentRole::Coordinator, profile.clone(), thread)?;
    let coordinator_id = coordinator.id();
    info!(coordinator_id = %coordinator_id, workers = args.workers, "Starting simulation");

    let mut worker_ids = Vec::new();
    let mut clone_denials = Vec::new();
    for part in 1..=args.workers {
        let task = format!("{} (part {} of {})", args.goal, part, args.workers);
        match coordinator.clone_agent(profile.clone(), task) {
            Ok(worker) => worker_ids.push(worker.id()),
            Err(e) => {
                warn!(part, error = %e, "Worker clone denied");
                clone_denials.push(e.to_string());
            }
        }
    }

    if let Some(first) = worker_ids.first() {
        let failures = (1..=args.failures)
            .map(|n| ScriptedOutcome::fail(format!("draft {} was missing sections", n)));
        runtime.script(*first, failures);
    }

    let mut workers = Vec::with_capacity(worker_ids.len());
    for worker_id in &worker_ids {
        let Some(worker) = coordinator.get_child_agent_mut(*worker_id) else {
            continue;
        };
        let outcome = worker.run_to_completion(args.max_steps).await;
        let failures = worker.failure_history().len();
        workers.push(match outcome {
            Ok(RoundaboutOutcome::Emerge { result, .. }) => WorkerOutcome {
                agent_id: *worker_id,
                completed: true,
                failures,
                result: Some(result),
                error: None,
            },
            Ok(other) => WorkerOutcome {
                agent_id: *worker_id,
                completed: false,
                failures,
                result: Some(serde_json::to_value(other)?),
                error: None,
            },
            Err(e) => WorkerOutcome {
                agent_id: *worker_id,
                completed: false,
                failures,
                result: None,
                error: Some(e.to_string()),
            },
        });
    }

    let child_reports = coordinator.get_child_agent_reports().await;
    let agents = factory.summaries();
    let status = governor.get_system_status();

    let terminations = factory.terminate_all().await;
    let terminated = terminations.iter().map(|r| r.terminated.len()).sum();
    let termination_failures = terminations.into_iter().flat_map(|r| r.failures).collect();

    Ok(SimulationReport {
        goal: args.goal.clone(),
        coordinator_id,
        clone_denials,
        workers,
        child_reports,
        agents,
        status,
        terminated,
        termination_failures,
    })
}

fn print_table(report: &SimulationReport) {
    println!("{}", format!("Simulation: {}", report.goal).bold());
    println!("  Coordinator: {}", report.coordinator_id);
    for denial in &report.clone_denials {
        println!("  {} {}", "✗".red(), denial);
    }
    println!();

    println!("{}", "Agents:".bold());
    println!(
        "  {:<38} {:<12} {:<10} {:>5} {:>6} {:>9}",
        "ID", "ROLE", "PHASE", "DEPTH", "ACTIVE", "LLM CALLS"
    );
    for agent in &report.agents {
        let indent = "  ".repeat(agent.recursion_depth as usize);
        println!(
            "  {:<38} {:<12} {:<10} {:>5} {:>6} {:>9}",
            format!("{}{}", indent, agent.id),
            agent.role.to_string(),
            agent.phase.to_string(),
            agent.recursion_depth,
            agent.active,
            agent.resource_usage.llm_calls
        );
    }
    println!();

    println!("{}", "Workers:".bold());
    for worker in &report.workers {
        let mark = if worker.completed { "✓".green() } else { "✗".red() };
        let detail = worker.error.as_deref().unwrap_or("completed");
        println!("  {} {} ({} failures) {}", mark, worker.agent_id, worker.failures, detail);
    }
    println!();

    println!("{}", "Child reports:".bold());
    for child in &report.child_reports {
        let status = match child.status {
            ChildStatus::Running => child.status.to_string().green(),
            ChildStatus::Failed | ChildStatus::Error => child.status.to_string().red(),
            _ => child.status.to_string().yellow(),
        };
        println!("  {} {:<12} {}", child.child_id, status, child.task_definition);
        if let Some(error) = &child.error {
            println!("    {}", error.dimmed());
        }
    }
    println!();

    let metrics = &report.status.metrics;
    let health = match report.status.health {
        HealthLevel::Healthy => "healthy".green(),
        HealthLevel::Degraded => "degraded".yellow(),
        HealthLevel::Halted => "halted".red(),
    };
    println!("{}", "System:".bold());
    println!("  Health: {}", health);
    println!("  Tracked agents: {}", metrics.active_agents);
    println!("  Tempo: {}", metrics.system_tempo);
    println!(
        "  Circuit breaker: {} (error rate {:.2}, cost spike: {})",
        metrics.circuit_breaker_info.status,
        metrics.circuit_breaker_info.error_rate,
        metrics.circuit_breaker_info.cost_spike
    );
    let usage = &metrics.total_resource_usage;
    println!(
        "  Usage: {} LLM calls, {} compute units, {} bytes, {} ms",
        usage.llm_calls, usage.compute_units, usage.storage_bytes, usage.execution_time_ms
    );
    println!("  Errors recorded: {}", metrics.error_history.len());
    println!();

    println!(
        "Terminated {} agents ({} teardown failures)",
        report.terminated,
        report.termination_failures.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            goal: "Summarise incidents".to_string(),
            workers: 2,
            failures: 1,
            max_steps: 12,
            model: "simulated".to_string(),
            tempo: None,
            output: OutputFormat::Json,
        }
    }

    #[tokio::test]
    async fn test_simulation_recovers_scripted_failure() {
        let report = run(&GovernorConfigManifest::default(), &args()).await.unwrap();

        assert!(report.clone_denials.is_empty());
        assert_eq!(report.workers.len(), 2);
        assert!(report.workers.iter().all(|w| w.completed));
        assert_eq!(report.workers[0].failures, 1);
        assert_eq!(report.workers[1].failures, 0);

        assert_eq!(report.child_reports.len(), 2);
        assert_eq!(report.agents.len(), 3);
        assert_eq!(report.terminated, 3);
        assert!(report.termination_failures.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["agents"][0]["role"], "coordinator");
    }

    #[tokio::test]
    async fn test_simulation_reports_clone_denials() {
        let mut manifest = GovernorConfigManifest::default();
        manifest.spec.limits.max_active_agents = 2;

        let report = run(&manifest, &SimulateArgs { workers: 3, ..args() }).await.unwrap();
        assert_eq!(report.workers.len(), 1);
        assert_eq!(report.clone_denials.len(), 2);
        assert!(report.clone_denials[0].contains("Maximum system agents"));
    }

    #[tokio::test]
    async fn test_simulation_in_sleep_mode() {
        let report = run(
            &GovernorConfigManifest::default(),
            &SimulateArgs {
                tempo: Some("Sleep".to_string()),
                ..args()
            },
        )
        .await
        .unwrap();

        assert!(report.workers.is_empty());
        assert_eq!(report.status.health, HealthLevel::Halted);
        assert_eq!(report.clone_denials.len(), 2);
        assert!(report.clone_denials[0].contains("Sleep mode"));
        // The recorded denial trips the breaker for the next clone
        assert!(report.clone_denials[1].contains("circuit breaker is open"));
    }

    #[tokio::test]
    async fn test_invalid_tempo_is_rejected() {
        let err = run(
            &GovernorConfigManifest::default(),
            &SimulateArgs {
                tempo: Some("turbo".to_string()),
                ..args()
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid --tempo"));
    }
}
