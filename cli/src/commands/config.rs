// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arbor_core::domain::config::GovernorConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/governor-config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/governor-config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./arbor-config.yaml)
        #[arg(short, long, default_value = "./arbor-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GovernorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. ARBOR_CONFIG_PATH: {}",
            std::env::var("ARBOR_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./arbor-config.yaml");
        println!("  4. ~/.arbor/config.yaml");
        println!("  5. /etc/arbor/config.yaml");
        println!();
    }

    let spec = &config.spec;
    let limits = &spec.limits;

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Initial tempo: {}", spec.initial_tempo);
    println!();

    println!("{}", "Agent Limits:".bold());
    println!("  Max recursion depth: {}", limits.max_recursion_depth);
    println!("  Max active agents: {}", limits.max_active_agents);
    println!("  Max system agents: {}", limits.max_system_agents);
    println!("  Budget safety margin: {}", limits.budget_safety_margin);
    println!();

    let breaker = &limits.circuit_breaker;
    println!("{}", "Circuit Breaker:".bold());
    println!("  Error rate threshold: {}", breaker.error_rate_threshold);
    println!("  Minimum samples: {}", breaker.minimum_samples);
    println!("  Cost spike threshold: {}x", breaker.cost_spike_threshold);
    println!("  Time window: {} ms", breaker.time_window_ms);
    println!("  Cooldown: {} ms", breaker.cooldown_ms);
    println!("  Half-open trials: {}", breaker.half_open_max_trials);
    println!();

    println!("{}", "Tempo:".bold());
    println!("  Low-intensity factor: {}", limits.tempo.low_intensity_factor);
    println!("  Step-down error volume: {}", limits.tempo.tempo_error_volume);
    println!();

    let budget = &spec.default_budget;
    println!("{}", "Default Root Budget:".bold());
    println!("  LLM calls: {}", budget.max_llm_calls);
    println!("  Compute units: {}", budget.max_compute_units);
    println!("  Storage bytes: {}", budget.max_storage_bytes);
    println!("  Execution time: {} ms", budget.max_execution_time_ms);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GovernorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    std::fs::write(&output, template(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn template(with_examples: bool) -> &'static str {
    if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    }
}
