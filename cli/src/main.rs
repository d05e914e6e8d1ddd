// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Arbor CLI
//!
//! The `arbor` binary inspects governor configuration and runs scripted
//! simulations of a governed agent tree.
//!
//! ## Commands
//!
//! - `arbor config show|validate|generate` - Configuration management
//! - `arbor simulate` - Build a tree under a governor and drive it with a scripted runtime

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use arbor_cli::commands::{self, ConfigCommand, SimulateArgs};
use arbor_core::domain::config::GovernorConfigManifest;

/// Arbor - governed recursive agent control plane
#[derive(Parser)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ARBOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: from config, else info]
    #[arg(long, global = true, env = "ARBOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format (compact, json) [default: from config, else compact]
    #[arg(long, global = true, env = "ARBOR_LOG_FORMAT")]
    log_format: Option<String>,

    /// Serve Prometheus metrics on this address while the command runs
    #[arg(long, global = true, env = "ARBOR_METRICS_ADDR", value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run a scripted agent tree against the configured governor
    #[command(name = "simulate")]
    Simulate {
        #[command(flatten)]
        args: SimulateArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flags and env win over the config file's observability section
    let observability = GovernorConfigManifest::load_or_default(cli.config.clone())
        .ok()
        .and_then(|manifest| manifest.spec.observability);
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| observability.as_ref().map(|o| o.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli
        .log_format
        .clone()
        .or_else(|| observability.map(|o| o.log_format))
        .unwrap_or_else(|| "compact".to_string());
    init_logging(&log_level, &log_format)?;

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Serving Prometheus metrics");
    }

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Simulate { args }) => commands::simulate::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        other => anyhow::bail!("Unknown log format '{}'. Use 'compact' or 'json'", other),
    }

    Ok(())
}
