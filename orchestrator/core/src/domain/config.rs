// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governor Configuration Types
//
// Defines the configuration schema for an Arbor governor, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - System resource limits (recursion depth, agent ceilings, budget margin)
// - Circuit breaker thresholds and windows
// - Tempo scaling
// - Default root budget and observability settings
//
// Every field carries a serde default, so a partial YAML document merges
// over the defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::governance::SystemTempo;
use crate::domain::resource::ResourceBudget;

pub const API_VERSION: &str = "arbor.dev/v1";
pub const KIND: &str = "GovernorConfig";

/// Upper bound for the breaker's time window and cool-down.
pub const MAX_BREAKER_SPAN_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Limits supplied at governor construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemResourceLimits {
    /// Agents exist at depths `0..=max_recursion_depth`.
    pub max_recursion_depth: u32,
    pub max_active_agents: usize,
    pub max_system_agents: usize,
    /// Fraction of an agent's budget it may commit before cloning is refused.
    pub budget_safety_margin: f64,
    pub circuit_breaker: CircuitBreakerConfig,
    pub tempo: TempoConfig,
}

impl Default for SystemResourceLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 3,
            max_active_agents: 10,
            max_system_agents: 20,
            budget_safety_margin: 0.9,
            circuit_breaker: CircuitBreakerConfig::default(),
            tempo: TempoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Trip when errors / (errors + operations) reaches this fraction.
    pub error_rate_threshold: f64,
    /// Errors plus operations needed in the window before the rate counts.
    pub minimum_samples: usize,
    /// Trip when the newest usage delta exceeds the trailing mean by this ratio.
    pub cost_spike_threshold: f64,
    pub time_window_ms: u64,
    /// Open → half-open after this long.
    pub cooldown_ms: u64,
    pub half_open_max_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.5,
            minimum_samples: 1,
            cost_spike_threshold: 3.0,
            time_window_ms: 60_000,
            cooldown_ms: 30_000,
            half_open_max_trials: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Multiplier on quota ceilings outside High-Performance.
    pub low_intensity_factor: f64,
    /// Errors in the window that make a breaker trip also step tempo down.
    pub tempo_error_volume: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            low_intensity_factor: 0.5,
            tempo_error_volume: 10,
        }
    }
}

/// Top-level Kubernetes-style governor configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfigManifest {
    /// API version (must be "arbor.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GovernorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GovernorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfigSpec {
    pub limits: SystemResourceLimits,

    /// Budget for root agents whose profile carries none.
    pub default_budget: ResourceBudget,

    pub initial_tempo: SystemTempo,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for GovernorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "arbor-governor".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GovernorConfigSpec::default(),
        }
    }
}

impl GovernorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ARBOR_CONFIG_PATH environment variable
    /// 2. ./arbor-config.yaml (working directory)
    /// 3. ~/.arbor/config.yaml (user home)
    /// 4. /etc/arbor/config.yaml (system, Unix) or C:\ProgramData\Arbor\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ARBOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./arbor-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".arbor").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/arbor/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Arbor\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        let limits = &mut self.spec.limits;
        override_from_env("ARBOR_MAX_RECURSION_DEPTH", &mut limits.max_recursion_depth);
        override_from_env("ARBOR_MAX_ACTIVE_AGENTS", &mut limits.max_active_agents);
        override_from_env("ARBOR_MAX_SYSTEM_AGENTS", &mut limits.max_system_agents);
        override_from_env("ARBOR_SYSTEM_TEMPO", &mut self.spec.initial_tempo);
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.limits.validate()
    }
}

impl SystemResourceLimits {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_active_agents == 0 || self.max_system_agents == 0 {
            anyhow::bail!("Agent ceilings must be greater than zero");
        }

        if !(self.budget_safety_margin > 0.0 && self.budget_safety_margin <= 1.0) {
            anyhow::bail!(
                "budget_safety_margin must be in (0, 1], got {}",
                self.budget_safety_margin
            );
        }

        let breaker = &self.circuit_breaker;
        if !(breaker.error_rate_threshold > 0.0 && breaker.error_rate_threshold <= 1.0) {
            anyhow::bail!(
                "circuit_breaker.error_rate_threshold must be in (0, 1], got {}",
                breaker.error_rate_threshold
            );
        }
        if breaker.cost_spike_threshold <= 0.0 {
            anyhow::bail!("circuit_breaker.cost_spike_threshold must be positive");
        }
        if breaker.time_window_ms == 0 {
            anyhow::bail!("circuit_breaker.time_window_ms must be greater than zero");
        }
        for (field, value) in [
            ("time_window_ms", breaker.time_window_ms),
            ("cooldown_ms", breaker.cooldown_ms),
        ] {
            if value > MAX_BREAKER_SPAN_MS {
                anyhow::bail!(
                    "circuit_breaker.{} must be at most {} ms (7 days), got {}",
                    field,
                    MAX_BREAKER_SPAN_MS,
                    value
                );
            }
        }

        if !(self.tempo.low_intensity_factor > 0.0 && self.tempo.low_intensity_factor <= 1.0) {
            anyhow::bail!(
                "tempo.low_intensity_factor must be in (0, 1], got {}",
                self.tempo.low_intensity_factor
            );
        }

        Ok(())
    }
}

fn override_from_env<T>(var: &str, target: &mut T)
where
    T: std::str::FromStr + std::fmt::Debug,
{
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::info!("Environment override: {}={:?}", var, value);
            *target = value;
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", var, raw);
        }
    }
}
