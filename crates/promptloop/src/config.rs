//! Project configuration file support for promptloop.
//!
//! Loads configuration from `promptloop.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use promptloop_agent::AgentType;
use promptloop_core::{DEFAULT_CYCLES, DEFAULT_QUERIES_PER_CYCLE};
use promptloop_critic::RoleKind;

/// Project-level configuration loaded from `promptloop.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Global default agent (applies to every role)
    pub agent: Option<String>,
    /// Global default model (applies to every role)
    pub model: Option<String>,
    #[serde(default)]
    pub responder: RoleConfig,
    #[serde(default)]
    pub evaluator: RoleConfig,
    #[serde(default)]
    pub rewriter: RoleConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Configuration for a specific role
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub agent: Option<String>,
    pub model: Option<String>,
}

/// Defaults for `promptloop train`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub cycles: Option<usize>,
    pub queries_per_cycle: Option<usize>,
    pub criteria: Option<String>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "promptloop.toml";

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn role(&self, role: RoleKind) -> &RoleConfig {
        match role {
            RoleKind::Responder => &self.responder,
            RoleKind::Evaluator => &self.evaluator,
            RoleKind::Rewriter => &self.rewriter,
        }
    }

    /// Get the effective agent name for a role.
    /// Priority: [role].agent > global agent > None
    pub fn agent_for(&self, role: RoleKind) -> Option<&str> {
        self.role(role).agent.as_deref().or(self.agent.as_deref())
    }

    /// Get the effective model for a role.
    /// Priority: [role].model > global model > None
    pub fn model_for(&self, role: RoleKind) -> Option<&str> {
        self.role(role).model.as_deref().or(self.model.as_deref())
    }
}

/// Agent and model one role runs with after all layers are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSettings {
    pub agent: AgentType,
    pub model: Option<String>,
}

impl RoleSettings {
    /// Priority: CLI flag > [role] section > global setting > Claude Code
    pub fn resolve(
        role: RoleKind,
        cli_agent: Option<AgentType>,
        cli_model: Option<&str>,
        project: &ProjectConfig,
    ) -> Result<Self> {
        let agent = match cli_agent {
            Some(agent) => agent,
            None => match project.agent_for(role) {
                Some(name) => name
                    .parse::<AgentType>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("Invalid agent for the {} role", role))?,
                None => AgentType::ClaudeCode,
            },
        };

        let model = cli_model
            .or_else(|| project.model_for(role))
            .map(String::from);

        Ok(Self { agent, model })
    }
}

/// Training shape after CLI flags override `[training]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSettings {
    pub cycles: usize,
    pub queries_per_cycle: usize,
    pub criteria: Option<String>,
}

impl TrainingSettings {
    pub fn resolve(
        cli_cycles: Option<usize>,
        cli_queries: Option<usize>,
        cli_criteria: Option<&str>,
        project: &ProjectConfig,
    ) -> Self {
        let training = &project.training;
        Self {
            cycles: cli_cycles.or(training.cycles).unwrap_or(DEFAULT_CYCLES),
            queries_per_cycle: cli_queries
                .or(training.queries_per_cycle)
                .unwrap_or(DEFAULT_QUERIES_PER_CYCLE),
            criteria: cli_criteria
                .map(String::from)
                .or_else(|| training.criteria.clone()),
        }
    }
}
