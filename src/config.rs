//! Agent configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a runnable configuration. Command-line flags are
//! applied on top by the binary.

use crate::protocol::{Color, ProtocolGeneration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub polling: PollingSection,
    /// Profile overrides and additions, keyed by profile name
    #[serde(default)]
    pub profiles: BTreeMap<String, AgentProfile>,
}

/// Dispatch server connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Bound on each request, connect through last response byte
    pub timeout_secs: u64,
    pub generation: ProtocolGeneration,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            timeout_secs: 10,
            generation: ProtocolGeneration::default(),
        }
    }
}

/// Agent identity and behaviour profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    /// Preferred display name; a random one is generated when absent
    pub name: Option<String>,
    /// RGB color in 0.0..=1.0; a random one is generated when absent
    pub color: Option<[f32; 3]>,
    /// Key into the profile table ("loader", "runner", or a custom one)
    pub profile: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: None,
            color: None,
            profile: "runner".to_string(),
        }
    }
}

/// Task polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingSection {
    /// Fixed wait after a "no tasks" response before asking again
    pub no_task_backoff_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            no_task_backoff_ms: 2000,
        }
    }
}

impl PollingSection {
    pub fn no_task_backoff(&self) -> Duration {
        Duration::from_millis(self.no_task_backoff_ms)
    }
}

/// Timing constants for one kind of robot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    /// Length of each sleep while loading or handing off
    pub loading_step_ms: u64,
    /// Number of loading sleeps per loading or hand-off phase
    pub loading_steps: u32,
    /// Sleep after each position update
    pub movement_step_ms: u64,
    /// Position updates per edge before the arrival update
    pub steps_per_edge: u32,
}

impl AgentProfile {
    /// Slow to move, quick to load
    pub const LOADER: AgentProfile = AgentProfile {
        loading_step_ms: 500,
        loading_steps: 4,
        movement_step_ms: 100,
        steps_per_edge: 10,
    };

    /// Quick to move, slow to load
    pub const RUNNER: AgentProfile = AgentProfile {
        loading_step_ms: 1000,
        loading_steps: 4,
        movement_step_ms: 40,
        steps_per_edge: 10,
    };

    /// Built-in profile for a robot type string
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "loader" => Some(Self::LOADER),
            "runner" => Some(Self::RUNNER),
            _ => None,
        }
    }

    pub fn loading_step(&self) -> Duration {
        Duration::from_millis(self.loading_step_ms)
    }

    pub fn movement_step(&self) -> Duration {
        Duration::from_millis(self.movement_step_ms)
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.steps_per_edge == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "profile '{name}': steps_per_edge must be at least 1"
            )));
        }
        if self.loading_steps == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "profile '{name}': loading_steps must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Unknown agent profile: {0}")]
    UnknownProfile(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the agent relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "server.host must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must not be 0".to_string(),
            ));
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.timeout_secs must be at least 1".to_string(),
            ));
        }

        if let Some(name) = &self.agent.name {
            validate_agent_name(name)?;
        }
        if let Some(color) = self.agent.color {
            if !Color::from(color).is_normalized() {
                return Err(ConfigError::InvalidConfig(format!(
                    "agent.color components must be within 0.0..=1.0, got {color:?}"
                )));
            }
        }

        for (name, profile) in &self.profiles {
            profile.validate(name)?;
        }
        self.profile()?;

        Ok(())
    }

    /// Resolve the selected profile: file overrides first, then built-ins
    pub fn profile(&self) -> Result<AgentProfile, ConfigError> {
        let name = &self.agent.profile;
        self.profiles
            .get(name)
            .copied()
            .or_else(|| AgentProfile::builtin(name))
            .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 5000

[agent]
name = "test-agent"
color = [0.0, 0.0, 1.0]
profile = "runner"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Names travel in a 16-byte ASCII field; longer ones are truncated on the
/// wire, so only emptiness and non-ASCII content are rejected here
fn validate_agent_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "agent.name must not be empty".to_string(),
        ));
    }
    if !name.is_ascii() {
        return Err(ConfigError::InvalidConfig(format!(
            "agent.name '{name}' must be ASCII"
        )));
    }
    Ok(())
}
