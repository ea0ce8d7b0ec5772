//! Runtime configuration, loaded from an optional TOML file and passed
//! explicitly to the store, runner, orchestrator and worker.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub artifacts_dir: PathBuf,
    /// Skip the pipeline when both raw and report artifacts already exist.
    pub skip_if_artifacts_exist: bool,
    pub tools: ToolsConfig,
    pub queue: QueueConfig,
    pub llm: LlmConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            skip_if_artifacts_exist: true,
            tools: ToolsConfig::default(),
            queue: QueueConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AgentConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, spec) in self.tools.iter() {
            if spec.binary.trim().is_empty() {
                return Err(AgentError::Config(format!("tools.{name}.binary is empty")));
            }
            if spec.timeout_secs == 0 {
                return Err(AgentError::Config(format!(
                    "tools.{name}.timeout_secs must be greater than zero"
                )));
            }
        }
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.queue.capacity) {
            return Err(AgentError::Config(format!(
                "queue.capacity must be between 1 and {MAX_QUEUE_CAPACITY}"
            )));
        }
        Ok(())
    }
}

/// Binary path/name and deadline for one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub binary: String,
    pub timeout_secs: u64,
}

impl ToolSpec {
    pub fn new(binary: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            binary: binary.into(),
            timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub subfinder: ToolSpec,
    pub amass: ToolSpec,
    pub httpx: ToolSpec,
    pub katana: ToolSpec,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            subfinder: ToolSpec::new("subfinder", 180),
            amass: ToolSpec::new("amass", 240),
            httpx: ToolSpec::new("httpx", 180),
            katana: ToolSpec::new("katana", 180),
        }
    }
}

impl ToolsConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ToolSpec)> {
        [
            ("subfinder", &self.subfinder),
            ("amass", &self.amass),
            ("httpx", &self.httpx),
            ("katana", &self.katana),
        ]
        .into_iter()
    }
}

/// Largest accepted `queue.capacity` (tokio's bounded channel panics on huge capacities).
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    /// Upper bound on waiting for the worker during shutdown.
    pub join_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            join_timeout_secs: 5,
        }
    }
}

impl QueueConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

/// Optional local model used to narrate findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:11434/api/generate".to_string(),
            model: "deepseek-coder:1.3b".to_string(),
            timeout_secs: 180,
            temperature: 0.2,
        }
    }
}
