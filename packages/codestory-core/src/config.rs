//! Pipeline configuration: the YAML shape from the operator-facing config
//! file, plus environment-variable overrides for credentials that should
//! never live in a checked-in YAML tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unknown step name in config: {0}")]
    UnknownStep(String),
}

/// Well-known step names. Kept as a string newtype rather than an enum here
/// so that config files can name steps without this crate depending on the
/// step registry (which lives in `codestory-pipeline` and may grow).
pub type StepName = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: StepName,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Step-specific parameters, forwarded verbatim; each step's config
    /// filter (spec ref: per-step parameter filtering) picks out the keys
    /// it recognizes and ignores the rest.
    #[serde(flatten)]
    pub params: HashMap<String, serde_yaml::Value>,
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_back_off_seconds")]
    pub back_off_seconds: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_back_off_seconds() -> u64 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            back_off_seconds: default_back_off_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub dependencies: HashMap<StepName, Vec<StepName>>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Graph store connection, left out of the checked-in YAML by
    /// convention; populated by `GraphStoreCredentials::from_env`.
    #[serde(skip)]
    pub graph_credentials: Option<GraphStoreCredentials>,
}

impl PipelineConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = serde_yaml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Loads the YAML file then overlays graph-store credentials from the
    /// environment, matching the teacher's separation of declarative config
    /// from secrets.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::from_file(path)?;
        cfg.graph_credentials = GraphStoreCredentials::from_env();
        Ok(cfg)
    }

    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Direct in-job dependencies declared for `step`, empty if unlisted.
    pub fn dependencies_of(&self, step: &str) -> &[StepName] {
        self.dependencies
            .get(step)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Validates that every step named in `dependencies` is also declared
    /// under `steps`, per the registry contract (unknown names fail closed).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let known: Vec<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
        for (step, deps) in &self.dependencies {
            if !known.contains(&step.as_str()) {
                return Err(ConfigError::UnknownStep(step.clone()));
            }
            for dep in deps {
                if !known.contains(&dep.as_str()) {
                    return Err(ConfigError::UnknownStep(dep.clone()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStoreCredentials {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl GraphStoreCredentials {
    /// Reads `CODESTORY_GRAPH_URI` / `_USERNAME` / `_PASSWORD`; returns
    /// `None` if any is unset so callers can fall back to an in-memory
    /// store for local runs and tests.
    pub fn from_env() -> Option<Self> {
        let uri = std::env::var("CODESTORY_GRAPH_URI").ok()?;
        let username = std::env::var("CODESTORY_GRAPH_USERNAME").ok()?;
        let password = std::env::var("CODESTORY_GRAPH_PASSWORD").ok()?;
        Some(Self {
            uri,
            username,
            password,
        })
    }
}
