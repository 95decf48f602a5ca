use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_SANDBOX_PATH, Language, MemoryRlimit, RunConfig, Toolchain,
};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runbox.example.toml");

/// Prefix for environment variable overrides (`RUNBOX_LANGUAGE`, `RUNBOX_SERVER__BIND`)
pub const ENV_PREFIX: &str = "RUNBOX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Bounds on parallel child processes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Test cases of one job that may run at the same time
    #[serde(default = "default_per_job")]
    pub per_job: usize,

    /// Untrusted processes in flight across all requests
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            per_job: default_per_job(),
            max_processes: default_max_processes(),
        }
    }
}

/// Config for a runbox worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The one language this worker instance serves
    pub language: Language,

    #[serde(default)]
    pub server: ServerConfig,

    /// Parent directory for per-request scratch directories
    /// (system temp dir if not specified).
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Resource limits applied to every test process.
    /// Toolchain limits and request values override these.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Deployment-wide ceilings. Effective limits are clamped to these.
    #[serde(default = "ResourceLimits::unset")]
    pub max_limits: ResourceLimits,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Toolchain overrides keyed by language wire name
    #[serde(default)]
    pub toolchains: HashMap<String, Toolchain>,
}

impl Config {
    /// Create a config for `language` with built-in defaults and no overrides
    pub fn for_language(language: Language) -> Self {
        Self {
            language,
            server: ServerConfig::default(),
            scratch_root: None,
            default_limits: ResourceLimits::default(),
            max_limits: ResourceLimits::unset(),
            concurrency: ConcurrencyConfig::default(),
            toolchains: HashMap::new(),
        }
    }

    /// Toolchain for the configured language
    ///
    /// Falls back to the built-in toolchain when the config has no override.
    pub fn toolchain(&self) -> Toolchain {
        self.toolchains
            .get(self.language.as_str())
            .cloned()
            .unwrap_or_else(|| self.language.default_toolchain())
    }

    /// Layer limits: defaults, then toolchain, then request, then clamp to maxima
    pub fn effective_limits(
        &self,
        toolchain: Option<&ResourceLimits>,
        overrides: Option<&ResourceLimits>,
    ) -> ResourceLimits {
        let mut limits = self.default_limits.clone();
        if let Some(toolchain) = toolchain {
            limits = limits.with_overrides(toolchain);
        }
        if let Some(overrides) = overrides {
            limits = limits.with_overrides(overrides);
        }
        limits.clamp_to(&self.max_limits)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_owned()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_per_job() -> usize {
    4
}

fn default_max_processes() -> usize {
    8
}
