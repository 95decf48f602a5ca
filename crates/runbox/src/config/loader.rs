//! Configuration loading for runbox
//!
//! Layers the embedded example config, an optional TOML file and `RUNBOX_*`
//! environment variables using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat, Map};

use crate::config::language::is_plain_file_name;
use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, Language};

impl Config {
    /// Load configuration: embedded defaults, then `path` (if any), then environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Load configuration from a file layered over the embedded defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(&content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), reading environment variables from `env`
    /// instead of the process environment when given
    pub(crate) fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            let content = read_file(path)?;
            builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, toolchain) in &self.toolchains {
            key.parse::<Language>()?;

            if !is_plain_file_name(&toolchain.source_name) {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{key}' has invalid source name '{}'",
                    toolchain.source_name
                )));
            }
            if toolchain.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{key}' has empty run command"
                )));
            }
            if let Some(ref compile) = toolchain.compile {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "toolchain '{key}' has empty compile command"
                    )));
                }
                if !is_plain_file_name(&compile.output_name) {
                    return Err(ConfigError::Invalid(format!(
                        "toolchain '{key}' has invalid output name '{}'",
                        compile.output_name
                    )));
                }
            }
        }

        if self.concurrency.per_job == 0 || self.concurrency.max_processes == 0 {
            return Err(ConfigError::Invalid(
                "concurrency limits must be at least 1".to_owned(),
            ));
        }

        if self.default_limits.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "default_limits.timeout_ms must be positive".to_owned(),
            ));
        }

        if !self.default_limits.is_within(&self.max_limits) {
            return Err(ConfigError::Invalid(
                "default_limits exceed max_limits".to_owned(),
            ));
        }

        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}
