//! Code runner for runbox
//!
//! Drives one job through the compile stage and the test harness.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use crate::runner::compile::{Artifact, Snapshot, compile};
pub use crate::runner::driver::{ARGS_FILE_ENV, synthesize as synthesize_driver};
pub use crate::runner::harness::{Harness, InvocationMode, classify, outputs_match};

mod compile;
mod driver;
mod harness;

use crate::{
    config::{Config, Language, Toolchain},
    job::{ExecutionRequest, ExecutionResult, RequestError},
    sandbox::{ExecutionPool, SandboxError, Scratch, resolve_command},
};

/// Errors that stop a job before any test runs
///
/// `Display` is the text reported as `compile_error`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{output}")]
    Failed { exit_code: i32, output: String },

    #[error("Compilation timed out")]
    Timeout,

    #[error("{0}")]
    Sandbox(#[from] SandboxError),
}

/// High-level runner for one language
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    toolchain: Toolchain,
    pool: ExecutionPool,
}

impl Runner {
    /// Create a new runner with its own process pool
    pub fn new(config: Config) -> Self {
        let pool = ExecutionPool::new(config.concurrency.max_processes);
        Self::with_pool(config, pool)
    }

    /// Create a runner that shares `pool` with other runners
    pub fn with_pool(config: Config, pool: ExecutionPool) -> Self {
        let toolchain = config.toolchain();
        Self {
            config: Arc::new(config),
            toolchain,
            pool,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Language this runner serves
    pub fn language(&self) -> Language {
        self.config.language
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    /// Run a job
    ///
    /// Only an invalid request is an error. Compile failures and problems
    /// that affect the whole job are reported inside the result; problems
    /// with single tests are reported in their [`TestResult`](crate::job::TestResult).
    #[instrument(skip_all, fields(language = %self.language(), tests = request.test_cases.len()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RequestError> {
        let language = self.language();
        request.validate(language)?;

        let limits = self.config.effective_limits(
            self.toolchain.run.limits.as_ref(),
            Some(&request.limit_overrides()),
        );

        let (mode, source) = match request.entry_point() {
            Some(entry_point) => match synthesize_driver(language, &request.code, entry_point) {
                Some(driver) => (InvocationMode::FunctionCall, driver),
                None => {
                    warn!(entry_point, "entry point ignored, {language} runs in stdin mode");
                    (InvocationMode::Stdin, request.code.clone())
                }
            },
            None => (InvocationMode::Stdin, request.code.clone()),
        };

        let scratch = match Scratch::create(self.config.scratch_root.as_deref()) {
            Ok(scratch) => scratch,
            Err(e) => return Ok(ExecutionResult::job_failed(e.to_string())),
        };

        let artifact = match self.build(&scratch, source.as_bytes()).await {
            Ok(artifact) => artifact,
            Err(e) => {
                info!(error = %e, "compilation failed");
                return Ok(ExecutionResult::compile_failed(e.to_string()));
            }
        };

        let mut command = artifact.run_command(&self.toolchain.run);
        if let Err(e) = resolve_command(&mut command, &self.toolchain.run.path) {
            return Ok(ExecutionResult::job_failed(e.to_string()));
        }
        let snapshot = match artifact.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return Ok(ExecutionResult::job_failed(e.to_string())),
        };

        let harness = Harness {
            scratch: &scratch,
            artifact: &snapshot,
            run: &self.toolchain.run,
            limits: &limits,
            mode,
            pool: &self.pool,
        };

        // `buffered` yields in input order whatever order the tests finish in
        let harness = &harness;
        let pending: Vec<_> = request
            .test_cases
            .iter()
            .map(move |test| harness.run_test_case(test))
            .collect();
        let results = stream::iter(pending)
            .buffered(self.config.concurrency.per_job)
            .collect::<Vec<_>>()
            .await;

        let result = ExecutionResult::from_results(results);
        info!(
            passed = result.passed_count(),
            total = result.results.len(),
            "job finished"
        );

        scratch.close().ok();
        Ok(result)
    }

    /// Compile stage, holding a process slot while the compiler runs
    async fn build(&self, scratch: &Scratch, source: &[u8]) -> Result<Artifact, CompileError> {
        let _permit = match self.toolchain.compile {
            Some(_) => Some(self.pool.acquire().await?),
            None => None,
        };
        compile::compile(scratch, &self.toolchain, source, None).await
    }
}
