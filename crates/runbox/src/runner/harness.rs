//! Running one test case and judging its output
//!
//! Each test runs in its own workspace, a fresh directory inside the job's
//! scratch directory holding a private copy of the artifact. The workspace is
//! removed as soon as the test finishes.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::RunConfig;
use crate::job::{TestCase, TestResult};
use crate::runner::compile::Snapshot;
use crate::runner::driver::{ARGS_FILE_ENV, ARGS_FILE_NAME};
use crate::sandbox::{ExecutionPool, SandboxCommand, SandboxError, Scratch, run};
use crate::types::{ExecutionStatus, ProcessOutput, ResourceLimits};

/// Spawns tried while a freshly written binary is still open for writing in
/// another forked child
const SPAWN_ATTEMPTS: u32 = 3;

const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// How the program receives a test's input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Input is the program's stdin
    Stdin,
    /// Input is a JSON value passed to the entry point by the driver
    FunctionCall,
}

/// Everything test processes of one job share
#[derive(Debug, Clone, Copy)]
pub struct Harness<'a> {
    pub scratch: &'a Scratch,
    pub artifact: &'a Snapshot,
    pub run: &'a RunConfig,
    pub limits: &'a ResourceLimits,
    pub mode: InvocationMode,
    pub pool: &'a ExecutionPool,
}

impl Harness<'_> {
    /// Run one test case in a fresh sandboxed process
    ///
    /// Never fails: problems running the test are reported in the result.
    #[instrument(skip_all, fields(test = %test.name))]
    pub async fn run_test_case(&self, test: &TestCase) -> TestResult {
        if self.mode == InvocationMode::FunctionCall
            && let Err(e) = serde_json::from_str::<serde_json::Value>(&test.input)
        {
            debug!(error = %e, "test input is not valid JSON");
            return TestResult::harness_error(test, format!("invalid JSON input: {e}"));
        }

        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => return TestResult::harness_error(test, e.to_string()),
        };

        let workspace = match self.scratch.workspace() {
            Ok(workspace) => workspace,
            Err(e) => return TestResult::harness_error(test, e.to_string()),
        };
        let command = match self.prepare(workspace.path(), test).await {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "failed to prepare test workspace");
                return TestResult::harness_error(test, e.to_string());
            }
        };

        match spawn(command, test.input.as_bytes()).await {
            Ok(output) => classify(test, &output),
            Err(e) => {
                debug!(error = %e, "failed to start test process");
                TestResult::harness_error(test, e.to_string())
            }
        }
    }

    /// Fill a test's workspace and build the command that runs in it
    async fn prepare(
        &self,
        workspace: &Path,
        test: &TestCase,
    ) -> Result<SandboxCommand, SandboxError> {
        let artifact = self.artifact.place(workspace).await?;

        let mut command = SandboxCommand::new(artifact.run_command(self.run))
            .working_dir(workspace)
            .path(&self.run.path)
            .envs(&self.run.env)
            .limits(self.limits.clone())
            .memory_rlimit(self.run.memory_rlimit);

        if self.mode == InvocationMode::FunctionCall {
            let args = workspace.join(ARGS_FILE_NAME);
            tokio::fs::write(&args, &test.input).await?;
            command = command.env(ARGS_FILE_ENV, args.to_string_lossy());
        }
        Ok(command)
    }
}

/// Run a test process, retrying spawns that hit ETXTBSY
async fn spawn(command: SandboxCommand, stdin: &[u8]) -> Result<ProcessOutput, SandboxError> {
    let mut attempt = 1;
    loop {
        match run(command.clone(), Some(stdin)).await {
            Err(SandboxError::SpawnFailed(e))
                if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < SPAWN_ATTEMPTS =>
            {
                debug!(attempt, "executable busy, retrying spawn");
                attempt += 1;
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

/// Turn a finished process into a verdict
pub fn classify(test: &TestCase, output: &ProcessOutput) -> TestResult {
    if output.status == ExecutionStatus::TimeLimitExceeded {
        return TestResult::timed_out(test);
    }

    let actual = output.stdout_lossy().trim().to_owned();

    if !output.is_success() {
        let stderr = output.stderr_lossy();
        let stderr = stderr.trim();
        let error = if stderr.is_empty() {
            format!("Exit code: {}", output.exit_status())
        } else {
            stderr.to_owned()
        };
        return TestResult::crashed(test, actual, error);
    }

    let passed = outputs_match(&test.expected_output, &actual);
    TestResult::compared(test, actual, passed)
}

/// Exact comparison after trimming surrounding whitespace on both sides
pub fn outputs_match(expected: &str, actual: &str) -> bool {
    expected.trim() == actual.trim()
}
