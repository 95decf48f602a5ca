//! Wire model for `POST /execute`

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Language;
use crate::types::ResourceLimits;

/// Error reported for a test whose process exceeded its wall clock budget
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// A job: source code plus the test cases to run it against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub test_cases: Vec<TestCase>,

    /// Function to call with each test's decoded input. Absent means
    /// stdin/stdout mode.
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Per-test wall clock budget. Absent means the configured default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default = "default_test_name")]
    pub name: String,

    /// Raw stdin, or a JSON value / argument list in function-call mode
    #[serde(default)]
    pub input: String,

    #[serde(default)]
    pub expected_output: String,

    /// Reporting hint for the caller; not interpreted here
    #[serde(default)]
    pub hidden: bool,
}

fn default_test_name() -> String {
    "test".to_owned()
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            hidden: false,
        }
    }
}

/// Request rejected before any work was done
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("timeout_ms must be positive")]
    ZeroTimeout,

    #[error("memory_limit_mb must be positive")]
    ZeroMemoryLimit,

    #[error("cpu_limit_seconds must be positive")]
    ZeroCpuLimit,

    #[error("entry point '{0}' is not a valid {1} identifier")]
    InvalidEntryPoint(String, Language),
}

impl ExecutionRequest {
    /// Entry point, treating an empty string as absent
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref().filter(|name| !name.is_empty())
    }

    /// Check the request against the language it will run under
    pub fn validate(&self, language: Language) -> Result<(), RequestError> {
        if self.timeout_ms == Some(0) {
            return Err(RequestError::ZeroTimeout);
        }
        if self.memory_limit_mb == Some(0) {
            return Err(RequestError::ZeroMemoryLimit);
        }
        if self.cpu_limit_seconds == Some(0) {
            return Err(RequestError::ZeroCpuLimit);
        }
        if let Some(name) = self.entry_point()
            && language.supports_entry_point()
            && !language.is_valid_identifier(name)
        {
            return Err(RequestError::InvalidEntryPoint(name.to_owned(), language));
        }
        Ok(())
    }

    /// Limits requested by the caller, before clamping
    pub fn limit_overrides(&self) -> ResourceLimits {
        ResourceLimits {
            timeout_ms: self.timeout_ms,
            cpu_time_limit: self.cpu_limit_seconds,
            memory_limit: self.memory_limit_mb,
            ..ResourceLimits::unset()
        }
    }
}

/// Verdict for one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Set when the test failed for a reason other than an output mismatch
    pub error: Option<String>,
}

impl TestResult {
    /// Process exited cleanly; pass or plain mismatch
    pub fn compared(test: &TestCase, actual: String, passed: bool) -> Self {
        Self {
            name: test.name.clone(),
            passed,
            expected: Some(test.expected_output.clone()),
            actual: Some(actual),
            error: None,
        }
    }

    /// Process exited abnormally after producing `actual`
    pub fn crashed(test: &TestCase, actual: String, error: String) -> Self {
        Self {
            name: test.name.clone(),
            passed: false,
            expected: Some(test.expected_output.clone()),
            actual: Some(actual),
            error: Some(error),
        }
    }

    pub fn timed_out(test: &TestCase) -> Self {
        Self::harness_error(test, TIMEOUT_MESSAGE)
    }

    /// The harness could not run the test at all
    pub fn harness_error(test: &TestCase, error: impl Into<String>) -> Self {
        Self {
            name: test.name.clone(),
            passed: false,
            expected: Some(test.expected_output.clone()),
            actual: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate response for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// One entry per test case, in request order
    pub results: Vec<TestResult>,
    /// Compiler diagnostics; when set no test ran
    pub compile_error: Option<String>,
    /// Failure of the whole job not tied to a test case
    pub runtime_error: Option<String>,
}

impl ExecutionResult {
    pub fn from_results(results: Vec<TestResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn compile_failed(message: impl Into<String>) -> Self {
        Self {
            compile_error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn job_failed(message: impl Into<String>) -> Self {
        Self {
            runtime_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// True when at least one test ran and every test passed
    pub fn all_passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }
}
