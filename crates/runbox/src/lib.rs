//! A library for running untrusted code against test cases.
//!
//! Runbox is the core of a single-language code execution worker. A job is
//! source code plus an ordered list of test cases; runbox compiles the code if
//! the language needs it, runs every test case in a fresh resource-limited
//! child process and returns a verdict per test.
//!
//! # Features
//!
//! - **rlimit sandbox**: Address space, CPU time, file size and descriptor limits installed before exec, with process-group kill on timeout.
//! - **Scratch directories**: Private per-job directories removed on every exit path, with a fresh workspace and artifact copy per test.
//! - **Compile once, run many**: Compiled languages build one artifact, copied into every test case's workspace.
//! - **Function-call mode**: Call an entry point with JSON-decoded arguments instead of feeding stdin.
//! - **Bounded concurrency**: Test cases run in parallel with results kept in request order.
//! - **TOML configuration**: Layered file and environment configuration with per-language toolchain overrides.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, Toolchain};
pub use job::{
    ExecutionRequest, ExecutionResult, RequestError, TIMEOUT_MESSAGE, TestCase, TestResult,
};
pub use runner::{CompileError, Runner};
pub use sandbox::{ExecutionPool, SandboxError, Scratch};
pub use types::{ExecutionStatus, LimitExceeded, ProcessOutput, ResourceLimits};

pub mod config;
pub mod job;
pub mod runner;
pub mod sandbox;
pub mod types;
