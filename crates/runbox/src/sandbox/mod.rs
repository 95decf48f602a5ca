//! Process sandbox for untrusted code
//!
//! Every child runs in its own process group, inside a private scratch
//! directory, with a cleared environment and rlimits installed between fork
//! and exec. The whole group is killed when the leader exits or times out,
//! before the leader is reaped, and when a run is abandoned midway.
//!
//! This is an rlimit baseline, not full isolation: there is no network or
//! filesystem namespace, so deployments should still run the worker in a
//! container.

use std::path::Path;

use thiserror::Error;

pub use crate::sandbox::pool::{ExecutionPool, ProcessPermit};
pub use crate::sandbox::process::{SandboxCommand, run};
pub use crate::sandbox::rlimit::RlimitPolicy;
pub use crate::sandbox::scratch::Scratch;

mod pool;
mod process;
mod rlimit;
mod scratch;

/// Errors that occur while preparing or spawning a sandboxed process
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create scratch directory: {0}")]
    ScratchFailed(#[source] std::io::Error),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("command '{0}' not found in PATH")]
    CommandNotFound(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("process pool is closed")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the program in a command to an absolute path using `search_path`.
///
/// Children run with a cleared environment, so the program is looked up
/// against the sandbox PATH before spawning. A missing compiler or interpreter
/// then surfaces as a readable error instead of a bare ENOENT.
///
/// Commands that already contain a `/` (like `./main` or `/usr/bin/g++`) are
/// left unchanged.
pub fn resolve_command(command: &mut [String], search_path: &str) -> Result<(), SandboxError> {
    let first = match command.first_mut() {
        Some(first) => first,
        None => return Err(SandboxError::EmptyCommand),
    };

    // Already an absolute or relative path
    if first.contains('/') {
        return Ok(());
    }

    for dir in search_path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(&*first);
        if candidate.is_file() {
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(SandboxError::CommandNotFound(first.clone()))
}
