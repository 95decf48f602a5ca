//! Compilation step for code execution
//!
//! Writes the submitted source into the scratch directory and, for compiled
//! toolchains, turns it into the binary every test case runs.

use std::ffi::OsString;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::config::{MemoryRlimit, RunConfig, Toolchain};
use crate::runner::CompileError;
use crate::sandbox::{SandboxCommand, SandboxError, Scratch, run};
use crate::types::{ExecutionStatus, ResourceLimits};

/// The file test processes execute, ready in the scratch directory
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Absolute path of the written source
    pub source: PathBuf,

    /// Absolute path of the compiled binary (None for interpreted toolchains)
    pub binary: Option<PathBuf>,
}

impl Artifact {
    /// The file the run command executes or interprets
    pub fn executed(&self) -> &Path {
        self.binary.as_deref().unwrap_or(&self.source)
    }

    /// Expand a run command against this artifact
    pub fn run_command(&self, run: &RunConfig) -> Vec<String> {
        let source = self.source.to_string_lossy();
        let binary = self.executed().to_string_lossy();
        Toolchain::expand_command(&run.command, &source, &binary)
    }

    /// Read the executed file into memory
    pub async fn snapshot(&self) -> Result<Snapshot, SandboxError> {
        let executed = self.executed();
        let name = executed
            .file_name()
            .ok_or_else(|| SandboxError::InvalidPath(executed.display().to_string()))?
            .to_owned();
        let contents = tokio::fs::read(executed).await?;
        debug!(path = %executed.display(), len = contents.len(), "took artifact snapshot");
        Ok(Snapshot {
            artifact: self.clone(),
            name,
            contents,
        })
    }
}

/// An artifact's executed file, held in memory after compilation
///
/// Every test runs its own copy written by [`Snapshot::place`], so whatever a
/// test does to the file it runs never reaches another test.
#[derive(Debug, Clone)]
pub struct Snapshot {
    artifact: Artifact,
    name: OsString,
    contents: Vec<u8>,
}

impl Snapshot {
    /// Write a read-only copy into `dir` and return the artifact that uses it
    pub async fn place(&self, dir: &Path) -> Result<Artifact, SandboxError> {
        let path = dir.join(&self.name);
        tokio::fs::write(&path, &self.contents).await?;

        let placed = match self.artifact.binary {
            Some(_) => Artifact {
                source: self.artifact.source.clone(),
                binary: Some(path.clone()),
            },
            None => Artifact {
                source: path.clone(),
                binary: None,
            },
        };
        let mode = if placed.binary.is_some() { 0o500 } else { 0o400 };
        tokio::fs::set_permissions(&path, Permissions::from_mode(mode)).await?;
        Ok(placed)
    }
}

/// Default compilation limits
fn default_compile_limits() -> ResourceLimits {
    ResourceLimits {
        timeout_ms: Some(30_000),
        cpu_time_limit: Some(30),
        memory_limit: Some(1024),
        max_processes: None,
        max_open_files: Some(256),
        max_output: Some(65536), // 64 MB, also bounds the binary size
    }
}

/// Write `source` and compile it if the toolchain needs it
///
/// `limits` overrides the toolchain's compile limits, which override the
/// compile defaults. A compiler failure, a compile timeout or a missing
/// compiler are all reported as [`CompileError`].
#[instrument(skip(scratch, toolchain, source, limits))]
pub async fn compile(
    scratch: &Scratch,
    toolchain: &Toolchain,
    source: &[u8],
    limits: Option<&ResourceLimits>,
) -> Result<Artifact, CompileError> {
    let source_path = scratch.write_file(&toolchain.source_name, source).await?;
    debug!(source_name = %toolchain.source_name, "wrote source file");

    let Some(ref compile_config) = toolchain.compile else {
        return Ok(Artifact {
            source: source_path,
            binary: None,
        });
    };

    let mut effective_limits = default_compile_limits();
    if let Some(ref lang_limits) = compile_config.limits {
        effective_limits = effective_limits.with_overrides(lang_limits);
    }
    if let Some(user_limits) = limits {
        effective_limits = effective_limits.with_overrides(user_limits);
    }

    let binary_path = scratch.file_path(&compile_config.output_name)?;
    let expanded_cmd = Toolchain::expand_command(
        &compile_config.command,
        &source_path.to_string_lossy(),
        &binary_path.to_string_lossy(),
    );

    let command = SandboxCommand::new(expanded_cmd)
        .working_dir(scratch.path())
        .path(&toolchain.run.path)
        .envs(&compile_config.env)
        .limits(effective_limits)
        .memory_rlimit(MemoryRlimit::AddressSpace);

    let output = run(command, None).await?;

    debug!(
        status = ?output.status,
        exit_code = ?output.exit_code,
        wall_time = output.wall_time,
        "compilation complete"
    );

    if output.status == ExecutionStatus::TimeLimitExceeded {
        return Err(CompileError::Timeout);
    }

    if !output.is_success() {
        let stderr = output.stderr_lossy();
        let diagnostics = if !stderr.trim().is_empty() {
            stderr
        } else {
            let stdout = output.stdout_lossy();
            if !stdout.trim().is_empty() {
                stdout
            } else {
                format!("Compiler exited with code {}", output.exit_status())
            }
        };
        return Err(CompileError::Failed {
            exit_code: output.exit_status(),
            output: diagnostics,
        });
    }

    if !scratch.file_exists(&compile_config.output_name).await? {
        return Err(CompileError::Failed {
            exit_code: 0,
            output: format!(
                "compiler did not produce '{}'",
                compile_config.output_name
            ),
        });
    }

    Ok(Artifact {
        source: source_path,
        binary: Some(binary_path),
    })
}
