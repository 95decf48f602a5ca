//! Resource limits installed in the child between fork and exec

use std::io;

use rlimit::Resource;

use crate::config::MemoryRlimit;
use crate::types::ResourceLimits;

/// The rlimits for one child process, in kernel units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlimitPolicy {
    /// Memory ceiling in bytes and the resource that carries it
    pub memory: Option<(MemoryRlimit, u64)>,
    /// CPU seconds; the hard limit is one second higher so SIGXCPU arrives first
    pub cpu_seconds: Option<u64>,
    pub open_files: Option<u64>,
    pub processes: Option<u64>,
    /// Largest file the child may write, in bytes
    pub file_size: Option<u64>,
}

impl RlimitPolicy {
    pub fn new(limits: &ResourceLimits, memory_rlimit: MemoryRlimit) -> Self {
        Self {
            memory: limits
                .memory_limit
                .map(|mb| (memory_rlimit, mb.saturating_mul(ResourceLimits::MB))),
            cpu_seconds: limits.cpu_time_limit,
            open_files: limits.max_open_files,
            processes: limits.max_processes,
            file_size: limits
                .max_output
                .map(|kb| kb.saturating_mul(ResourceLimits::KB)),
        }
    }

    /// Apply the limits to the calling process
    ///
    /// Limits can only be lowered, so this must only run in a disposable child.
    /// Every call is a plain syscall, which keeps it safe between fork and exec.
    pub fn apply(&self) -> io::Result<()> {
        set(Resource::CORE, 0, 0)?;

        if let Some((kind, bytes)) = self.memory {
            let resource = match kind {
                MemoryRlimit::AddressSpace => Resource::AS,
                MemoryRlimit::Data => Resource::DATA,
            };
            set(resource, bytes, bytes)?;
        }
        if let Some(seconds) = self.cpu_seconds {
            set(Resource::CPU, seconds, seconds.saturating_add(1))?;
        }
        if let Some(count) = self.open_files {
            set(Resource::NOFILE, count, count)?;
        }
        if let Some(count) = self.processes {
            set(Resource::NPROC, count, count)?;
        }
        if let Some(bytes) = self.file_size {
            set(Resource::FSIZE, bytes, bytes)?;
        }
        Ok(())
    }

    /// Register the limits as a pre-exec hook on `command`
    ///
    /// If any limit cannot be installed the hook fails, exec never happens and
    /// `spawn` returns the error.
    pub fn install(self, command: &mut tokio::process::Command) {
        // SAFETY: the hook only issues getrlimit/setrlimit syscalls and does
        // not allocate or take locks.
        unsafe {
            command.pre_exec(move || self.apply());
        }
    }
}

/// Lower a limit, never asking for more than the current hard limit
fn set(resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
    let (_, current_hard) = rlimit::getrlimit(resource)?;
    let hard = hard.min(current_hard);
    let soft = soft.min(hard);
    rlimit::setrlimit(resource, soft, hard)
}
