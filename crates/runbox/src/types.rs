use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock budget for one process in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// CPU time limit in seconds (RLIMIT_CPU)
    #[serde(default)]
    pub cpu_time_limit: Option<u64>,

    /// Memory limit in megabytes (RLIMIT_AS or RLIMIT_DATA)
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes for the sandbox user (RLIMIT_NPROC)
    #[serde(default)]
    pub max_processes: Option<u64>,

    /// Maximum open files (RLIMIT_NOFILE)
    #[serde(default)]
    pub max_open_files: Option<u64>,

    /// Maximum captured output per stream and maximum written file size, in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl ResourceLimits {
    /// 1 megabyte in bytes
    pub const MB: u64 = 1024 * 1024;
    /// 1 kilobyte in bytes
    pub const KB: u64 = 1024;

    /// Create resource limits with every field unset
    ///
    /// Unset fields never override anything in [`with_overrides`](Self::with_overrides).
    pub fn unset() -> Self {
        Self {
            timeout_ms: None,
            cpu_time_limit: None,
            memory_limit: None,
            max_processes: None,
            max_open_files: None,
            max_output: None,
        }
    }

    /// Set the wall clock budget in milliseconds
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Set the CPU time limit in seconds
    pub fn with_cpu_time_limit(mut self, seconds: u64) -> Self {
        self.cpu_time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in megabytes
    pub fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_limit = Some(mb);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u64) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the maximum number of open files
    pub fn with_max_open_files(mut self, count: u64) -> Self {
        self.max_open_files = Some(count);
        self
    }

    /// Set the maximum output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            cpu_time_limit: overrides.cpu_time_limit.or(self.cpu_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_open_files: overrides.max_open_files.or(self.max_open_files),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// Bound every field by the matching field of `max`
    ///
    /// An unset field in `self` means "unlimited", so it takes the ceiling
    /// when one exists. An unset field in `max` leaves the value alone.
    pub fn clamp_to(&self, max: &ResourceLimits) -> ResourceLimits {
        fn clamp(value: Option<u64>, ceiling: Option<u64>) -> Option<u64> {
            match (value, ceiling) {
                (Some(v), Some(c)) => Some(v.min(c)),
                (None, Some(c)) => Some(c),
                (v, None) => v,
            }
        }

        ResourceLimits {
            timeout_ms: clamp(self.timeout_ms, max.timeout_ms),
            cpu_time_limit: clamp(self.cpu_time_limit, max.cpu_time_limit),
            memory_limit: clamp(self.memory_limit, max.memory_limit),
            max_processes: clamp(self.max_processes, max.max_processes),
            max_open_files: clamp(self.max_open_files, max.max_open_files),
            max_output: clamp(self.max_output, max.max_output),
        }
    }

    /// Check that every set field of `self` is within `max`
    pub fn is_within(&self, max: &ResourceLimits) -> bool {
        [
            (self.timeout_ms, max.timeout_ms),
            (self.cpu_time_limit, max.cpu_time_limit),
            (self.memory_limit, max.memory_limit),
            (self.max_processes, max.max_processes),
            (self.max_open_files, max.max_open_files),
            (self.max_output, max.max_output),
        ]
        .iter()
        .all(|(value, ceiling)| match (value, ceiling) {
            (Some(v), Some(c)) => v <= c,
            _ => true,
        })
    }

    /// Wall clock budget as a duration, if set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Output cap in bytes, if set
    pub fn max_output_bytes(&self) -> Option<usize> {
        self.max_output
            .map(|kb| usize::try_from(kb.saturating_mul(Self::KB)).unwrap_or(usize::MAX))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_ms: Some(5000),
            cpu_time_limit: Some(10),
            memory_limit: Some(128),
            max_processes: None,
            max_open_files: Some(64),
            max_output: Some(16 * 1024), // 16 MB
        }
    }
}

/// Result of running one child process to completion
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// How the process ended
    pub status: ExecutionStatus,

    /// Which rlimit or cap the process ran into
    pub limit_exceeded: LimitExceeded,

    /// Wall clock time used in seconds
    pub wall_time: f64,

    /// Exit code if the program exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the program was killed by a signal
    pub signal: Option<i32>,

    /// Captured standard output, truncated at the output cap
    pub stdout: Vec<u8>,

    /// Captured standard error, truncated at the output cap
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Exited on its own with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Ok) && self.exit_code == Some(0)
    }

    /// Exit status as a single number, with signals reported as `-signo`
    pub fn exit_status(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => -signal,
            (None, None) => -1,
        }
    }

    /// Standard output decoded lossily as UTF-8
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Default for ProcessOutput {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Ok,
            limit_exceeded: LimitExceeded::NotExceeded,
            wall_time: 0.0,
            exit_code: None,
            signal: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Status of a finished child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Program exited normally with code 0
    Ok,

    /// Runtime error (non-zero exit code)
    RuntimeError,

    /// Wall clock budget exceeded, process group killed
    TimeLimitExceeded,

    /// Program was killed by a signal
    Signaled,
}

/// The limit behind an abnormal end, when one can be told
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitExceeded {
    /// No limit was exceeded
    #[default]
    NotExceeded,

    /// CPU time limit exceeded (SIGXCPU)
    Time,

    /// Wall clock budget exceeded
    WallTime,

    /// File size limit exceeded (SIGXFSZ)
    Output,
}

impl LimitExceeded {
    /// Infer which rlimit was hit from the terminating signal
    pub fn from_signal(signal: Option<i32>) -> Self {
        match signal {
            Some(libc::SIGXCPU) => LimitExceeded::Time,
            Some(libc::SIGXFSZ) => LimitExceeded::Output,
            _ => LimitExceeded::NotExceeded,
        }
    }

    /// Check if any limit was exceeded
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, LimitExceeded::NotExceeded)
    }
}
