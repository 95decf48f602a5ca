//! Spawning and reaping sandboxed child processes

use std::collections::HashMap;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::{DEFAULT_SANDBOX_PATH, MemoryRlimit};
use crate::sandbox::rlimit::RlimitPolicy;
use crate::sandbox::{SandboxError, resolve_command};
use crate::types::{ExecutionStatus, LimitExceeded, ProcessOutput, ResourceLimits};

/// How long to keep draining pipes after the process group is gone
const READ_GRACE: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 8192;

/// Builder for one sandboxed process
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    /// PATH inside the child, also used to resolve the program
    path: String,
    limits: ResourceLimits,
    memory_rlimit: MemoryRlimit,
}

impl SandboxCommand {
    /// Create a new command from an argv list
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: HashMap::new(),
            path: DEFAULT_SANDBOX_PATH.to_owned(),
            limits: ResourceLimits::unset(),
            memory_rlimit: MemoryRlimit::default(),
        }
    }

    /// Set the working directory of the child
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the PATH of the child
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Choose the rlimit that carries the memory ceiling
    pub fn memory_rlimit(mut self, memory_rlimit: MemoryRlimit) -> Self {
        self.memory_rlimit = memory_rlimit;
        self
    }

    /// Program name, for logging
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}

/// Output of one pipe, cut at the cap
#[derive(Debug, Default)]
struct Captured {
    data: Vec<u8>,
    truncated: bool,
}

/// Run a command to completion inside the sandbox
///
/// The child gets a cleared environment, its own process group and the
/// rlimits from the command. If the wall clock budget runs out the whole group
/// is killed and the result has [`ExecutionStatus::TimeLimitExceeded`]. The
/// group is also killed once the leader exits, before it is reaped, and when
/// the returned future is dropped early, so background children cannot linger.
///
/// Errors are returned only when the process could not be started at all.
#[instrument(skip_all, fields(program = command.program()))]
pub async fn run(
    command: SandboxCommand,
    stdin: Option<&[u8]>,
) -> Result<ProcessOutput, SandboxError> {
    let SandboxCommand {
        command: mut argv,
        working_dir,
        env,
        path,
        limits,
        memory_rlimit,
    } = command;

    resolve_command(&mut argv, &path)?;

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .env_clear()
        .env("PATH", &path)
        .envs(&env)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);
    if let Some(ref dir) = working_dir {
        cmd.current_dir(dir);
    }
    RlimitPolicy::new(&limits, memory_rlimit).install(&mut cmd);

    debug!(?argv, ?working_dir, "spawning sandboxed process");

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(SandboxError::SpawnFailed)?;
    let pid = child.id();
    let mut group = GroupGuard::new(pid);

    let cap = limits.max_output_bytes().unwrap_or(usize::MAX);
    let stdout_task = tokio::spawn(read_capped(child.stdout.take(), cap));
    let stderr_task = tokio::spawn(read_capped(child.stderr.take(), cap));

    let stdin_task = match (stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => {
            let data = data.to_vec();
            Some(tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is expected then
                let _ = pipe.write_all(&data).await;
            }))
        }
        _ => None,
    };

    let timed_out = {
        let exited = wait_exit(pid, &mut child);
        match limits.timeout() {
            Some(budget) => match tokio::time::timeout(budget, exited).await {
                Ok(result) => {
                    result?;
                    false
                }
                Err(_) => true,
            },
            None => {
                exited.await?;
                false
            }
        }
    };
    if timed_out {
        debug!(?pid, "wall clock budget exceeded, killing process group");
    }

    // The leader is still unreaped here, so its pid cannot name another group
    group.kill();
    let status = child.wait().await?;
    let status = (!timed_out).then_some(status);
    let wall_time = start.elapsed().as_secs_f64();

    if let Some(task) = stdin_task {
        task.abort();
    }

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    let mut output = ProcessOutput {
        wall_time,
        stdout: stdout.data,
        stderr: stderr.data,
        ..Default::default()
    };

    match status {
        None => {
            output.status = ExecutionStatus::TimeLimitExceeded;
            output.limit_exceeded = LimitExceeded::WallTime;
        }
        Some(status) => {
            output.exit_code = status.code();
            output.signal = status.signal();
            output.limit_exceeded = LimitExceeded::from_signal(output.signal);
            output.status = if output.signal.is_some() {
                ExecutionStatus::Signaled
            } else if status.success() {
                ExecutionStatus::Ok
            } else {
                ExecutionStatus::RuntimeError
            };
        }
    }
    if (stdout.truncated || stderr.truncated) && !output.limit_exceeded.is_exceeded() {
        output.limit_exceeded = LimitExceeded::Output;
    }

    debug!(
        status = ?output.status,
        limit = ?output.limit_exceeded,
        exit_code = ?output.exit_code,
        signal = ?output.signal,
        wall_time,
        "process finished"
    );

    Ok(output)
}

/// SIGKILLs a child's process group, at the latest when dropped
struct GroupGuard {
    pgid: Option<libc::pid_t>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg takes no pointers. ESRCH just means the group is gone.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Wait for the child to exit without reaping it
///
/// Falls back to a reaping wait when the exit cannot be watched.
async fn wait_exit(pid: Option<u32>, child: &mut Child) -> io::Result<()> {
    if let Some(pid) = pid {
        match tokio::task::spawn_blocking(move || wait_exited(pid)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => debug!(error = %e, "waitid failed, reaping directly"),
            Err(e) => warn!(error = %e, "exit watcher task failed"),
        }
    }
    child.wait().await.map(drop)
}

/// Block until `pid` has exited, leaving the zombie in place
fn wait_exited(pid: u32) -> io::Result<()> {
    loop {
        // SAFETY: siginfo_t is plain old data, all zeroes is a valid value
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` outlives the call. WNOWAIT leaves the child waitable.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                libc::id_t::from(pid),
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Drain a pipe to EOF, keeping at most `cap` bytes
async fn read_capped<R>(reader: Option<R>, cap: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "pipe read failed");
                break;
            }
        };
        let room = cap.saturating_sub(captured.data.len());
        if n > room {
            captured.truncated = true;
        }
        captured.data.extend_from_slice(&chunk[..n.min(room)]);
    }
    captured
}

/// Wait for a reader task, giving up after [`READ_GRACE`]
async fn collect(task: JoinHandle<Captured>) -> Captured {
    let abort = task.abort_handle();
    match tokio::time::timeout(READ_GRACE, task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            Captured::default()
        }
        Err(_) => {
            // A descendant escaped the process group and still holds the pipe
            warn!("output pipe still open after process exit");
            abort.abort();
            Captured::default()
        }
    }
}
