//! Interpreter process management: resolution, spawn, bounded wait and kill.

use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStderr, ChildStdin, ChildStdout},
};
use tracing::{debug, warn};

use crate::{config::Config, errors::RunError};

pub mod python;

const CANDIDATES: &[&str] = &["python3", "python"];

/// How long to wait for the worker's stderr after its reply has been read.
const DIAGNOSTICS_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    program: PathBuf,
}

impl Interpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// First of `python3`, `python` found on `PATH`.
    pub fn detect() -> Result<Self, RunError> {
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
            .ok_or_else(|| RunError::InterpreterNotFound { tried: CANDIDATES.join(", ") })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, RunError> {
        match cfg.python() {
            Some(program) => Ok(Self::new(program)),
            None => Self::detect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Start a worker. On Unix it leads its own process group so that anything it
    /// forks can be killed along with it.
    pub fn spawn(&self) -> Result<WorkerHandle, RunError> {
        #[allow(unused_mut)]
        let mut cmd = python::worker_command(&self.program);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                use nix::unistd::{setpgid, Pid};
                setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(std::io::Error::from)
            });
        }

        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(RunError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(RunError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(RunError::MissingPipe("stderr"))?;
        debug!(pid = ?child.id(), program = %self.program.display(), "worker spawned");

        Ok(WorkerHandle {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

pub struct WorkerHandle {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

#[derive(Debug)]
pub enum WorkerExit {
    /// The worker exited on its own and its process group has been killed.
    /// `reply` is everything it wrote to the result channel, or `None` if the
    /// channel was not closed within the grace period.
    Completed {
        status: ExitStatus,
        reply: Option<String>,
    },
    /// The deadline elapsed and the worker was killed. Nothing was read.
    TimedOut,
}

impl WorkerHandle {
    /// Send `request`, then wait for the worker to exit, for at most `deadline`
    /// when one is given. Returns only once the worker has been reaped.
    pub async fn finish(
        self,
        request: Vec<u8>,
        deadline: Option<Duration>,
        grace: Duration,
    ) -> Result<WorkerExit, RunError> {
        let WorkerHandle {
            mut child,
            stdin,
            stdout,
            stderr,
        } = self;
        let pid = child.id();

        let mut channel = tokio::spawn(drain(stdout));
        let mut diagnostics = tokio::spawn(drain(stderr));

        let running = &mut child;
        let lifecycle = async move {
            let mut stdin = stdin;
            if let Err(e) = stdin.write_all(&request).await {
                debug!(?pid, error = %e, "worker closed stdin before reading the request");
            }
            drop(stdin);
            running.wait().await
        };

        let waited = match deadline {
            Some(limit) => tokio::time::timeout(limit, lifecycle).await.ok(),
            None => Some(lifecycle.await),
        };

        let status = match waited {
            Some(status) => status.map_err(RunError::Wait)?,
            None => {
                debug!(?pid, "worker overran its deadline");
                terminate(&mut child, pid).await;
                channel.abort();
                diagnostics.abort();
                return Ok(WorkerExit::TimedOut);
            }
        };
        debug!(?pid, %status, "worker exited");

        let reply = match tokio::time::timeout(grace, &mut channel).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!(?pid, error = %e, "result channel reader failed");
                None
            }
            Err(_) => {
                warn!(?pid, "result channel still open after worker exit");
                channel.abort();
                None
            }
        };

        // Anything the snippet started in the background goes with it.
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                kill_group(pid);
            }
        }

        match tokio::time::timeout(DIAGNOSTICS_WAIT, &mut diagnostics).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!(?pid, stderr = %text.trim_end(), "worker stderr");
            }
            Ok(_) => {}
            Err(_) => diagnostics.abort(),
        }

        Ok(WorkerExit::Completed { status, reply })
    }
}

/// Unconditional kill: SIGKILL to the whole group, then kill and reap the child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            kill_group(pid);
        }
    }
    if let Err(e) = child.kill().await {
        warn!(?pid, error = %e, "failed to kill worker");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "process group killed"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => debug!(pid, error = %e, "killpg failed"),
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "worker pipe read failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_keeps_explicit_program() {
        let cfg = Config::from_rc_text("REPL_PYTHON=/usr/local/bin/python3.12");
        let interp = Interpreter::from_config(&cfg).unwrap();
        assert_eq!(interp.program(), Path::new("/usr/local/bin/python3.12"));
    }

    #[test]
    fn test_spawn_missing_program_is_spawn_error() {
        let interp = Interpreter::new("/nonexistent/dir/python-does-not-exist");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = rt.block_on(async { interp.spawn().err() });
        assert!(matches!(err, Some(RunError::Spawn { .. })));
    }
}
