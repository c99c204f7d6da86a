//! Owned process handles
//!
//! A spawned child is owned by a [`ManagedProcess`]; the caller decides its
//! lifetime explicitly: wait for it, terminate it, or [`ManagedProcess::detach`]
//! it into a [`DetachedProcess`] that only remembers the pid.

use crate::{Error, Result};
use async_process::{Child, Command as AsyncCommand, Stdio};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use smol::Timer;
use smol::future::FutureExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a detached process is polled while waiting for it to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A reusable command line
///
/// Unlike `async_process::Command` this is `Clone` and printable, so it can be
/// logged and embedded in error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
}

impl CommandLine {
    /// Create a command for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Build a command from an argv vector
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::config("empty command"))?;
        let mut line = CommandLine::new(program.clone());
        line.args(args);
        Ok(line)
    }

    /// Add an argument
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<'a>(&mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> &mut Self {
        for (key, value) in vars {
            self.env(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory
    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Shell-like rendering for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert into an `async_process::Command`
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Captured result of a command run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best human-readable failure reason
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else {
            match self.code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`]
    pub fn into_result(self, line: &CommandLine) -> Result<ProcessOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::command_failed(line.display(), self.failure_reason()))
        }
    }
}

/// Run a command to completion, capturing its output
///
/// The child is killed if `timeout` elapses first.
pub async fn run(line: &CommandLine, timeout: Option<Duration>) -> Result<ProcessOutput> {
    debug!("Running: {}", line.display());
    let mut cmd = line.prepare();
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let output = async {
        cmd.output().await.map(Some).map_err(|e| Error::SpawnFailed {
            command: line.program().to_string(),
            reason: e.to_string(),
        })
    };
    let output = match timeout {
        Some(limit) => {
            output
                .or(async {
                    Timer::after(limit).await;
                    Ok(None)
                })
                .await?
        }
        None => output.await?,
    };
    let output = output.ok_or(Error::Timeout(timeout.unwrap_or_default()))?;

    Ok(ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// How a process ended after [`ManagedProcess::terminate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Exit code if it exited normally
    pub code: Option<i32>,
    /// Whether it exited within the grace period
    pub graceful: bool,
}

/// A spawned child owned by the caller
pub struct ManagedProcess {
    child: Child,
    name: String,
}

impl ManagedProcess {
    /// Spawn a command with the given stdout and stderr
    pub fn spawn(line: &CommandLine, stdout: Stdio, stderr: Stdio) -> Result<Self> {
        let mut cmd = line.prepare();
        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        let child = cmd.spawn().map_err(|e| Error::SpawnFailed {
            command: line.display(),
            reason: e.to_string(),
        })?;
        info!("Spawned '{}' with PID {}", line.program(), child.id());
        Ok(Self {
            child,
            name: line.program().to_string(),
        })
    }

    /// Process id
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait for exit and return the exit code
    pub async fn wait(mut self) -> Result<Option<i32>> {
        let status = self.child.status().await?;
        Ok(status.code())
    }

    /// Whether the child has already exited
    pub fn try_exited(&mut self) -> Result<Option<Option<i32>>> {
        Ok(self.child.try_status()?.map(|status| status.code()))
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL
    pub async fn terminate(mut self, grace: Duration) -> Result<Termination> {
        send_signal(self.pid(), Signal::SIGTERM)?;
        let status = async { self.child.status().await.map(Some) }
            .or(async {
                Timer::after(grace).await;
                Ok(None)
            })
            .await?;

        match status {
            Some(status) => Ok(Termination {
                code: status.code(),
                graceful: true,
            }),
            None => {
                warn!("'{}' ignored SIGTERM for {:?}, killing", self.name, grace);
                self.child.kill()?;
                let status = self.child.status().await?;
                Ok(Termination {
                    code: status.code(),
                    graceful: false,
                })
            }
        }
    }

    /// Give up ownership; the process keeps running
    pub fn detach(self) -> DetachedProcess {
        DetachedProcess { pid: self.pid() }
    }
}

/// A process known only by pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedProcess {
    pid: u32,
}

impl DetachedProcess {
    /// Refer to an existing pid
    pub fn from_pid(pid: u32) -> Self {
        Self { pid }
    }

    /// Process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process still exists
    pub fn is_alive(&self) -> bool {
        match i32::try_from(self.pid) {
            Ok(raw) if raw > 0 => match signal::kill(Pid::from_raw(raw), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            },
            _ => false,
        }
    }

    /// SIGTERM, poll for up to `grace`, then SIGKILL
    pub async fn terminate(&self, grace: Duration) -> Result<Termination> {
        if !self.is_alive() {
            return Ok(Termination {
                code: None,
                graceful: true,
            });
        }
        send_signal(self.pid, Signal::SIGTERM)?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return Ok(Termination {
                    code: None,
                    graceful: true,
                });
            }
            Timer::after(EXIT_POLL_INTERVAL).await;
        }

        warn!("PID {} ignored SIGTERM for {:?}, killing", self.pid, grace);
        match send_signal(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Error::Nix(Errno::ESRCH)) => Ok(Termination {
                code: None,
                graceful: false,
            }),
            Err(e) => Err(e),
        }
    }
}

fn send_signal(pid: u32, sig: Signal) -> Result<()> {
    let raw = i32::try_from(pid).map_err(|_| Error::handler(format!("invalid pid {}", pid)))?;
    signal::kill(Pid::from_raw(raw), sig)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_display() {
        let mut line = CommandLine::new("docker");
        line.args(["ps", "-a"]).env("DOCKER_HOST", "unix:///tmp/d.sock");
        assert_eq!(line.display(), "docker ps -a");
        assert_eq!(line.program(), "docker");
    }

    #[test]
    fn test_from_argv_rejects_empty() {
        assert!(CommandLine::from_argv(&[]).is_err());
        let line = CommandLine::from_argv(&["echo".to_string(), "hi".to_string()]).unwrap();
        assert_eq!(line.get_args(), ["hi"]);
    }

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let output = ProcessOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "no such container\n".to_string(),
        };
        assert_eq!(output.failure_reason(), "no such container");

        let output = ProcessOutput {
            code: Some(3),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(output.failure_reason(), "exited with code 3");
    }

    #[smol_potat::test]
    async fn test_run_captures_output() {
        let mut line = CommandLine::new("sh");
        line.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run(&line, None).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(output.into_result(&line).is_err());
    }

    #[smol_potat::test]
    async fn test_run_times_out() {
        let mut line = CommandLine::new("sleep");
        line.arg("5");
        let err = run(&line, Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[smol_potat::test]
    async fn test_run_reports_missing_program() {
        let line = CommandLine::new("definitely-not-a-real-binary-4821");
        let err = run(&line, None).await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }

    #[smol_potat::test]
    async fn test_managed_process_terminate() {
        let mut line = CommandLine::new("sleep");
        line.arg("30");
        let process = ManagedProcess::spawn(&line, Stdio::null(), Stdio::null()).unwrap();
        let termination = process.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(termination.graceful);
    }

    #[smol_potat::test]
    async fn test_detached_process_lifecycle() {
        let mut line = CommandLine::new("sleep");
        line.arg("30");
        let process = ManagedProcess::spawn(&line, Stdio::null(), Stdio::null()).unwrap();
        let detached = process.detach();
        assert!(detached.is_alive());

        let termination = detached.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(termination.graceful);
    }

    #[test]
    fn test_unknown_pid_is_not_alive() {
        assert!(!DetachedProcess::from_pid(0).is_alive());
        assert!(!DetachedProcess::from_pid(u32::MAX).is_alive());
    }
}
