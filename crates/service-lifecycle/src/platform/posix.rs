//! Local processes
//!
//! Each service runs as a detached child whose pid and combined output live
//! under the state directory as `<resource>.pid` and `<resource>.log`.

use super::{
    CredentialStatus, LivenessProbe, LogCollector, LogOptions, PlatformStrategy,
    ServiceStateSnapshot, tcp_reachable,
};
use crate::process::{self, CommandLine, DetachedProcess, ManagedProcess};
use crate::registry::bind;
use crate::{
    CommandKind, Error, HandlerContext, HandlerInput, HandlerOutput, HandlerRegistryBuilder,
    HealthStatus, LogEntry, PlatformKind, PosixSettings, ResourceRef, Result, ResultDetails,
    ResultStatus, Service,
};
use async_process::Stdio;
use async_trait::async_trait;
use chrono::Utc;
use smol::Timer;
use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long a freshly spawned process must survive to count as started
const STARTUP_SETTLE: Duration = Duration::from_millis(250);
/// Timeout for local health probes
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default directory for pid and log files
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("stackctl")
}

/// Last `tail` lines of a log file's contents
pub fn tail_lines(contents: &str, tail: usize) -> Vec<LogEntry> {
    let lines: Vec<&str> = contents.lines().filter(|l| !l.is_empty()).collect();
    let skip = lines.len().saturating_sub(tail);
    lines[skip..]
        .iter()
        .map(|line| LogEntry {
            timestamp: None,
            source: "log".to_string(),
            message: line.to_string(),
        })
        .collect()
}

struct ProcessTable {
    prefix: String,
    state_dir: PathBuf,
}

impl ProcessTable {
    fn pid_file(&self, resource: &str) -> PathBuf {
        self.state_dir.join(format!("{}.pid", resource))
    }

    fn log_file(&self, resource: &str) -> PathBuf {
        self.state_dir.join(format!("{}.log", resource))
    }

    async fn read_pid(&self, resource: &str) -> Result<Option<u32>> {
        let path = self.pid_file(resource);
        match async_fs::read_to_string(&path).await {
            Ok(contents) => contents
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::handler(format!("corrupt pid file {}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The live process for a resource, clearing a stale pid file
    async fn live_process(&self, resource: &str) -> Result<Option<DetachedProcess>> {
        let Some(pid) = self.read_pid(resource).await? else {
            return Ok(None);
        };
        let process = DetachedProcess::from_pid(pid);
        if process.is_alive() {
            Ok(Some(process))
        } else {
            warn!("Removing stale pid file for {} (pid {})", resource, pid);
            self.clear(resource).await?;
            Ok(None)
        }
    }

    async fn clear(&self, resource: &str) -> Result<()> {
        match async_fs::remove_file(self.pid_file(resource)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn read_logs(&self, resource: &str, tail: usize) -> Option<Vec<LogEntry>> {
        match async_fs::read_to_string(self.log_file(resource)).await {
            Ok(contents) => Some(tail_lines(&contents, tail)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(Vec::new()),
            Err(_) => None,
        }
    }

    fn command(context: &HandlerContext, argv: &[String]) -> Result<CommandLine> {
        let settings = context.service.config.settings.posix()?;
        let mut cmd = CommandLine::from_argv(argv)?;
        cmd.envs(&context.requirements.environment);
        if let Some(network) = &context.requirements.network {
            cmd.env("PORT", network.primary_port().to_string());
        }
        if let Some(dir) = &settings.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    async fn spawn(&self, context: &HandlerContext, settings: &PosixSettings) -> Result<HandlerOutput> {
        if settings.command.is_empty() {
            return Ok(HandlerOutput::failed(format!(
                "no command configured for '{}'",
                context.name()
            )));
        }
        let resource = context.resource_name();
        async_fs::create_dir_all(&self.state_dir).await?;

        let log_path = self.log_file(resource);
        let log = async_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;
        let stdout = File::from(log.as_fd().try_clone_to_owned()?);
        let stderr = stdout.try_clone()?;
        let cmd = Self::command(context, &settings.command)?;
        let mut child = ManagedProcess::spawn(&cmd, Stdio::from(stdout), Stdio::from(stderr))?;

        Timer::after(STARTUP_SETTLE).await;
        if let Some(code) = child.try_exited()? {
            let reason = match code {
                Some(code) => format!("exited immediately with code {}", code),
                None => "killed immediately by a signal".to_string(),
            };
            return Ok(HandlerOutput::failed(format!(
                "'{}' {}; see {}",
                context.name(),
                reason,
                log_path.display()
            )));
        }

        let process = child.detach();
        async_fs::write(self.pid_file(resource), process.pid().to_string()).await?;
        info!("Started '{}' as PID {}", context.name(), process.pid());

        Ok(HandlerOutput::ok()
            .resources(self.resources(context, Some(process.pid())))
            .details(ResultDetails::Start {
                started_at: Utc::now(),
                endpoint: endpoint(context),
            }))
    }

    async fn terminate(&self, resource: &str, grace: Duration) -> Result<Option<bool>> {
        let Some(process) = self.live_process(resource).await? else {
            return Ok(None);
        };
        let termination = process.terminate(grace).await?;
        self.clear(resource).await?;
        Ok(Some(termination.graceful))
    }

    fn resources(&self, context: &HandlerContext, pid: Option<u32>) -> ResourceRef {
        ResourceRef {
            resource_name: Some(context.resource_name().to_string()),
            id: pid.map(|pid| pid.to_string()),
            endpoint: endpoint(context),
        }
    }
}

fn endpoint(context: &HandlerContext) -> Option<String> {
    context
        .requirements
        .network
        .as_ref()
        .map(|network| format!("localhost:{}", network.primary_port()))
}

async fn probe_health(context: &HandlerContext, running: bool) -> HealthStatus {
    if !running {
        return HealthStatus::Unhealthy("process is not running".to_string());
    }
    match &context.requirements.network {
        Some(network) => {
            let address = format!("127.0.0.1:{}", network.health_check_port);
            if tcp_reachable(&address, HEALTH_PROBE_TIMEOUT).await {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy(format!("nothing listening on {}", address))
            }
        }
        None => HealthStatus::Unknown,
    }
}

/// Strategy for local processes
pub struct PosixStrategy {
    table: Arc<ProcessTable>,
}

impl PosixStrategy {
    /// Keep pid and log files under `state_dir`
    pub fn new(prefix: impl Into<String>, state_dir: impl AsRef<Path>) -> Self {
        Self {
            table: Arc::new(ProcessTable {
                prefix: prefix.into(),
                state_dir: state_dir.as_ref().to_path_buf(),
            }),
        }
    }

    /// Directory holding pid and log files
    pub fn state_dir(&self) -> &Path {
        &self.table.state_dir
    }
}

#[async_trait]
impl PlatformStrategy for PosixStrategy {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Posix
    }

    fn resource_prefix(&self) -> &str {
        &self.table.prefix
    }

    async fn validate_credentials(&self, _environment: &str) -> CredentialStatus {
        let probe = self.table.state_dir.join(".stackctl-probe");
        let writable = async {
            async_fs::create_dir_all(&self.table.state_dir).await?;
            async_fs::write(&probe, b"ok").await?;
            async_fs::remove_file(&probe).await
        };
        match writable.await {
            Ok(()) => CredentialStatus::valid(),
            Err(e) => CredentialStatus::invalid(
                format!("state directory {} is not writable: {}", self.table.state_dir.display(), e),
                "pass --state-dir with a writable directory",
            ),
        }
    }

    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder) {
        let platform = PlatformKind::Posix;
        builder
            .register_wildcard(CommandKind::Start, platform, bind(&self.table, start))
            .register_wildcard(CommandKind::Stop, platform, bind(&self.table, stop))
            .register_wildcard(CommandKind::Restart, platform, bind(&self.table, restart))
            .register_wildcard(CommandKind::Update, platform, bind(&self.table, update))
            .register_wildcard(CommandKind::Provision, platform, bind(&self.table, provision))
            .register_wildcard(CommandKind::Publish, platform, bind(&self.table, publish))
            .register_wildcard(CommandKind::Check, platform, bind(&self.table, check))
            .register_wildcard(CommandKind::Exec, platform, bind(&self.table, exec))
            .register_wildcard(CommandKind::Test, platform, bind(&self.table, test))
            .register_wildcard(CommandKind::Watch, platform, bind(&self.table, watch));
    }

    fn as_log_collector(&self) -> Option<&dyn LogCollector> {
        Some(self)
    }

    fn as_liveness_probe(&self) -> Option<&dyn LivenessProbe> {
        Some(self)
    }
}

#[async_trait]
impl LogCollector for PosixStrategy {
    async fn collect_logs(&self, service: &Service, options: &LogOptions) -> Option<Vec<LogEntry>> {
        self.table
            .read_logs(&self.resource_name(service), options.tail)
            .await
    }
}

#[async_trait]
impl LivenessProbe for PosixStrategy {
    async fn quick_check_running(&self, state: &ServiceStateSnapshot) -> bool {
        let pid = match &state.id {
            Some(id) => id.parse().ok(),
            None => self.table.read_pid(&state.resource_name).await.ok().flatten(),
        };
        pid.is_some_and(|pid| DetachedProcess::from_pid(pid).is_alive())
    }
}

async fn start(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let resource = context.resource_name();
    if let Some(process) = table.live_process(resource).await? {
        return Ok(HandlerOutput::with_status(ResultStatus::AlreadyRunning)
            .resources(table.resources(&context, Some(process.pid()))));
    }
    let settings = context.service.config.settings.posix()?;
    table.spawn(&context, &settings).await
}

async fn stop(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let grace = match context.input {
        HandlerInput::Stop { grace_period } => grace_period,
        _ => context.options.grace_period(),
    };
    match table.terminate(context.resource_name(), grace).await? {
        Some(graceful) => {
            let output = HandlerOutput::ok().details(ResultDetails::Stop {
                stopped_at: Utc::now(),
                graceful,
            });
            Ok(if graceful {
                output
            } else {
                output.warning(format!("'{}' was killed after {:?}", context.name(), grace))
            })
        }
        None => Ok(HandlerOutput::with_status(ResultStatus::AlreadyStopped)),
    }
}

async fn restart(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let grace = match context.input {
        HandlerInput::Restart { grace_period } => grace_period,
        _ => context.options.grace_period(),
    };
    let settings = context.service.config.settings.posix()?;
    let stopped = table.terminate(context.resource_name(), grace).await?;
    let stopped_at = stopped.map(|_| Utc::now());

    let output = table.spawn(&context, &settings).await?;
    Ok(if output.success {
        output.details(ResultDetails::Restart {
            stopped_at,
            started_at: Some(Utc::now()),
        })
    } else {
        output
    })
}

async fn update(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.posix()?;
    let resource = context.resource_name();
    let previous = table.live_process(resource).await?;
    let Some(previous) = previous else {
        return Ok(HandlerOutput::with_status(ResultStatus::NoChange)
            .warning(format!("'{}' is not running; nothing to update", context.name())));
    };

    previous.terminate(context.options.grace_period()).await?;
    table.clear(resource).await?;
    let output = table.spawn(&context, &settings).await?;
    if !output.success {
        return Ok(output);
    }
    let new_pid = output.resources.as_ref().and_then(|r| r.id.clone());
    let mut updated = output.details(ResultDetails::Update {
        previous_version: Some(previous.pid().to_string()),
        new_version: new_pid,
        strategy: "restart".to_string(),
    });
    updated.status = Some(ResultStatus::Updated);
    Ok(updated)
}

async fn run_configured(
    context: &HandlerContext,
    argv: &[String],
    what: &str,
) -> Result<std::result::Result<process::ProcessOutput, HandlerOutput>> {
    if argv.is_empty() {
        return Ok(Err(HandlerOutput::failed(format!(
            "no {} command configured for '{}'",
            what,
            context.name()
        ))));
    }
    let cmd = ProcessTable::command(context, argv)?;
    let output = process::run(&cmd, context.timeout()).await?;
    if output.success() {
        Ok(Ok(output))
    } else {
        Ok(Err(HandlerOutput::failed(output.failure_reason())))
    }
}

async fn provision(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.posix()?;
    let mut created = Vec::new();
    if !table.state_dir.exists() {
        async_fs::create_dir_all(&table.state_dir).await?;
        created.push(table.state_dir.display().to_string());
    }
    if !settings.provision_command.is_empty() {
        if let Err(failed) = run_configured(&context, &settings.provision_command, "provision").await? {
            return Ok(failed);
        }
        created.push(settings.provision_command.join(" "));
    }
    let status = if created.is_empty() {
        ResultStatus::NoChange
    } else {
        ResultStatus::Provisioned
    };
    Ok(HandlerOutput::with_status(status).details(ResultDetails::Provision { created }))
}

async fn publish(_table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.posix()?;
    let tag = match &context.input {
        HandlerInput::Publish { tag } => tag.clone(),
        _ => None,
    };
    match run_configured(&context, &settings.build_command, "build").await? {
        Ok(_) => Ok(HandlerOutput::ok().details(ResultDetails::Publish {
            artifact: settings.working_dir.clone(),
            tag,
        })),
        Err(failed) => Ok(failed),
    }
}

async fn check(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let (include_logs, tail) = match context.input {
        HandlerInput::Check { include_logs, tail } => (include_logs, tail),
        _ => (false, 0),
    };
    let resource = context.resource_name();
    let process = table.live_process(resource).await?;
    let running = process.is_some();
    let health = probe_health(&context, running).await;
    let logs = if include_logs {
        table.read_logs(resource, tail).await
    } else {
        None
    };

    let status = match (&health, running) {
        (_, false) => ResultStatus::NotRunning,
        (HealthStatus::Unhealthy(_), true) => ResultStatus::Unhealthy,
        _ => ResultStatus::Running,
    };
    let mut output = HandlerOutput::with_status(status)
        .resources(table.resources(&context, process.map(|p| p.pid())))
        .details(ResultDetails::Check {
            running,
            health: health.clone(),
            logs,
        });
    if let HealthStatus::Unhealthy(reason) = health {
        output = output.warning(reason);
    }
    Ok(output)
}

async fn exec(_table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let command = match &context.input {
        HandlerInput::Exec { command } if !command.is_empty() => command.clone(),
        _ => return Ok(HandlerOutput::failed("no command given to exec")),
    };
    let cmd = ProcessTable::command(&context, &command)?;
    let output = process::run(&cmd, context.timeout()).await?;
    let result = if output.success() {
        HandlerOutput::ok()
    } else {
        HandlerOutput::failed(output.failure_reason())
    };
    Ok(result.details(ResultDetails::Exec {
        exit_code: output.code,
        stdout: output.stdout,
        stderr: output.stderr,
    }))
}

async fn test(_table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.posix()?;
    let suite = match &context.input {
        HandlerInput::Test { suite } => suite.clone(),
        _ => None,
    };
    if settings.test_command.is_empty() {
        return Ok(HandlerOutput::failed(format!(
            "no test command configured for '{}'",
            context.name()
        )));
    }
    let mut cmd = ProcessTable::command(&context, &settings.test_command)?;
    if let Some(suite) = &suite {
        cmd.env("TEST_SUITE", suite.clone());
    }
    let output = process::run(&cmd, context.timeout()).await?;
    let details = ResultDetails::Test {
        suite,
        exit_code: output.code,
    };
    Ok(if output.success() {
        HandlerOutput::ok().details(details)
    } else {
        HandlerOutput::failed(output.failure_reason()).details(details)
    })
}

async fn watch(table: Arc<ProcessTable>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let tail = match context.input {
        HandlerInput::Watch { tail } => tail,
        _ => crate::DEFAULT_LOG_TAIL,
    };
    let resource = context.resource_name();
    let running = table.live_process(resource).await?.is_some();
    let health = probe_health(&context, running).await;
    let recent_logs = table.read_logs(resource, tail).await.unwrap_or_default();
    Ok(HandlerOutput::ok().details(ResultDetails::Watch {
        running,
        health,
        recent_logs,
    }))
}
