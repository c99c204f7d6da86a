//! Local containers through the docker or podman CLI
//!
//! Containers are named after the resource name and labelled with the
//! service and environment, so an existing container is adopted instead of
//! started twice.

use super::{
    CredentialStatus, LivenessProbe, LogCollector, LogOptions, PlatformStrategy,
    ServiceStateSnapshot,
};
use crate::process::{self, CommandLine, ProcessOutput};
use crate::registry::bind;
use crate::{
    CommandKind, ContainerSettings, ContextExtensions, HandlerContext, HandlerInput,
    HandlerOutput, HandlerRegistryBuilder, HealthStatus, LogEntry, PlatformKind, ResourceRef,
    Result, ResultDetails, ResultStatus, Service, ServiceType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime used when neither the strategy nor the service names one
pub const DEFAULT_RUNTIME: &str = "docker";

const INSPECT_FORMAT: &str =
    "{{.Id}}|{{.State.Status}}|{{if .State.Health}}{{.State.Health.Status}}{{end}}|{{.Image}}";
const SERVICE_LABEL: &str = "stackctl.service";
const ENVIRONMENT_LABEL: &str = "stackctl.environment";

/// State of an existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full container id
    pub id: String,
    /// Runtime state, e.g. `running` or `exited`
    pub state: String,
    /// Health-check state when the image defines one
    pub health: Option<String>,
    /// Image id
    pub image: String,
}

impl ContainerInfo {
    /// Whether the container is running
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Health as reported by the runtime
    pub fn health_status(&self) -> HealthStatus {
        match self.health.as_deref() {
            Some("healthy") => HealthStatus::Healthy,
            Some("unhealthy") => HealthStatus::Unhealthy("container health check failing".into()),
            _ if !self.is_running() => HealthStatus::Unhealthy(format!("container is {}", self.state)),
            _ => HealthStatus::Unknown,
        }
    }

    fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Parse one line of `inspect --format INSPECT_FORMAT`
pub fn parse_inspect(output: &str) -> Option<ContainerInfo> {
    let line = output.lines().next()?.trim();
    let mut parts = line.split('|');
    let id = parts.next().filter(|id| !id.is_empty())?;
    let state = parts.next()?;
    let health = parts.next().filter(|h| !h.is_empty());
    let image = parts.next().unwrap_or_default();
    Some(ContainerInfo {
        id: id.to_string(),
        state: state.to_string(),
        health: health.map(str::to_string),
        image: image.to_string(),
    })
}

/// Parse `logs --timestamps` output into entries
pub fn parse_log_lines(output: &str, source: &str) -> Vec<LogEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let parsed = line.split_once(' ').and_then(|(ts, message)| {
                DateTime::parse_from_rfc3339(ts)
                    .ok()
                    .map(|ts| (ts.with_timezone(&Utc), message))
            });
            match parsed {
                Some((timestamp, message)) => LogEntry {
                    timestamp: Some(timestamp),
                    source: source.to_string(),
                    message: message.to_string(),
                },
                None => LogEntry {
                    timestamp: None,
                    source: source.to_string(),
                    message: line.to_string(),
                },
            }
        })
        .collect()
}

struct ContainerRuntime {
    prefix: String,
    runtime: String,
}

impl ContainerRuntime {
    fn binary(&self, settings: &ContainerSettings) -> String {
        settings
            .runtime
            .clone()
            .unwrap_or_else(|| self.runtime.clone())
    }

    fn command(&self, settings: &ContainerSettings) -> CommandLine {
        CommandLine::new(self.binary(settings))
    }

    async fn inspect(
        &self,
        settings: &ContainerSettings,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<ContainerInfo>> {
        let mut cmd = self.command(settings);
        cmd.args(["inspect", "--type", "container", "--format", INSPECT_FORMAT, name]);
        let output = process::run(&cmd, timeout).await?;
        if !output.success() {
            // "No such container" is the common case
            debug!("inspect {} failed: {}", name, output.failure_reason());
            return Ok(None);
        }
        Ok(parse_inspect(&output.stdout))
    }

    async fn logs(
        &self,
        settings: &ContainerSettings,
        name: &str,
        tail: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<LogEntry>> {
        let mut cmd = self.command(settings);
        cmd.args(["logs", "--tail", &tail.to_string(), "--timestamps", name]);
        let output = process::run(&cmd, timeout).await?.into_result(&cmd)?;
        let mut entries = parse_log_lines(&output.stdout, "stdout");
        entries.extend(parse_log_lines(&output.stderr, "stderr"));
        entries.sort_by_key(|entry| entry.timestamp);
        let skip = entries.len().saturating_sub(tail);
        Ok(entries.split_off(skip))
    }

    fn run_command(&self, context: &HandlerContext, settings: &ContainerSettings, image: &str) -> CommandLine {
        let requirements = &context.requirements;
        let mut cmd = self.command(settings);
        cmd.args(["run", "-d", "--name", context.resource_name()]);
        cmd.arg("--label")
            .arg(format!("{}={}", SERVICE_LABEL, context.name()));
        cmd.arg("--label")
            .arg(format!("{}={}", ENVIRONMENT_LABEL, context.environment()));
        for (key, value) in &requirements.labels {
            cmd.arg("--label").arg(format!("{}={}", key, value));
        }
        if let Some(network) = &settings.network {
            cmd.args(["--network", network]);
        }

        let restart_policy = settings.restart_policy.clone().or_else(|| {
            (context.service_type == ServiceType::Database).then(|| "unless-stopped".to_string())
        });
        if let Some(policy) = restart_policy {
            cmd.args(["--restart", &policy]);
        }

        if let Some(network) = &requirements.network {
            for port in &network.ports {
                cmd.arg("-p").arg(format!("{}:{}", port, port));
            }
        }
        for (key, value) in &requirements.environment {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        if let Some(storage) = &requirements.storage {
            if let (Some(volume), Some(mount)) = (&storage.volume_name, &storage.mount_path) {
                cmd.arg("-v").arg(format!("{}:{}", volume, mount));
            }
        }
        if let Some(resources) = &requirements.resources {
            if let Some(cpu) = &resources.cpu {
                cmd.args(["--cpus", cpu]);
            }
            if let Some(memory) = &resources.memory {
                cmd.args(["--memory", memory.trim_end_matches('i')]);
            }
        }
        if let Some(security) = &requirements.security {
            if let Some(uid) = security.run_as_user {
                let user = match security.run_as_group {
                    Some(gid) => format!("{}:{}", uid, gid),
                    None => uid.to_string(),
                };
                cmd.args(["--user", &user]);
            }
            for capability in &security.capabilities {
                cmd.args(["--cap-add", capability]);
            }
        }

        cmd.arg(image);
        cmd.args(settings.command.iter().cloned());
        cmd
    }

    fn endpoint(context: &HandlerContext) -> Option<String> {
        context
            .requirements
            .network
            .as_ref()
            .map(|network| format!("localhost:{}", network.primary_port()))
    }

    fn resources(context: &HandlerContext, id: Option<&str>) -> ResourceRef {
        ResourceRef {
            resource_name: Some(context.resource_name().to_string()),
            id: id.map(str::to_string),
            endpoint: Self::endpoint(context),
        }
    }
}

/// Strategy for docker/podman containers
pub struct ContainerStrategy {
    runtime: Arc<ContainerRuntime>,
}

impl ContainerStrategy {
    /// Use the default runtime
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_runtime(prefix, DEFAULT_RUNTIME)
    }

    /// Use a specific runtime binary
    pub fn with_runtime(prefix: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            runtime: Arc::new(ContainerRuntime {
                prefix: prefix.into(),
                runtime: runtime.into(),
            }),
        }
    }
}

#[async_trait]
impl PlatformStrategy for ContainerStrategy {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Container
    }

    fn resource_prefix(&self) -> &str {
        &self.runtime.prefix
    }

    async fn build_context_extensions(
        &self,
        service: &Service,
        requires_discovery: bool,
    ) -> ContextExtensions {
        let mut extensions = ContextExtensions::named(self.resource_name(service));
        if !requires_discovery {
            return extensions;
        }

        let settings = match service.config.settings.container() {
            Ok(settings) => settings,
            Err(e) => {
                extensions.discovery_error = Some(e.to_string());
                return extensions;
            }
        };
        match self
            .runtime
            .inspect(&settings, &extensions.resource_name, None)
            .await
        {
            Ok(Some(info)) => {
                extensions
                    .extra
                    .insert("containerId".to_string(), Value::String(info.id.clone()));
                extensions.endpoint = service
                    .requirements()
                    .network
                    .map(|network| format!("localhost:{}", network.primary_port()));
            }
            Ok(None) => {}
            Err(e) => extensions.discovery_error = Some(e.to_string()),
        }
        extensions
    }

    async fn validate_credentials(&self, _environment: &str) -> CredentialStatus {
        let mut cmd = CommandLine::new(self.runtime.runtime.clone());
        cmd.args(["info", "--format", "{{.ServerVersion}}"]);
        match process::run(&cmd, Some(Duration::from_secs(15))).await {
            Ok(output) if output.success() => CredentialStatus::valid(),
            Ok(output) => CredentialStatus::invalid(
                format!("{} daemon is not reachable: {}", self.runtime.runtime, output.failure_reason()),
                format!("start the {} daemon or check its socket permissions", self.runtime.runtime),
            ),
            Err(e) => CredentialStatus::invalid(
                e.to_string(),
                format!("install {} or set `runtime` in the service settings", self.runtime.runtime),
            ),
        }
    }

    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder) {
        let platform = PlatformKind::Container;
        builder
            .register_wildcard(CommandKind::Start, platform, bind(&self.runtime, start))
            .register(
                CommandKind::Start,
                platform,
                ServiceType::Database,
                bind(&self.runtime, start_database),
            )
            .register_wildcard(CommandKind::Stop, platform, bind(&self.runtime, stop))
            .register_wildcard(CommandKind::Restart, platform, bind(&self.runtime, restart))
            .register_wildcard(CommandKind::Update, platform, bind(&self.runtime, update))
            .register_wildcard(CommandKind::Provision, platform, bind(&self.runtime, provision))
            .register_wildcard(CommandKind::Publish, platform, bind(&self.runtime, publish))
            .register_wildcard(CommandKind::Check, platform, bind(&self.runtime, check))
            .register_wildcard(CommandKind::Exec, platform, bind(&self.runtime, exec))
            .register_wildcard(CommandKind::Test, platform, bind(&self.runtime, test))
            .register_wildcard(CommandKind::Watch, platform, bind(&self.runtime, watch));
    }

    fn as_log_collector(&self) -> Option<&dyn LogCollector> {
        Some(self)
    }

    fn as_liveness_probe(&self) -> Option<&dyn LivenessProbe> {
        Some(self)
    }
}

#[async_trait]
impl LogCollector for ContainerStrategy {
    async fn collect_logs(&self, service: &Service, options: &LogOptions) -> Option<Vec<LogEntry>> {
        let settings = service.config.settings.container().ok()?;
        let name = self.resource_name(service);
        match self.runtime.logs(&settings, &name, options.tail, None).await {
            Ok(entries) => Some(
                entries
                    .into_iter()
                    .filter(|e| match (options.since, e.timestamp) {
                        (Some(since), Some(ts)) => ts >= since,
                        _ => true,
                    })
                    .collect(),
            ),
            Err(e) => {
                debug!("No logs for {}: {}", name, e);
                None
            }
        }
    }
}

#[async_trait]
impl LivenessProbe for ContainerStrategy {
    async fn quick_check_running(&self, state: &ServiceStateSnapshot) -> bool {
        let settings = ContainerSettings::default();
        matches!(
            self.runtime.inspect(&settings, &state.resource_name, None).await,
            Ok(Some(info)) if info.is_running()
        )
    }
}

fn image_of(context: &HandlerContext, settings: &ContainerSettings) -> std::result::Result<String, HandlerOutput> {
    settings
        .image
        .clone()
        .ok_or_else(|| HandlerOutput::failed(format!("no image configured for '{}'", context.name())))
}

/// `image` with its tag replaced by `tag`
///
/// A `:` before the last `/` belongs to a registry port, not a tag.
fn retag(image: &str, tag: &str) -> String {
    let repository = match image.rsplit_once(':') {
        Some((repository, current)) if !current.contains('/') => repository,
        _ => image,
    };
    format!("{}:{}", repository, tag)
}

async fn start(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    start_container(&runtime, &context).await
}

async fn start_database(
    runtime: Arc<ContainerRuntime>,
    context: HandlerContext,
) -> Result<HandlerOutput> {
    let output = start_container(&runtime, &context).await?;
    let persistent = context
        .requirements
        .storage
        .as_ref()
        .is_some_and(|storage| storage.persistent && storage.mount_path.is_some());
    Ok(if output.success && !persistent {
        output.warning(format!(
            "database '{}' has no persistent volume; data is lost when the container is removed",
            context.name()
        ))
    } else {
        output
    })
}

async fn start_container(runtime: &ContainerRuntime, context: &HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let image = match image_of(context, &settings) {
        Ok(image) => image,
        Err(failed) => return Ok(failed),
    };
    let name = context.resource_name();
    let timeout = context.timeout();

    let id = match runtime.inspect(&settings, name, timeout).await? {
        Some(info) if info.is_running() => {
            info!("Container '{}' is already running", name);
            return Ok(HandlerOutput::with_status(ResultStatus::AlreadyRunning)
                .resources(ContainerRuntime::resources(context, Some(info.short_id()))));
        }
        Some(info) => {
            info!("Starting existing container '{}' ({})", name, info.state);
            let mut cmd = runtime.command(&settings);
            cmd.args(["start", name]);
            let output = process::run(&cmd, timeout).await?;
            if !output.success() {
                return Ok(HandlerOutput::failed(output.failure_reason()));
            }
            info.id
        }
        None => {
            info!("Creating container '{}' from {}", name, image);
            let cmd = runtime.run_command(context, &settings, &image);
            let output = process::run(&cmd, timeout).await?;
            if !output.success() {
                return Ok(HandlerOutput::failed(output.failure_reason()));
            }
            output.stdout.trim().to_string()
        }
    };

    let short = &id[..id.len().min(12)];
    Ok(HandlerOutput::ok()
        .resources(ContainerRuntime::resources(context, Some(short)))
        .details(ResultDetails::Start {
            started_at: Utc::now(),
            endpoint: ContainerRuntime::endpoint(context),
        }))
}

async fn stop(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let grace = match context.input {
        HandlerInput::Stop { grace_period } => grace_period,
        _ => context.options.grace_period(),
    };
    let name = context.resource_name();

    match runtime.inspect(&settings, name, context.timeout()).await? {
        Some(info) if info.is_running() => {
            let mut cmd = runtime.command(&settings);
            cmd.args(["stop", "--time", &grace.as_secs().to_string(), name]);
            let output = process::run(&cmd, context.timeout()).await?;
            if !output.success() {
                return Ok(HandlerOutput::failed(output.failure_reason()));
            }
            Ok(HandlerOutput::ok()
                .resources(ContainerRuntime::resources(&context, Some(info.short_id())))
                .details(ResultDetails::Stop {
                    stopped_at: Utc::now(),
                    graceful: true,
                }))
        }
        _ => Ok(HandlerOutput::with_status(ResultStatus::AlreadyStopped)),
    }
}

async fn restart(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let name = context.resource_name();
    let Some(info) = runtime.inspect(&settings, name, context.timeout()).await? else {
        // Nothing to restart; bring it up fresh
        let output = start_container(&runtime, &context).await?;
        return Ok(if output.success {
            output.details(ResultDetails::Restart {
                stopped_at: None,
                started_at: Some(Utc::now()),
            })
        } else {
            output
        });
    };

    let grace = context.options.grace_period();
    let mut cmd = runtime.command(&settings);
    cmd.args(["restart", "--time", &grace.as_secs().to_string(), name]);
    let output = process::run(&cmd, context.timeout()).await?;
    if !output.success() {
        return Ok(HandlerOutput::failed(output.failure_reason()));
    }
    let now = Utc::now();
    Ok(HandlerOutput::ok()
        .resources(ContainerRuntime::resources(&context, Some(info.short_id())))
        .details(ResultDetails::Restart {
            stopped_at: info.is_running().then_some(now),
            started_at: Some(now),
        }))
}

async fn update(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let image = match image_of(&context, &settings) {
        Ok(image) => image,
        Err(failed) => return Ok(failed),
    };
    let name = context.resource_name();
    let timeout = context.timeout();

    let mut pull = runtime.command(&settings);
    pull.args(["pull", &image]);
    let pulled = process::run(&pull, timeout).await?;
    if !pulled.success() {
        return Ok(HandlerOutput::failed(pulled.failure_reason()));
    }

    let previous = runtime.inspect(&settings, name, timeout).await?;
    if let Some(info) = &previous {
        let mut rm = runtime.command(&settings);
        rm.args(["rm", "-f", name]);
        let removed = process::run(&rm, timeout).await?;
        if !removed.success() {
            return Ok(HandlerOutput::failed(removed.failure_reason()));
        }
        debug!("Removed container {} for update", info.short_id());
    }

    let output = start_container(&runtime, &context).await?;
    if !output.success {
        return Ok(output);
    }
    let current = runtime.inspect(&settings, name, timeout).await?;
    let previous_version = previous.map(|info| info.image);
    let new_version = current.map(|info| info.image);
    let status = if previous_version.is_some() && previous_version == new_version {
        ResultStatus::NoChange
    } else {
        ResultStatus::Updated
    };

    let mut updated = HandlerOutput::with_status(status).details(ResultDetails::Update {
        previous_version,
        new_version,
        strategy: "recreate".to_string(),
    });
    updated.resources = output.resources;
    Ok(updated)
}

async fn provision(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let timeout = context.timeout();
    let mut created = Vec::new();
    let mut warnings = Vec::new();

    if let Some(network) = &settings.network {
        let mut cmd = runtime.command(&settings);
        cmd.args(["network", "create", network]);
        let output = process::run(&cmd, timeout).await?;
        if output.success() {
            created.push(format!("network/{}", network));
        } else if !output.stderr.contains("already exists") {
            return Ok(HandlerOutput::failed(output.failure_reason()));
        }
    }

    if let Some(storage) = context.requirements.storage.as_ref().filter(|s| s.persistent) {
        if let Some(volume) = &storage.volume_name {
            let mut cmd = runtime.command(&settings);
            cmd.args(["volume", "create", volume]);
            let output = process::run(&cmd, timeout).await?;
            if output.success() {
                created.push(format!("volume/{}", volume));
            } else {
                warnings.push(output.failure_reason());
            }
        }
    }

    let status = if created.is_empty() {
        ResultStatus::NoChange
    } else {
        ResultStatus::Provisioned
    };
    let mut output = HandlerOutput::with_status(status).details(ResultDetails::Provision { created });
    output.warnings = warnings;
    Ok(output)
}

async fn publish(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    let image = match image_of(&context, &settings) {
        Ok(image) => image,
        Err(failed) => return Ok(failed),
    };
    let tag = match &context.input {
        HandlerInput::Publish { tag } => tag.clone(),
        _ => None,
    };
    let reference = match &tag {
        Some(tag) => retag(&image, tag),
        None => image.clone(),
    };
    let timeout = context.timeout();

    if let Some(build) = &context.requirements.build {
        let mut cmd = runtime.command(&settings);
        cmd.args(["build", "-t", &reference, "-f", &build.dockerfile]);
        for (key, value) in &build.args {
            cmd.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        cmd.arg(&build.context);
        info!("Building {}", reference);
        let output = process::run(&cmd, timeout).await?;
        if !output.success() {
            return Ok(HandlerOutput::failed(output.failure_reason()));
        }
    } else if reference != image {
        let mut cmd = runtime.command(&settings);
        cmd.args(["tag", &image, &reference]);
        let output = process::run(&cmd, timeout).await?;
        if !output.success() {
            return Ok(HandlerOutput::failed(output.failure_reason()));
        }
    }

    let mut push = runtime.command(&settings);
    push.args(["push", &reference]);
    let output = process::run(&push, timeout).await?;
    if !output.success() {
        return Ok(HandlerOutput::failed(output.failure_reason()));
    }

    Ok(HandlerOutput::ok().details(ResultDetails::Publish {
        artifact: Some(reference),
        tag,
    }))
}

async fn check(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let settings = context.service.config.settings.container()?;
    let (include_logs, tail) = match context.input {
        HandlerInput::Check { include_logs, tail } => (include_logs, tail),
        _ => (false, 0),
    };
    let name = context.resource_name();

    let Some(info) = runtime.inspect(&settings, name, context.timeout()).await? else {
        return Ok(HandlerOutput::with_status(ResultStatus::NotRunning)
            .details(ResultDetails::Check {
                running: false,
                health: HealthStatus::Unknown,
                logs: None,
            })
            .warning(format!("container '{}' does not exist", name)));
    };

    let health = info.health_status();
    let running = info.is_running();
    let logs = if include_logs {
        match runtime.logs(&settings, name, tail, context.timeout()).await {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("Failed to collect logs for {}: {}", name, e);
                None
            }
        }
    } else {
        None
    };

    let status = match (&health, running) {
        (_, false) => ResultStatus::NotRunning,
        (HealthStatus::Unhealthy(_), true) => ResultStatus::Unhealthy,
        _ => ResultStatus::Running,
    };
    let mut output = HandlerOutput::with_status(status)
        .resources(ContainerRuntime::resources(&context, Some(info.short_id())))
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

async fn exec(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let settings = context.service.config.settings.container()?;
    let command = match &context.input {
        HandlerInput::Exec { command } if !command.is_empty() => command.clone(),
        _ => return Ok(HandlerOutput::failed("no command given to exec")),
    };
    let name = context.resource_name();
    match runtime.inspect(&settings, name, context.timeout()).await? {
        Some(info) if info.is_running() => {}
        _ => return Ok(HandlerOutput::failed(format!("container '{}' is not running", name))),
    }

    let mut cmd = runtime.command(&settings);
    cmd.args(["exec", name]).args(command);
    let output = process::run(&cmd, context.timeout()).await?;
    Ok(exec_output(output))
}

fn exec_output(output: ProcessOutput) -> HandlerOutput {
    let result = if output.success() {
        HandlerOutput::ok()
    } else {
        HandlerOutput::failed(output.failure_reason())
    };
    result.details(ResultDetails::Exec {
        exit_code: output.code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

async fn test(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.container()?;
    if settings.test_command.is_empty() {
        return Ok(HandlerOutput::failed(format!(
            "no test command configured for '{}'",
            context.name()
        )));
    }
    let image = match image_of(&context, &settings) {
        Ok(image) => image,
        Err(failed) => return Ok(failed),
    };
    let suite = match &context.input {
        HandlerInput::Test { suite } => suite.clone(),
        _ => None,
    };

    let mut cmd = runtime.command(&settings);
    cmd.args(["run", "--rm"]);
    for (key, value) in &context.requirements.environment {
        cmd.arg("-e").arg(format!("{}={}", key, value));
    }
    if let Some(suite) = &suite {
        cmd.arg("-e").arg(format!("TEST_SUITE={}", suite));
    }
    cmd.arg(&image).args(settings.test_command.iter().cloned());

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

async fn watch(runtime: Arc<ContainerRuntime>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let settings = context.service.config.settings.container()?;
    let tail = match context.input {
        HandlerInput::Watch { tail } => tail,
        _ => crate::DEFAULT_LOG_TAIL,
    };
    let name = context.resource_name();
    let info = runtime.inspect(&settings, name, context.timeout()).await?;
    let running = info.as_ref().is_some_and(ContainerInfo::is_running);
    let health = info
        .as_ref()
        .map(ContainerInfo::health_status)
        .unwrap_or(HealthStatus::Unknown);
    let recent_logs = if info.is_some() {
        runtime
            .logs(&settings, name, tail, context.timeout())
            .await
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(HandlerOutput::ok().details(ResultDetails::Watch {
        running,
        health,
        recent_logs,
    }))
}
