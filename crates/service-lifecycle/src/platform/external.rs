//! Services managed by someone else
//!
//! Lifecycle verbs are successful no-ops with status `external`. Only
//! observation is real: TCP reachability plus an optional HTTP health probe.

use super::{CredentialStatus, LivenessProbe, PlatformStrategy, ServiceStateSnapshot, tcp_reachable};
use crate::process::{self, CommandLine};
use crate::registry::bind;
use crate::{
    CommandKind, ContextExtensions, HandlerContext, HandlerInput, HandlerOutput,
    HandlerRegistryBuilder, HealthStatus, PlatformKind, ResourceRef, Result, ResultDetails,
    ResultStatus, Service,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Split an endpoint (`https://host:port/path` or `host:port`) into host and port
pub fn host_port(endpoint: &str) -> Option<(String, u16)> {
    let (default_port, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        (Some(443), rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        (Some(80), rest)
    } else {
        (None, endpoint)
    };
    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), port.parse().ok()?)),
        None => default_port.map(|port| (authority.to_string(), port)),
    }
}

struct Endpoints {
    prefix: String,
}

/// Where an external service can be reached
fn resolve_endpoint(service: &Service) -> Result<Option<String>> {
    let settings = service.config.settings.external()?;
    if let Some(endpoint) = settings.endpoint {
        return Ok(Some(endpoint));
    }
    let port = settings
        .port
        .or_else(|| service.requirements().network.map(|n| n.primary_port()));
    Ok(match (settings.host, port) {
        (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
        _ => None,
    })
}

async fn http_health(endpoint: &str, path: &str, timeout: Option<Duration>) -> HealthStatus {
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return HealthStatus::Unknown;
    }
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    let mut cmd = CommandLine::new("curl");
    cmd.args(["-fsS", "-o", "/dev/null", "--max-time"])
        .arg(PROBE_TIMEOUT.as_secs().to_string())
        .arg(&url);
    match process::run(&cmd, timeout).await {
        Ok(output) if output.success() => HealthStatus::Healthy,
        Ok(output) => HealthStatus::Unhealthy(output.failure_reason()),
        Err(e) => {
            debug!("Health probe for {} could not run: {}", url, e);
            HealthStatus::Unknown
        }
    }
}

/// Strategy for externally managed services
pub struct ExternalStrategy {
    endpoints: Arc<Endpoints>,
}

impl ExternalStrategy {
    /// Create the strategy
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            endpoints: Arc::new(Endpoints {
                prefix: prefix.into(),
            }),
        }
    }
}

#[async_trait]
impl PlatformStrategy for ExternalStrategy {
    fn platform(&self) -> PlatformKind {
        PlatformKind::External
    }

    fn resource_prefix(&self) -> &str {
        &self.endpoints.prefix
    }

    async fn build_context_extensions(
        &self,
        service: &Service,
        requires_discovery: bool,
    ) -> ContextExtensions {
        let mut extensions = ContextExtensions::named(self.resource_name(service));
        if requires_discovery {
            match resolve_endpoint(service) {
                Ok(Some(endpoint)) => extensions.endpoint = Some(endpoint),
                Ok(None) => {
                    extensions.discovery_error =
                        Some("no endpoint, or host and port, configured".to_string())
                }
                Err(e) => extensions.discovery_error = Some(e.to_string()),
            }
        }
        extensions
    }

    async fn validate_credentials(&self, _environment: &str) -> CredentialStatus {
        CredentialStatus::valid()
    }

    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder) {
        let platform = PlatformKind::External;
        for command in [
            CommandKind::Start,
            CommandKind::Stop,
            CommandKind::Restart,
            CommandKind::Update,
        ] {
            builder.register_wildcard(command, platform, bind(&self.endpoints, unmanaged));
        }
        builder
            .register_wildcard(CommandKind::Check, platform, bind(&self.endpoints, check))
            .register_wildcard(CommandKind::Watch, platform, bind(&self.endpoints, watch));
    }

    fn as_liveness_probe(&self) -> Option<&dyn LivenessProbe> {
        Some(self)
    }
}

#[async_trait]
impl LivenessProbe for ExternalStrategy {
    async fn quick_check_running(&self, state: &ServiceStateSnapshot) -> bool {
        match state.endpoint.as_deref().and_then(host_port) {
            Some((host, port)) => tcp_reachable(&format!("{}:{}", host, port), PROBE_TIMEOUT).await,
            None => false,
        }
    }
}

async fn unmanaged(_endpoints: Arc<Endpoints>, context: HandlerContext) -> Result<HandlerOutput> {
    Ok(HandlerOutput::with_status(ResultStatus::External).warning(format!(
        "'{}' is managed externally; {} has nothing to do",
        context.name(),
        context.command
    )))
}

async fn observe(context: &HandlerContext) -> (bool, HealthStatus, Option<String>) {
    let Some(endpoint) = context.extensions.endpoint.clone() else {
        return (false, HealthStatus::Unknown, None);
    };
    let reachable = match host_port(&endpoint) {
        Some((host, port)) => tcp_reachable(&format!("{}:{}", host, port), PROBE_TIMEOUT).await,
        None => false,
    };
    let health = if !reachable {
        HealthStatus::Unhealthy(format!("{} is not reachable", endpoint))
    } else {
        let path = context
            .requirements
            .network
            .as_ref()
            .map(|n| n.health_check_path.clone())
            .unwrap_or_else(|| crate::requirements::DEFAULT_HEALTH_PATH.to_string());
        http_health(&endpoint, &path, context.timeout()).await
    };
    (reachable, health, Some(endpoint))
}

async fn check(_endpoints: Arc<Endpoints>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let (reachable, health, endpoint) = observe(&context).await;
    let status = match (&health, reachable) {
        (_, false) => ResultStatus::NotRunning,
        (HealthStatus::Unhealthy(_), true) => ResultStatus::Unhealthy,
        _ => ResultStatus::Running,
    };
    let mut output = HandlerOutput::with_status(status)
        .resources(ResourceRef {
            resource_name: Some(context.resource_name().to_string()),
            id: None,
            endpoint,
        })
        .details(ResultDetails::Check {
            running: reachable,
            health: health.clone(),
            logs: None,
        });
    if let HealthStatus::Unhealthy(reason) = health {
        output = output.warning(reason);
    }
    if matches!(context.input, HandlerInput::Check { include_logs: true, .. }) {
        output = output.warning("logs are not available for external services");
    }
    Ok(output)
}

async fn watch(_endpoints: Arc<Endpoints>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let (running, health, _) = observe(&context).await;
    Ok(HandlerOutput::ok().details(ResultDetails::Watch {
        running,
        health,
        recent_logs: Vec::new(),
    }))
}
