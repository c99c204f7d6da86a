//! In-memory test double
//!
//! Keeps running state per resource name and records every handler call and
//! credential check, so tests can assert on what the executor actually did.
//! Per-service [`MockSettings`](crate::MockSettings) inject declared
//! failures, faults and panics for chosen verbs.

use super::{
    CredentialStatus, LivenessProbe, LogCollector, LogOptions, PlatformStrategy,
    ServiceStateSnapshot,
};
use crate::registry::bind;
use crate::{
    CommandKind, ContextExtensions, Error, HandlerContext, HandlerInput, HandlerOutput,
    HandlerRegistryBuilder, HealthStatus, LogEntry, PlatformKind, ResourceRef, Result,
    ResultDetails, ResultStatus, Service,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::lock::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One recorded handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Verb
    pub command: CommandKind,
    /// Service name
    pub service: String,
    /// Environment
    pub environment: String,
}

#[derive(Default)]
struct MockInner {
    running: HashMap<String, bool>,
    calls: Vec<MockCall>,
    credential_checks: Vec<String>,
}

struct MockState {
    prefix: String,
    credentials: CredentialStatus,
    inner: Mutex<MockInner>,
}

impl MockState {
    async fn record(&self, context: &HandlerContext) {
        self.inner.lock().await.calls.push(MockCall {
            command: context.command,
            service: context.name().to_string(),
            environment: context.environment().to_string(),
        });
    }

    async fn running(&self, resource: &str, initial: bool) -> bool {
        let inner = self.inner.lock().await;
        inner.running.get(resource).copied().unwrap_or(initial)
    }

    async fn set_running(&self, resource: &str, running: bool) {
        let mut inner = self.inner.lock().await;
        inner.running.insert(resource.to_string(), running);
    }
}

/// In-memory platform
///
/// Cloning shares state, so a test can keep a handle after moving the
/// strategy into a [`PlatformSet`](super::PlatformSet).
#[derive(Clone)]
pub struct MockStrategy {
    state: Arc<MockState>,
}

impl MockStrategy {
    /// A mock platform whose credentials are always valid
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_credentials(prefix, CredentialStatus::valid())
    }

    /// A mock platform whose credential check always fails
    pub fn rejecting(
        prefix: impl Into<String>,
        error: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::with_credentials(prefix, CredentialStatus::invalid(error, remediation))
    }

    fn with_credentials(prefix: impl Into<String>, credentials: CredentialStatus) -> Self {
        Self {
            state: Arc::new(MockState {
                prefix: prefix.into(),
                credentials,
                inner: Mutex::new(MockInner::default()),
            }),
        }
    }

    /// Handler calls so far, in order
    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.inner.lock().await.calls.clone()
    }

    /// Environments credentials were validated for, in order
    pub async fn credential_checks(&self) -> Vec<String> {
        self.state.inner.lock().await.credential_checks.clone()
    }

    /// Mark a resource as running or stopped
    pub async fn set_running(&self, resource_name: &str, running: bool) {
        self.state.set_running(resource_name, running).await;
    }
}

#[async_trait]
impl PlatformStrategy for MockStrategy {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Mock
    }

    fn resource_prefix(&self) -> &str {
        &self.state.prefix
    }

    async fn build_context_extensions(
        &self,
        service: &Service,
        requires_discovery: bool,
    ) -> ContextExtensions {
        let mut extensions = ContextExtensions::named(self.resource_name(service));
        if requires_discovery {
            extensions.endpoint = Some(format!("mock://{}", extensions.resource_name));
        }
        extensions
    }

    async fn validate_credentials(&self, environment: &str) -> CredentialStatus {
        self.state
            .inner
            .lock()
            .await
            .credential_checks
            .push(environment.to_string());
        self.state.credentials.clone()
    }

    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder) {
        for command in CommandKind::ALL {
            builder.register_wildcard(command, PlatformKind::Mock, bind(&self.state, handle));
        }
    }

    fn as_log_collector(&self) -> Option<&dyn LogCollector> {
        Some(self)
    }

    fn as_liveness_probe(&self) -> Option<&dyn LivenessProbe> {
        Some(self)
    }
}

#[async_trait]
impl LogCollector for MockStrategy {
    async fn collect_logs(&self, service: &Service, options: &LogOptions) -> Option<Vec<LogEntry>> {
        let settings = service.config.settings.mock().ok()?;
        Some(tail_entries(&settings.logs, options.tail))
    }
}

#[async_trait]
impl LivenessProbe for MockStrategy {
    async fn quick_check_running(&self, state: &ServiceStateSnapshot) -> bool {
        self.state.running(&state.resource_name, false).await
    }
}

fn tail_entries(lines: &[String], tail: usize) -> Vec<LogEntry> {
    let skip = lines.len().saturating_sub(tail);
    lines[skip..]
        .iter()
        .map(|line| LogEntry {
            timestamp: None,
            source: "mock".to_string(),
            message: line.clone(),
        })
        .collect()
}

async fn handle(state: Arc<MockState>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.mock()?;
    state.record(&context).await;
    debug!("mock {} for '{}'", context.command, context.name());

    if settings.panic_on.contains(&context.command) {
        panic!("mock {} panicked for '{}'", context.command, context.name());
    }
    if settings.fault_on.contains(&context.command) {
        return Err(Error::handler(format!(
            "injected fault in {} for '{}'",
            context.command,
            context.name()
        )));
    }
    if settings.fail_on.contains(&context.command) {
        return Ok(HandlerOutput::failed(format!(
            "injected failure in {} for '{}'",
            context.command,
            context.name()
        )));
    }

    let resource = context.resource_name().to_string();
    let running = state.running(&resource, settings.running).await;
    let endpoint = context.extensions.endpoint.clone();
    let now = Utc::now();
    let health = if running {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unknown
    };

    let output = match &context.input {
        HandlerInput::Start if running => HandlerOutput::with_status(ResultStatus::AlreadyRunning),
        HandlerInput::Start => {
            state.set_running(&resource, true).await;
            HandlerOutput::ok().details(ResultDetails::Start {
                started_at: now,
                endpoint: endpoint.clone(),
            })
        }
        HandlerInput::Stop { .. } if !running => {
            HandlerOutput::with_status(ResultStatus::AlreadyStopped)
        }
        HandlerInput::Stop { .. } => {
            state.set_running(&resource, false).await;
            HandlerOutput::ok().details(ResultDetails::Stop {
                stopped_at: now,
                graceful: true,
            })
        }
        HandlerInput::Restart { .. } => {
            state.set_running(&resource, true).await;
            HandlerOutput::ok().details(ResultDetails::Restart {
                stopped_at: running.then_some(now),
                started_at: Some(now),
            })
        }
        HandlerInput::Update => HandlerOutput::ok(),
        HandlerInput::Provision => HandlerOutput::ok().details(ResultDetails::Provision {
            created: vec![resource.clone()],
        }),
        HandlerInput::Publish { tag } => HandlerOutput::ok().details(ResultDetails::Publish {
            artifact: Some(format!("{}:{}", resource, tag.as_deref().unwrap_or("latest"))),
            tag: tag.clone(),
        }),
        HandlerInput::Check { include_logs, tail } => {
            let status = if running {
                ResultStatus::Running
            } else {
                ResultStatus::NotRunning
            };
            let output = HandlerOutput::with_status(status).details(ResultDetails::Check {
                running,
                health,
                logs: include_logs.then(|| tail_entries(&settings.logs, *tail)),
            });
            if running {
                output
            } else {
                output.warning(format!("'{}' is not running", context.name()))
            }
        }
        HandlerInput::Exec { command } if command.is_empty() => {
            HandlerOutput::failed("no command given to exec")
        }
        HandlerInput::Exec { .. } if !running => {
            HandlerOutput::failed(format!("'{}' is not running", context.name()))
        }
        HandlerInput::Exec { command } => HandlerOutput::ok().details(ResultDetails::Exec {
            exit_code: Some(0),
            stdout: command.join(" "),
            stderr: String::new(),
        }),
        HandlerInput::Test { suite } => HandlerOutput::ok().details(ResultDetails::Test {
            suite: suite.clone(),
            exit_code: Some(0),
        }),
        HandlerInput::Watch { tail } => HandlerOutput::ok().details(ResultDetails::Watch {
            running,
            health,
            recent_logs: tail_entries(&settings.logs, *tail),
        }),
    };

    Ok(output.resources(ResourceRef {
        resource_name: Some(resource.clone()),
        id: Some(format!("mock-{}", resource)),
        endpoint,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandOptions, MockSettings, PlatformSettings, ServiceConfig};

    fn service(settings: MockSettings) -> Service {
        let config = ServiceConfig {
            settings: PlatformSettings::Mock(settings),
            ..Default::default()
        };
        Service::new("api", "staging", config)
    }

    fn context(strategy: &MockStrategy, service: Service, input: HandlerInput) -> HandlerContext {
        let command = match &input {
            HandlerInput::Start => CommandKind::Start,
            HandlerInput::Stop { .. } => CommandKind::Stop,
            HandlerInput::Check { .. } => CommandKind::Check,
            _ => CommandKind::Exec,
        };
        HandlerContext {
            command,
            requirements: service.requirements(),
            service_type: service.service_type(),
            extensions: ContextExtensions::named(strategy.resource_name(&service)),
            service,
            platform: PlatformKind::Mock,
            options: CommandOptions::new("staging"),
            input,
        }
    }

    #[smol_potat::test]
    async fn test_start_then_start_again_is_a_noop() {
        let strategy = MockStrategy::new("acme");
        let svc = service(MockSettings::default());

        let first = handle(strategy.state.clone(), context(&strategy, svc.clone(), HandlerInput::Start))
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.status, None);

        let second = handle(strategy.state.clone(), context(&strategy, svc.clone(), HandlerInput::Start))
            .await
            .unwrap();
        assert_eq!(second.status, Some(ResultStatus::AlreadyRunning));

        let snapshot = ServiceStateSnapshot::of(&strategy, &svc);
        assert!(strategy.quick_check_running(&snapshot).await);
        assert_eq!(strategy.calls().await.len(), 2);
    }

    #[smol_potat::test]
    async fn test_injected_failure_and_fault() {
        let strategy = MockStrategy::new("acme");
        let failing = service(MockSettings {
            fail_on: vec![CommandKind::Start],
            fault_on: vec![CommandKind::Stop],
            ..Default::default()
        });

        let output = handle(strategy.state.clone(), context(&strategy, failing.clone(), HandlerInput::Start))
            .await
            .unwrap();
        assert!(!output.success);

        let stop = HandlerInput::Stop {
            grace_period: crate::DEFAULT_GRACE_PERIOD,
        };
        let err = handle(strategy.state.clone(), context(&strategy, failing, stop))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
    }

    #[smol_potat::test]
    async fn test_check_not_running_warns() {
        let strategy = MockStrategy::new("acme");
        let svc = service(MockSettings {
            logs: vec!["one".into(), "two".into(), "three".into()],
            ..Default::default()
        });
        let input = HandlerInput::Check {
            include_logs: true,
            tail: 2,
        };
        let output = handle(strategy.state.clone(), context(&strategy, svc, input))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.status, Some(ResultStatus::NotRunning));
        assert_eq!(output.warnings.len(), 1);
        match output.details {
            Some(ResultDetails::Check { logs: Some(logs), .. }) => {
                assert_eq!(logs.len(), 2);
                assert_eq!(logs[1].message, "three");
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[smol_potat::test]
    async fn test_rejecting_credentials_are_recorded() {
        let strategy = MockStrategy::rejecting("acme", "token expired", "run `login`");
        let status = strategy.validate_credentials("staging").await;
        assert!(!status.valid);
        assert_eq!(status.remediation.as_deref(), Some("run `login`"));
        assert_eq!(strategy.credential_checks().await, vec!["staging".to_string()]);
    }
}
