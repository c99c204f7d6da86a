//! Platform strategies
//!
//! One strategy per execution substrate. A strategy names resources,
//! classifies services into handler types, validates credentials and builds
//! the platform-specific part of a handler context. It registers its handlers
//! exactly once, when it joins a [`PlatformSet`].
//!
//! Log collection and liveness probing are optional capabilities exposed
//! through [`PlatformStrategy::as_log_collector`] and
//! [`PlatformStrategy::as_liveness_probe`].

pub mod aws;
pub mod container;
pub mod external;
pub mod mock;
pub mod posix;

pub use aws::AwsStrategy;
pub use container::ContainerStrategy;
pub use external::ExternalStrategy;
pub use mock::{MockCall, MockStrategy};
pub use posix::PosixStrategy;

use crate::{
    ContextExtensions, Error, HandlerRegistry, HandlerRegistryBuilder, LogEntry, PlatformKind,
    Result, Service, ServiceType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smol::Timer;
use smol::future::FutureExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a credential check; never an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    /// Whether the platform can be used
    pub valid: bool,
    /// What went wrong
    pub error: Option<String>,
    /// How to fix it
    pub remediation: Option<String>,
}

impl CredentialStatus {
    /// Credentials are usable
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
            remediation: None,
        }
    }

    /// Credentials are not usable
    pub fn invalid(error: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            remediation: Some(remediation.into()),
        }
    }
}

/// Options for log collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Maximum number of lines, newest last
    pub tail: usize,
    /// Only entries after this instant
    pub since: Option<DateTime<Utc>>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail: crate::DEFAULT_LOG_TAIL,
            since: None,
        }
    }
}

/// What a liveness probe gets to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStateSnapshot {
    /// Service name
    pub name: String,
    /// Environment name
    pub environment: String,
    /// Deterministic resource name
    pub resource_name: String,
    /// Substrate id: container id, pid
    pub id: Option<String>,
    /// Reachable endpoint
    pub endpoint: Option<String>,
}

impl ServiceStateSnapshot {
    /// Snapshot of a service under a strategy's naming
    pub fn of(strategy: &dyn PlatformStrategy, service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            environment: service.environment.clone(),
            resource_name: strategy.resource_name(service),
            id: None,
            endpoint: None,
        }
    }
}

/// `<prefix>-<service>-<environment>`
pub fn resource_name(prefix: &str, service: &str, environment: &str) -> String {
    format!("{}-{}-{}", prefix, service, environment)
}

/// Execution-substrate strategy
#[async_trait]
pub trait PlatformStrategy: Send + Sync {
    /// Platform this strategy serves
    fn platform(&self) -> PlatformKind;

    /// Human-readable platform name
    fn platform_name(&self) -> &'static str {
        self.platform().as_str()
    }

    /// Prefix of every resource name
    fn resource_prefix(&self) -> &str;

    /// Deterministic name of the resource backing a service
    fn resource_name(&self, service: &Service) -> String {
        resource_name(self.resource_prefix(), &service.name, &service.environment)
    }

    /// Handler type used for dispatch
    fn determine_service_type(&self, service: &Service) -> ServiceType {
        service.service_type()
    }

    /// Platform-specific additions to the handler context
    ///
    /// Only performs live discovery when `requires_discovery` is set. A
    /// discovery failure is recorded in
    /// [`ContextExtensions::discovery_error`] rather than raised.
    async fn build_context_extensions(
        &self,
        service: &Service,
        _requires_discovery: bool,
    ) -> ContextExtensions {
        ContextExtensions::named(self.resource_name(service))
    }

    /// Check that the platform is usable for an environment
    async fn validate_credentials(&self, environment: &str) -> CredentialStatus;

    /// Add this platform's handlers to the registry
    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder);

    /// Log collection capability
    fn as_log_collector(&self) -> Option<&dyn LogCollector> {
        None
    }

    /// Liveness capability
    fn as_liveness_probe(&self) -> Option<&dyn LivenessProbe> {
        None
    }
}

/// Optional capability: fetch recent logs
#[async_trait]
pub trait LogCollector: Send + Sync {
    /// `None` when logs are unavailable, an empty vector when there are none
    async fn collect_logs(&self, service: &Service, options: &LogOptions) -> Option<Vec<LogEntry>>;
}

/// Optional capability: cheap running check
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether the service appears to be running
    async fn quick_check_running(&self, state: &ServiceStateSnapshot) -> bool;
}

/// Liveness through a strategy, `false` when it cannot tell
pub async fn quick_check_running(
    strategy: &dyn PlatformStrategy,
    state: &ServiceStateSnapshot,
) -> bool {
    match strategy.as_liveness_probe() {
        Some(probe) => probe.quick_check_running(state).await,
        None => false,
    }
}

/// Logs through a strategy, `None` when it cannot collect them
pub async fn collect_logs(
    strategy: &dyn PlatformStrategy,
    service: &Service,
    options: &LogOptions,
) -> Option<Vec<LogEntry>> {
    match strategy.as_log_collector() {
        Some(collector) => collector.collect_logs(service, options).await,
        None => None,
    }
}

/// Whether a TCP connection to `address` succeeds within `timeout`
pub async fn tcp_reachable(address: &str, timeout: Duration) -> bool {
    let connect = async { async_net::TcpStream::connect(address).await.is_ok() };
    connect
        .or(async {
            Timer::after(timeout).await;
            false
        })
        .await
}

/// The strategies available to one invocation plus their handler registry
pub struct PlatformSet {
    strategies: HashMap<PlatformKind, Arc<dyn PlatformStrategy>>,
    registry: HandlerRegistry,
}

impl PlatformSet {
    /// Start assembling a set
    pub fn builder() -> PlatformSetBuilder {
        PlatformSetBuilder::default()
    }

    /// Every built-in strategy
    ///
    /// Resources are prefixed with `project`; the posix strategy keeps its
    /// pid and log files under `state_dir`.
    pub fn with_defaults(project: &str, state_dir: PathBuf) -> Self {
        Self::builder()
            .with_strategy(AwsStrategy::new(project))
            .with_strategy(ContainerStrategy::new(project))
            .with_strategy(PosixStrategy::new(project, state_dir))
            .with_strategy(ExternalStrategy::new(project))
            .with_strategy(MockStrategy::new(project))
            .build()
    }

    /// Strategy for a platform
    pub fn strategy(&self, platform: PlatformKind) -> Result<Arc<dyn PlatformStrategy>> {
        self.strategies
            .get(&platform)
            .cloned()
            .ok_or(Error::PlatformUnavailable(platform))
    }

    /// Handler registry
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Registered platforms
    pub fn platforms(&self) -> Vec<PlatformKind> {
        let mut platforms: Vec<_> = self.strategies.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

/// Builder for [`PlatformSet`]
#[derive(Default)]
pub struct PlatformSetBuilder {
    strategies: HashMap<PlatformKind, Arc<dyn PlatformStrategy>>,
    registry: HandlerRegistryBuilder,
}

impl PlatformSetBuilder {
    /// Add a strategy and register its handlers
    pub fn with_strategy(self, strategy: impl PlatformStrategy + 'static) -> Self {
        self.with_shared_strategy(Arc::new(strategy))
    }

    /// Add an already shared strategy and register its handlers
    pub fn with_shared_strategy(mut self, strategy: Arc<dyn PlatformStrategy>) -> Self {
        let platform = strategy.platform();
        debug!("Registering handlers for platform '{}'", platform);
        strategy.register_handlers(&mut self.registry);
        if self.strategies.insert(platform, strategy).is_some() {
            warn!("Replacing strategy for platform '{}'", platform);
        }
        self
    }

    /// Freeze the set
    pub fn build(self) -> PlatformSet {
        PlatformSet {
            strategies: self.strategies,
            registry: self.registry.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandKind, ServiceConfig};

    struct Bare;

    #[async_trait]
    impl PlatformStrategy for Bare {
        fn platform(&self) -> PlatformKind {
            PlatformKind::External
        }

        fn resource_prefix(&self) -> &str {
            "bare"
        }

        async fn validate_credentials(&self, _environment: &str) -> CredentialStatus {
            CredentialStatus::valid()
        }

        fn register_handlers(&self, _builder: &mut HandlerRegistryBuilder) {}
    }

    #[test]
    fn test_resource_name_is_stable_and_input_sensitive() {
        let strategy = Bare;
        let api = Service::new("api", "staging", ServiceConfig::default());
        assert_eq!(strategy.resource_name(&api), "bare-api-staging");
        assert_eq!(strategy.resource_name(&api), strategy.resource_name(&api));

        let other_env = Service::new("api", "prod", ServiceConfig::default());
        let other_name = Service::new("web", "staging", ServiceConfig::default());
        assert_ne!(strategy.resource_name(&api), strategy.resource_name(&other_env));
        assert_ne!(strategy.resource_name(&api), strategy.resource_name(&other_name));
    }

    #[smol_potat::test]
    async fn test_missing_capabilities_default_to_unknown() {
        let strategy = Bare;
        let service = Service::new("api", "staging", ServiceConfig::default());
        let snapshot = ServiceStateSnapshot::of(&strategy, &service);

        assert!(!quick_check_running(&strategy, &snapshot).await);
        assert!(collect_logs(&strategy, &service, &LogOptions::default()).await.is_none());
    }

    #[test]
    fn test_platform_set_registers_handlers_once() {
        let set = PlatformSet::builder().with_strategy(MockStrategy::new("acme")).build();
        assert!(set.strategy(PlatformKind::Mock).is_ok());
        assert!(matches!(
            set.strategy(PlatformKind::Aws).err(),
            Some(Error::PlatformUnavailable(PlatformKind::Aws))
        ));
        assert!(set.registry().supports(
            CommandKind::Start,
            PlatformKind::Mock,
            ServiceType::Backend
        ));
    }

    #[smol_potat::test]
    async fn test_tcp_reachable() {
        let listener = async_net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        assert!(tcp_reachable(&address, Duration::from_secs(2)).await);

        drop(listener);
        assert!(!tcp_reachable(&address, Duration::from_secs(2)).await);
    }

    #[test]
    fn test_defaults_cover_every_platform() {
        let dir = tempfile::tempdir().unwrap();
        let set = PlatformSet::with_defaults("acme", dir.path().to_path_buf());
        assert_eq!(set.platforms(), PlatformKind::ALL.to_vec());
    }
}
