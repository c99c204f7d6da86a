//! Service configuration and platform assignment types.
//!
//! A [`Service`] carries its raw configuration; the typed, platform-neutral
//! projection lives in [`crate::requirements`]. Platform-specific settings
//! are a tagged union ([`PlatformSettings`]) with a free-form `Generic`
//! variant that each strategy interprets as its own settings type.

use crate::{CommandKind, Error, Requirements, Result, ServiceType, requirements};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Execution substrate a service is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Cloud-managed compute (ECS, RDS, EFS, S3/CloudFront, Lambda, CloudFormation)
    Aws,
    /// Local containers via docker or podman
    Container,
    /// Local processes
    Posix,
    /// Services managed by someone else
    External,
    /// In-memory test double
    Mock,
}

impl PlatformKind {
    /// All platform kinds
    pub const ALL: [PlatformKind; 5] = [
        PlatformKind::Aws,
        PlatformKind::Container,
        PlatformKind::Posix,
        PlatformKind::External,
        PlatformKind::Mock,
    ];

    /// Lowercase name used in configuration and output
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Aws => "aws",
            PlatformKind::Container => "container",
            PlatformKind::Posix => "posix",
            PlatformKind::External => "external",
            PlatformKind::Mock => "mock",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aws" => Ok(PlatformKind::Aws),
            "container" | "docker" | "podman" => Ok(PlatformKind::Container),
            "posix" | "process" => Ok(PlatformKind::Posix),
            "external" => Ok(PlatformKind::External),
            "mock" => Ok(PlatformKind::Mock),
            other => Err(Error::config(format!("unknown platform: {}", other))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whether data must survive restarts
    pub persistent: bool,
    /// Volume name override
    pub volume: Option<String>,
    /// Requested size, e.g. `10Gi`
    pub size: Option<String>,
    /// Mount path inside the service
    pub mount_path: Option<String>,
    /// Whether the volume should be backed up
    pub backup: bool,
}

/// External dependency declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependencyConfig {
    /// Dependency name
    pub name: String,
    /// Optional health-check URL
    #[serde(default)]
    pub health_check: Option<String>,
}

/// Compute resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// CPU units, e.g. `0.5` or `512`
    pub cpu: Option<String>,
    /// Memory, e.g. `512Mi`
    pub memory: Option<String>,
    /// Number of replicas
    pub replicas: Option<u32>,
    /// Number of GPUs
    pub gpus: Option<u32>,
}

/// Image build configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Dockerfile path
    pub dockerfile: Option<String>,
    /// Build context directory
    pub context: Option<String>,
    /// Build arguments
    pub args: BTreeMap<String, String>,
}

/// Security configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Secret names the service needs
    pub secrets: Vec<String>,
    /// User to run as
    pub run_as_user: Option<u32>,
    /// Group to run as
    pub run_as_group: Option<u32>,
    /// Linux capabilities to add
    pub capabilities: Vec<String>,
}

/// Raw configuration of one service
///
/// Common fields are typed; substrate-specific settings are carried in
/// [`PlatformSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Declared service type
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    /// Primary port
    pub port: Option<u16>,
    /// Additional ports
    pub ports: Vec<u16>,
    /// Transport protocol
    pub protocol: Option<String>,
    /// Health-check path
    pub health_check: Option<String>,
    /// Health-check port when different from the primary port
    pub health_check_port: Option<u16>,
    /// Whether the service sits behind a load balancer
    pub load_balancer: Option<bool>,
    /// Custom domains
    pub domains: Vec<String>,
    /// Storage needs
    pub storage: Option<StorageConfig>,
    /// Internal service dependencies
    pub dependencies: Vec<String>,
    /// External dependencies
    pub external_dependencies: Vec<ExternalDependencyConfig>,
    /// Compute resources
    pub resources: Option<ResourceConfig>,
    /// Image build configuration
    pub build: Option<BuildConfig>,
    /// Security configuration
    pub security: Option<SecurityConfig>,
    /// Environment variables
    pub environment: BTreeMap<String, String>,
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations
    pub annotations: BTreeMap<String, String>,
    /// Substrate-specific settings
    #[serde(skip)]
    pub settings: PlatformSettings,
}

impl ServiceConfig {
    /// Parse a raw configuration map for a service assigned to `platform`
    ///
    /// The same map feeds both the common fields and the platform's typed
    /// settings; keys unknown to either are ignored.
    pub fn from_map(platform: PlatformKind, map: Map<String, Value>) -> Result<Self> {
        let mut config: ServiceConfig = serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| Error::config(format!("invalid service configuration: {}", e)))?;
        config.settings = PlatformSettings::from_map(platform, map)?;
        Ok(config)
    }
}

/// AWS settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    /// Region, e.g. `us-east-1`
    pub region: Option<String>,
    /// CLI profile
    pub profile: Option<String>,
    /// ECS cluster name
    pub cluster: Option<String>,
    /// ECS service name override
    pub ecs_service: Option<String>,
    /// RDS instance identifier override
    pub db_instance: Option<String>,
    /// EFS file system id
    pub file_system_id: Option<String>,
    /// S3 bucket for static sites
    pub bucket: Option<String>,
    /// CloudFront distribution id
    pub distribution_id: Option<String>,
    /// Local directory uploaded on publish of a static site
    pub dist_dir: Option<String>,
    /// Serve a frontend as a static site instead of on ECS
    pub static_site: bool,
    /// Run as a Lambda function
    pub lambda: bool,
    /// Lambda function name override
    pub function_name: Option<String>,
    /// CloudFormation template used by provision
    pub template: Option<String>,
    /// CloudWatch log group override
    pub log_group: Option<String>,
    /// ECR repository URI images are pushed to
    pub repository: Option<String>,
}

/// Container settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Image reference
    pub image: Option<String>,
    /// Command override
    pub command: Vec<String>,
    /// Runtime binary override (`docker` or `podman`)
    pub runtime: Option<String>,
    /// Network to attach to
    pub network: Option<String>,
    /// Command run inside a throwaway container by `test`
    pub test_command: Vec<String>,
    /// Restart policy passed to the runtime
    pub restart_policy: Option<String>,
}

/// Local process settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosixSettings {
    /// Program and arguments
    pub command: Vec<String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Command run by `test`
    pub test_command: Vec<String>,
    /// Command run by `publish`
    pub build_command: Vec<String>,
    /// Command run by `provision`
    pub provision_command: Vec<String>,
}

/// Externally managed service settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSettings {
    /// Base URL of the service
    pub endpoint: Option<String>,
    /// Host for reachability probes
    pub host: Option<String>,
    /// Port for reachability probes (falls back to the service port)
    pub port: Option<u16>,
}

/// Test-double settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Verbs whose handler returns a declared failure
    pub fail_on: Vec<CommandKind>,
    /// Verbs whose handler returns an error
    pub fault_on: Vec<CommandKind>,
    /// Verbs whose handler panics
    pub panic_on: Vec<CommandKind>,
    /// Whether the service starts out running
    pub running: bool,
    /// Log lines returned by the log collector
    pub logs: Vec<String>,
}

/// Substrate-specific settings, one variant per platform kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "settings", rename_all = "lowercase")]
pub enum PlatformSettings {
    /// AWS settings
    Aws(AwsSettings),
    /// Container settings
    Container(ContainerSettings),
    /// Local process settings
    Posix(PosixSettings),
    /// External service settings
    External(ExternalSettings),
    /// Test-double settings
    Mock(MockSettings),
    /// Free-form settings interpreted by whichever strategy receives them
    Generic(Map<String, Value>),
}

impl Default for PlatformSettings {
    fn default() -> Self {
        PlatformSettings::Generic(Map::new())
    }
}

impl PlatformSettings {
    /// Parse typed settings for `platform` from a raw map
    pub fn from_map(platform: PlatformKind, map: Map<String, Value>) -> Result<Self> {
        let value = Value::Object(map);
        let parsed = match platform {
            PlatformKind::Aws => serde_json::from_value(value).map(PlatformSettings::Aws),
            PlatformKind::Container => {
                serde_json::from_value(value).map(PlatformSettings::Container)
            }
            PlatformKind::Posix => serde_json::from_value(value).map(PlatformSettings::Posix),
            PlatformKind::External => {
                serde_json::from_value(value).map(PlatformSettings::External)
            }
            PlatformKind::Mock => serde_json::from_value(value).map(PlatformSettings::Mock),
        };
        parsed.map_err(|e| Error::config(format!("invalid {} settings: {}", platform, e)))
    }

    /// Platform these settings were parsed for, `None` for generic settings
    pub fn kind(&self) -> Option<PlatformKind> {
        match self {
            PlatformSettings::Aws(_) => Some(PlatformKind::Aws),
            PlatformSettings::Container(_) => Some(PlatformKind::Container),
            PlatformSettings::Posix(_) => Some(PlatformKind::Posix),
            PlatformSettings::External(_) => Some(PlatformKind::External),
            PlatformSettings::Mock(_) => Some(PlatformKind::Mock),
            PlatformSettings::Generic(_) => None,
        }
    }

    /// AWS settings, interpreting generic settings if necessary
    pub fn aws(&self) -> Result<AwsSettings> {
        self.typed(PlatformKind::Aws, |s| match s {
            PlatformSettings::Aws(a) => Some(a),
            _ => None,
        })
    }

    /// Container settings, interpreting generic settings if necessary
    pub fn container(&self) -> Result<ContainerSettings> {
        self.typed(PlatformKind::Container, |s| match s {
            PlatformSettings::Container(c) => Some(c),
            _ => None,
        })
    }

    /// Process settings, interpreting generic settings if necessary
    pub fn posix(&self) -> Result<PosixSettings> {
        self.typed(PlatformKind::Posix, |s| match s {
            PlatformSettings::Posix(p) => Some(p),
            _ => None,
        })
    }

    /// External settings, interpreting generic settings if necessary
    pub fn external(&self) -> Result<ExternalSettings> {
        self.typed(PlatformKind::External, |s| match s {
            PlatformSettings::External(e) => Some(e),
            _ => None,
        })
    }

    /// Mock settings, interpreting generic settings if necessary
    pub fn mock(&self) -> Result<MockSettings> {
        self.typed(PlatformKind::Mock, |s| match s {
            PlatformSettings::Mock(m) => Some(m),
            _ => None,
        })
    }

    fn typed<T>(&self, platform: PlatformKind, pick: impl Fn(&Self) -> Option<&T>) -> Result<T>
    where
        T: DeserializeOwned + Clone,
    {
        if let Some(settings) = pick(self) {
            return Ok(settings.clone());
        }
        match self {
            PlatformSettings::Generic(map) => serde_json::from_value(Value::Object(map.clone()))
                .map_err(|e| Error::config(format!("invalid {} settings: {}", platform, e))),
            other => Err(Error::config(format!(
                "service is configured for platform '{}', not '{}'",
                other.kind().map(|k| k.as_str()).unwrap_or("generic"),
                platform
            ))),
        }
    }
}

/// A named, independently deployable unit within one environment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    /// Service name, unique within the environment
    pub name: String,
    /// Environment name, e.g. `staging`
    pub environment: String,
    /// Raw configuration
    pub config: ServiceConfig,
}

impl Service {
    /// Create a new service
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
            config,
        }
    }

    /// Derived requirements; pure and recomputed on every call
    pub fn requirements(&self) -> Requirements {
        requirements::requirements(self)
    }

    /// Declared service type after the resolution chain
    pub fn service_type(&self) -> ServiceType {
        requirements::resolve_service_type(self)
    }
}

/// A service paired with the platform it runs on for one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDeployment {
    /// The service
    pub service: Service,
    /// Assigned platform
    pub platform: PlatformKind,
}

impl ServiceDeployment {
    /// Create a new deployment
    pub fn new(service: Service, platform: PlatformKind) -> Self {
        Self { service, platform }
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.service.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_from_map_splits_common_and_platform_fields() {
        let raw = map(json!({
            "type": "database",
            "port": 5432,
            "image": "postgres:16",
            "environment": {"POSTGRES_DB": "app"},
            "storage": {"persistent": true, "mount_path": "/var/lib/postgresql/data"}
        }));

        let config = ServiceConfig::from_map(PlatformKind::Container, raw).unwrap();
        assert_eq!(config.service_type.as_deref(), Some("database"));
        assert_eq!(config.port, Some(5432));
        assert_eq!(config.environment.get("POSTGRES_DB").unwrap(), "app");
        let settings = config.settings.container().unwrap();
        assert_eq!(settings.image.as_deref(), Some("postgres:16"));
    }

    #[test]
    fn test_generic_settings_are_interpreted_by_receiver() {
        let settings = PlatformSettings::Generic(map(json!({"command": ["./run.sh", "--fast"]})));
        let posix = settings.posix().unwrap();
        assert_eq!(posix.command, vec!["./run.sh", "--fast"]);
        assert!(settings.container().unwrap().image.is_none());
    }

    #[test]
    fn test_mismatched_settings_are_rejected() {
        let settings = PlatformSettings::Container(ContainerSettings::default());
        let err = settings.aws().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'container'"));
    }

    #[test]
    fn test_invalid_typed_settings_are_configuration_errors() {
        let raw = map(json!({"fail_on": ["explode"]}));
        let err = ServiceConfig::from_map(PlatformKind::Mock, raw).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_platform_kind_parsing() {
        assert_eq!("docker".parse::<PlatformKind>().unwrap(), PlatformKind::Container);
        assert_eq!("process".parse::<PlatformKind>().unwrap(), PlatformKind::Posix);
        assert!("k8s".parse::<PlatformKind>().is_err());
        assert_eq!(PlatformKind::Aws.to_string(), "aws");
    }
}
