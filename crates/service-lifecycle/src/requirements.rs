//! Platform-neutral requirements derived from a service's configuration.
//!
//! [`requirements`] is a pure projection: no I/O, deterministic, and absent
//! configuration produces absent sections. The only invented values are the
//! documented defaults below.

use crate::{Error, Result, Service};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default port for web-facing services that declare none
pub const DEFAULT_PORT: u16 = 3000;
/// Default health-check path
pub const DEFAULT_HEALTH_PATH: &str = "/health";
/// Default transport protocol
pub const DEFAULT_PROTOCOL: &str = "tcp";
/// Annotation carrying the resolved service type
pub const SERVICE_TYPE_ANNOTATION: &str = "service/type";

/// Handler dispatch type of a service
///
/// Declared types come from configuration. Strategies may remap them to a
/// substrate-specific type (the AWS variants) in
/// [`crate::PlatformStrategy::determine_service_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// User-facing web frontend
    Frontend,
    /// API server
    Backend,
    /// Database
    Database,
    /// Shared filesystem or object storage
    Filesystem,
    /// Background worker
    Worker,
    /// Model inference server
    Inference,
    /// Model-context-protocol server
    Mcp,
    /// Infrastructure stack
    Stack,
    /// Fallback when nothing else resolves
    Generic,
    /// ECS Fargate service
    EcsFargate,
    /// RDS database instance
    Rds,
    /// EFS file system
    Efs,
    /// S3 bucket fronted by CloudFront
    S3Cloudfront,
    /// Lambda function
    Lambda,
}

impl ServiceType {
    /// Kebab-case name used in configuration and output
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Frontend => "frontend",
            ServiceType::Backend => "backend",
            ServiceType::Database => "database",
            ServiceType::Filesystem => "filesystem",
            ServiceType::Worker => "worker",
            ServiceType::Inference => "inference",
            ServiceType::Mcp => "mcp",
            ServiceType::Stack => "stack",
            ServiceType::Generic => "generic",
            ServiceType::EcsFargate => "ecs-fargate",
            ServiceType::Rds => "rds",
            ServiceType::Efs => "efs",
            ServiceType::S3Cloudfront => "s3-cloudfront",
            ServiceType::Lambda => "lambda",
        }
    }

    /// Whether the type serves HTTP traffic by default
    pub fn is_web_facing(&self) -> bool {
        matches!(self, ServiceType::Frontend | ServiceType::Backend)
    }

    fn from_name_token(token: &str) -> Option<Self> {
        match token {
            "frontend" | "web" | "ui" | "site" => Some(ServiceType::Frontend),
            "backend" | "api" | "server" => Some(ServiceType::Backend),
            "database" | "db" | "postgres" | "postgresql" | "mysql" | "redis" | "mongo" => {
                Some(ServiceType::Database)
            }
            "filesystem" | "fs" | "storage" | "files" => Some(ServiceType::Filesystem),
            "worker" | "jobs" | "queue" => Some(ServiceType::Worker),
            "inference" | "llm" | "model" => Some(ServiceType::Inference),
            "mcp" => Some(ServiceType::Mcp),
            "stack" | "infra" => Some(ServiceType::Stack),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| Error::config(format!("unknown service type: {}", s)))
    }
}

/// Network requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequirements {
    /// Exposed ports, primary first
    pub ports: Vec<u16>,
    /// Transport protocol
    pub protocol: String,
    /// Health-check path
    pub health_check_path: String,
    /// Health-check port
    pub health_check_port: u16,
    /// Whether a load balancer is needed
    pub load_balancer: bool,
    /// Custom domains
    pub custom_domains: Vec<String>,
}

impl NetworkRequirements {
    /// Primary port
    pub fn primary_port(&self) -> u16 {
        self.ports.first().copied().unwrap_or(DEFAULT_PORT)
    }
}

/// Storage requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRequirements {
    /// Whether data must survive restarts
    pub persistent: bool,
    /// Volume name
    pub volume_name: Option<String>,
    /// Requested size
    pub size: Option<String>,
    /// Mount path
    pub mount_path: Option<String>,
    /// Whether backups are needed
    pub backup: bool,
}

/// An external dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependency {
    /// Dependency name
    pub name: String,
    /// Optional health-check URL
    pub health_check: Option<String>,
}

/// Dependency requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRequirements {
    /// Internal services that must be up first
    pub services: Vec<String>,
    /// External services this one talks to
    pub external: Vec<ExternalDependency>,
}

/// Compute resource requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU units
    pub cpu: Option<String>,
    /// Memory
    pub memory: Option<String>,
    /// Replica count
    pub replicas: u32,
    /// GPU count
    pub gpus: Option<u32>,
}

/// Build requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequirements {
    /// Dockerfile path
    pub dockerfile: String,
    /// Build context
    pub context: String,
    /// Build arguments
    pub args: BTreeMap<String, String>,
}

/// Security requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRequirements {
    /// Secret names
    pub secrets: Vec<String>,
    /// User id
    pub run_as_user: Option<u32>,
    /// Group id
    pub run_as_group: Option<u32>,
    /// Added capabilities
    pub capabilities: Vec<String>,
}

/// Everything a substrate needs to know about a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// Network needs
    pub network: Option<NetworkRequirements>,
    /// Storage needs
    pub storage: Option<StorageRequirements>,
    /// Dependencies
    pub dependencies: Option<DependencyRequirements>,
    /// Compute resources
    pub resources: Option<ResourceRequirements>,
    /// Build configuration
    pub build: Option<BuildRequirements>,
    /// Security configuration
    pub security: Option<SecurityRequirements>,
    /// Environment variables
    pub environment: BTreeMap<String, String>,
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations, always including `service/type`
    pub annotations: BTreeMap<String, String>,
}

impl Requirements {
    /// The resolved service type recorded in the annotations
    pub fn service_type(&self) -> ServiceType {
        self.annotations
            .get(SERVICE_TYPE_ANNOTATION)
            .and_then(|t| t.parse().ok())
            .unwrap_or(ServiceType::Generic)
    }
}

/// Resolve the declared type of a service
///
/// Order: `service/type` annotation, then the `type` config field, then the
/// service name, then [`ServiceType::Generic`]. Unparseable declarations
/// fall through to the next source.
pub fn resolve_service_type(service: &Service) -> ServiceType {
    let config = &service.config;
    config
        .annotations
        .get(SERVICE_TYPE_ANNOTATION)
        .and_then(|t| t.parse().ok())
        .or_else(|| config.service_type.as_deref().and_then(|t| t.parse().ok()))
        .or_else(|| type_from_name(&service.name))
        .unwrap_or(ServiceType::Generic)
}

fn type_from_name(name: &str) -> Option<ServiceType> {
    name.to_ascii_lowercase()
        .split(['-', '_', '.'])
        .find_map(ServiceType::from_name_token)
}

/// Project a service's configuration into its requirements
pub fn requirements(service: &Service) -> Requirements {
    let config = &service.config;
    let service_type = resolve_service_type(service);

    let network_configured = config.port.is_some()
        || !config.ports.is_empty()
        || config.health_check.is_some()
        || config.health_check_port.is_some()
        || !config.domains.is_empty()
        || config.load_balancer.is_some();
    let network = (network_configured || service_type.is_web_facing()).then(|| {
        let mut ports = Vec::new();
        ports.push(config.port.or(config.ports.first().copied()).unwrap_or(DEFAULT_PORT));
        for port in &config.ports {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        NetworkRequirements {
            health_check_port: config.health_check_port.unwrap_or(ports[0]),
            ports,
            protocol: config
                .protocol
                .clone()
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            health_check_path: config
                .health_check
                .clone()
                .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
            load_balancer: config.load_balancer.unwrap_or(false),
            custom_domains: config.domains.clone(),
        }
    });

    let storage = config.storage.as_ref().map(|s| StorageRequirements {
        persistent: s.persistent,
        volume_name: s
            .volume
            .clone()
            .or_else(|| s.persistent.then(|| format!("{}-data", service.name))),
        size: s.size.clone(),
        mount_path: s.mount_path.clone(),
        backup: s.backup,
    });

    let dependencies = (!config.dependencies.is_empty()
        || !config.external_dependencies.is_empty())
    .then(|| DependencyRequirements {
        services: config.dependencies.clone(),
        external: config
            .external_dependencies
            .iter()
            .map(|d| ExternalDependency {
                name: d.name.clone(),
                health_check: d.health_check.clone(),
            })
            .collect(),
    });

    let resources = config.resources.as_ref().map(|r| ResourceRequirements {
        cpu: r.cpu.clone(),
        memory: r.memory.clone(),
        replicas: r.replicas.unwrap_or(1),
        gpus: r.gpus,
    });

    let build = config.build.as_ref().map(|b| BuildRequirements {
        dockerfile: b.dockerfile.clone().unwrap_or_else(|| "Dockerfile".to_string()),
        context: b.context.clone().unwrap_or_else(|| ".".to_string()),
        args: b.args.clone(),
    });

    let security = config.security.as_ref().map(|s| SecurityRequirements {
        secrets: s.secrets.clone(),
        run_as_user: s.run_as_user,
        run_as_group: s.run_as_group,
        capabilities: s.capabilities.clone(),
    });

    let mut annotations = config.annotations.clone();
    annotations.insert(
        SERVICE_TYPE_ANNOTATION.to_string(),
        service_type.as_str().to_string(),
    );

    Requirements {
        network,
        storage,
        dependencies,
        resources,
        build,
        security,
        environment: config.environment.clone(),
        labels: config.labels.clone(),
        annotations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServiceConfig, StorageConfig};

    fn service(name: &str, config: ServiceConfig) -> Service {
        Service::new(name, "staging", config)
    }

    #[test]
    fn test_type_resolution_order() {
        let mut config = ServiceConfig {
            service_type: Some("worker".to_string()),
            ..Default::default()
        };
        config
            .annotations
            .insert(SERVICE_TYPE_ANNOTATION.to_string(), "database".to_string());

        // Annotation beats the config field and the name
        assert_eq!(
            resolve_service_type(&service("api", config.clone())),
            ServiceType::Database
        );

        // Config field beats the name
        config.annotations.clear();
        assert_eq!(
            resolve_service_type(&service("api", config.clone())),
            ServiceType::Worker
        );

        // Name heuristic
        config.service_type = None;
        assert_eq!(
            resolve_service_type(&service("api", config.clone())),
            ServiceType::Backend
        );

        // Generic fallback, never an arbitrary concrete type
        assert_eq!(
            resolve_service_type(&service("thing", config)),
            ServiceType::Generic
        );
    }

    #[test]
    fn test_name_heuristic_matches_whole_tokens() {
        let config = ServiceConfig::default();
        assert_eq!(
            resolve_service_type(&service("orders-db", config.clone())),
            ServiceType::Database
        );
        assert_eq!(
            resolve_service_type(&service("offsets", config.clone())),
            ServiceType::Generic
        );
        assert_eq!(
            resolve_service_type(&service("web_app", config)),
            ServiceType::Frontend
        );
    }

    #[test]
    fn test_unparseable_declared_type_falls_through() {
        let config = ServiceConfig {
            service_type: Some("quantum".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_service_type(&service("backend", config)),
            ServiceType::Backend
        );
    }

    #[test]
    fn test_missing_sections_are_absent() {
        let reqs = requirements(&service("thing", ServiceConfig::default()));
        assert!(reqs.network.is_none());
        assert!(reqs.storage.is_none());
        assert!(reqs.dependencies.is_none());
        assert!(reqs.resources.is_none());
        assert!(reqs.build.is_none());
        assert!(reqs.security.is_none());
        assert_eq!(
            reqs.annotations.get(SERVICE_TYPE_ANNOTATION).unwrap(),
            "generic"
        );
    }

    #[test]
    fn test_web_facing_services_get_documented_defaults() {
        let reqs = requirements(&service("frontend", ServiceConfig::default()));
        let network = reqs.network.unwrap();
        assert_eq!(network.ports, vec![DEFAULT_PORT]);
        assert_eq!(network.health_check_path, DEFAULT_HEALTH_PATH);
        assert_eq!(network.health_check_port, DEFAULT_PORT);
        assert_eq!(network.protocol, "tcp");
        assert!(!network.load_balancer);
    }

    #[test]
    fn test_network_and_storage_projection() {
        let config = ServiceConfig {
            port: Some(5432),
            ports: vec![5432, 9187],
            storage: Some(StorageConfig {
                persistent: true,
                mount_path: Some("/var/lib/postgresql/data".to_string()),
                ..Default::default()
            }),
            dependencies: vec!["vault".to_string()],
            ..Default::default()
        };
        let reqs = requirements(&service("database", config));

        let network = reqs.network.unwrap();
        assert_eq!(network.ports, vec![5432, 9187]);
        assert_eq!(network.primary_port(), 5432);

        let storage = reqs.storage.unwrap();
        assert_eq!(storage.volume_name.as_deref(), Some("database-data"));
        assert_eq!(reqs.dependencies.unwrap().services, vec!["vault"]);
        assert_eq!(reqs.annotations.get(SERVICE_TYPE_ANNOTATION).unwrap(), "database");
    }

    #[test]
    fn test_requirements_are_deterministic() {
        let config = ServiceConfig {
            port: Some(8080),
            ..Default::default()
        };
        let svc = service("backend", config);
        assert_eq!(requirements(&svc), requirements(&svc));
    }

    #[test]
    fn test_service_type_round_trips_through_strings() {
        assert_eq!("ecs-fargate".parse::<ServiceType>().unwrap(), ServiceType::EcsFargate);
        assert_eq!("Database".parse::<ServiceType>().unwrap(), ServiceType::Database);
        assert!("spaceship".parse::<ServiceType>().is_err());
    }
}
