//! Service Lifecycle Engine
//!
//! Drives lifecycle verbs (start, stop, restart, update, provision, publish,
//! check, exec, test, watch) across services that run on different
//! platforms: AWS, local containers, local processes, externally managed
//! services and an in-memory mock.
//!
//! The pieces, leaf first:
//! - [`Service`] and its derived [`Requirements`]
//! - [`PlatformStrategy`] implementations in [`platform`]
//! - the [`HandlerRegistry`] mapping (verb, platform, service type) to a handler
//! - one [`CommandDescriptor`] per verb in [`commands`]
//! - the [`MultiServiceExecutor`] producing one [`CommandResults`]
//!
//! ```no_run
//! use service_lifecycle::{CommandOptions, PlatformKind, PlatformSet, Service, ServiceConfig, ServiceDeployment, commands};
//!
//! # fn main() -> service_lifecycle::Result<()> {
//! let platforms = PlatformSet::with_defaults("acme", std::env::temp_dir());
//! let db = Service::new("database", "staging", ServiceConfig::default());
//! let deployments = vec![ServiceDeployment::new(db, PlatformKind::Container)];
//!
//! let results = smol::block_on(commands::start(&platforms, deployments, &CommandOptions::new("staging")))?;
//! println!("{} of {} started", results.summary().succeeded, results.summary().total);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod command;
pub mod commands;
pub mod context;
pub mod error;
pub mod executor;
pub mod platform;
pub mod preflight;
pub mod process;
pub mod registry;
pub mod requirements;
pub mod resolver;
pub mod results;
pub mod service;

pub use command::{
    CommandDescriptor, CommandExtras, CommandKind, CommandOptions, DEFAULT_GRACE_PERIOD,
    DEFAULT_LOG_TAIL, OutputFormat, ServiceSelection, normalize_output,
};
pub use context::{ContextExtensions, HandlerContext, HandlerInput, HandlerOutput};
pub use error::{Error, Result};
pub use executor::{MultiServiceExecutor, ServiceState};
pub use platform::{
    CredentialStatus, LivenessProbe, LogCollector, LogOptions, PlatformSet, PlatformStrategy,
    ServiceStateSnapshot,
};
pub use preflight::PreflightReport;
pub use registry::{Handler, HandlerKey, HandlerRegistry, HandlerRegistryBuilder, TypeScope};
pub use requirements::{Requirements, ServiceType};
pub use resolver::{DeploymentResolver, StaticResolver};
pub use results::{
    CREDENTIAL_ERROR_KEY, CommandResults, ExecutionContext, FORCE_CONTINUATION_KEY, HealthStatus,
    INTENDED_EFFECT_KEY, LogEntry, REMEDIATION_KEY, ResourceRef, ResultDetails, ResultStatus,
    ServiceResult, Summary,
};
pub use service::{
    AwsSettings, ContainerSettings, ExternalSettings, MockSettings, PlatformKind,
    PlatformSettings, PosixSettings, Service, ServiceConfig, ServiceDeployment, StorageConfig,
};
