//! Subcommand implementations

use crate::{GlobalArgs, output};
use anyhow::{Context, Result};
use service_lifecycle::platform::posix::default_state_dir;
use service_lifecycle::{
    CommandExtras, CommandKind, CommandOptions, CommandResults, DeploymentResolver, PlatformSet,
    ServiceDeployment, ServiceSelection, commands,
};
use stack_config::EnvironmentResolver;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

pub mod validate;
pub mod watch;

/// Verb-specific arguments collected from the command line
#[derive(Debug, Default)]
pub struct VerbArgs {
    pub services: Vec<String>,
    pub force: bool,
    pub grace_period: Option<u64>,
    pub extras: CommandExtras,
}

impl VerbArgs {
    pub fn new(services: Vec<String>) -> Self {
        Self {
            services,
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn grace_period(mut self, secs: Option<u64>) -> Self {
        self.grace_period = secs;
        self
    }
}

/// Loaded configuration plus the platforms it runs on
pub struct Session {
    pub resolver: EnvironmentResolver,
    pub platforms: PlatformSet,
    pub environment: String,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let environment = global
            .environment
            .clone()
            .context("No environment given; pass --env or set STACKCTL_ENV")?;
        let resolver = EnvironmentResolver::from_file(&global.config).with_context(|| {
            format!("Failed to load configuration from {}", global.config.display())
        })?;
        let state_dir = global.state_dir.clone().unwrap_or_else(default_state_dir);
        debug!("Local process state in {}", state_dir.display());
        let platforms = PlatformSet::with_defaults(resolver.project(), state_dir);

        Ok(Self {
            resolver,
            platforms,
            environment,
        })
    }

    pub fn deployments(&self, selection: &ServiceSelection) -> Result<Vec<ServiceDeployment>> {
        self.resolver
            .resolve(&self.environment, selection)
            .with_context(|| format!("Failed to resolve services in '{}'", self.environment))
    }

    pub fn options(&self, global: &GlobalArgs, args: VerbArgs) -> CommandOptions {
        let mut options = CommandOptions::new(self.environment.clone())
            .with_dry_run(global.dry_run)
            .with_force(args.force)
            .with_selection(ServiceSelection::from_names(args.services));
        options.output = global.output.into();
        options.verbose = global.verbose;
        options.quiet = global.quiet;
        options.grace_period = args.grace_period.map(Duration::from_secs);
        options.timeout = global.timeout.map(Duration::from_secs);
        options.extras = args.extras;
        options
    }
}

/// Print results and map them to the process exit status
pub fn report(results: &CommandResults, options: &CommandOptions) -> Result<ExitCode> {
    let rendered = output::render(results, options.output, options.quiet)?;
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }
    Ok(if results.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Run one verb over the selected services
pub async fn run_verb(kind: CommandKind, global: &GlobalArgs, args: VerbArgs) -> Result<ExitCode> {
    let session = Session::open(global)?;
    let options = session.options(global, args);
    let deployments = session.deployments(&options.selection)?;

    let results = commands::run(kind, &session.platforms, deployments, &options)
        .await
        .with_context(|| format!("Failed to run {}", kind))?;
    report(&results, &options)
}
