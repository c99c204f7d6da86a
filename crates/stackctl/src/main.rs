//! stackctl: run lifecycle commands across every service of a stack

use clap::{Args, Parser, Subcommand, ValueEnum};
use service_lifecycle::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Control plane for services spread over AWS, containers and local processes")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file path
    #[arg(short, long, global = true, env = "STACKCTL_CONFIG", default_value = "stack.yaml")]
    pub config: PathBuf,

    /// Environment to operate on
    #[arg(short, long = "env", global = true, env = "STACKCTL_ENV")]
    pub environment: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Summary)]
    pub output: Format,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print failures and the summary line
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Show what would happen without touching any platform
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory for local process state (pid and log files)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Per-operation timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Output format selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable summary
    Summary,
    /// JSON document
    Json,
    /// YAML document
    Yaml,
    /// Table
    Table,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Summary => OutputFormat::Summary,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
            Format::Table => OutputFormat::Table,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start services, dependencies first
    Start {
        /// Services to start (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,
    },

    /// Stop services, dependents first
    Stop {
        /// Services to stop (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,

        /// Seconds to wait for a graceful stop
        #[arg(long, value_name = "SECS")]
        grace_period: Option<u64>,
    },

    /// Restart services
    Restart {
        /// Services to restart (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,

        /// Seconds to wait for a graceful stop
        #[arg(long, value_name = "SECS")]
        grace_period: Option<u64>,
    },

    /// Roll services to their latest image or code
    Update {
        /// Services to update (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,
    },

    /// Create the infrastructure services need
    Provision {
        /// Services to provision (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,
    },

    /// Build and publish artifacts
    Publish {
        /// Services to publish (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,

        /// Artifact tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Report whether services are running and healthy
    Check {
        /// Services to check (empty means all)
        services: Vec<String>,

        /// Include recent logs
        #[arg(long)]
        logs: bool,

        /// Number of log lines
        #[arg(long, value_name = "N")]
        tail: Option<usize>,
    },

    /// Run a command inside a service
    Exec {
        /// Target service
        service: String,

        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a service's test suite
    Test {
        /// Services to test (empty means all)
        services: Vec<String>,

        /// Keep going after a failure
        #[arg(long)]
        force: bool,

        /// Test suite name
        #[arg(long)]
        suite: Option<String>,
    },

    /// Repeatedly report status and recent logs
    Watch {
        /// Services to watch (empty means all)
        services: Vec<String>,

        /// Seconds between refreshes
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        interval: u64,

        /// Stop after this many refreshes
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        iterations: Option<u64>,
    },

    /// Validate the configuration file
    Validate,
}

fn main() -> ExitCode {
    let Cli { global, command } = Cli::parse();
    let _guard = match logging::init(&global) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = smol::block_on(async move {
        use commands::VerbArgs;
        use service_lifecycle::CommandKind;

        match command {
            Commands::Start { services, force } => {
                let args = VerbArgs::new(services).force(force);
                commands::run_verb(CommandKind::Start, &global, args).await
            }
            Commands::Stop {
                services,
                force,
                grace_period,
            } => {
                let args = VerbArgs::new(services).force(force).grace_period(grace_period);
                commands::run_verb(CommandKind::Stop, &global, args).await
            }
            Commands::Restart {
                services,
                force,
                grace_period,
            } => {
                let args = VerbArgs::new(services).force(force).grace_period(grace_period);
                commands::run_verb(CommandKind::Restart, &global, args).await
            }
            Commands::Update { services, force } => {
                let args = VerbArgs::new(services).force(force);
                commands::run_verb(CommandKind::Update, &global, args).await
            }
            Commands::Provision { services, force } => {
                let args = VerbArgs::new(services).force(force);
                commands::run_verb(CommandKind::Provision, &global, args).await
            }
            Commands::Publish {
                services,
                force,
                tag,
            } => {
                let mut args = VerbArgs::new(services).force(force);
                args.extras.tag = tag;
                commands::run_verb(CommandKind::Publish, &global, args).await
            }
            Commands::Check {
                services,
                logs,
                tail,
            } => {
                let mut args = VerbArgs::new(services);
                args.extras.include_logs = logs;
                if let Some(tail) = tail {
                    args.extras.tail = tail;
                }
                commands::run_verb(CommandKind::Check, &global, args).await
            }
            Commands::Exec { service, command } => {
                let mut args = VerbArgs::new(vec![service]);
                args.extras.exec = command;
                commands::run_verb(CommandKind::Exec, &global, args).await
            }
            Commands::Test {
                services,
                force,
                suite,
            } => {
                let mut args = VerbArgs::new(services).force(force);
                args.extras.suite = suite;
                commands::run_verb(CommandKind::Test, &global, args).await
            }
            Commands::Watch {
                services,
                interval,
                iterations,
            } => commands::watch::run(&global, services, interval, iterations).await,
            Commands::Validate => commands::validate::run(&global),
        }
    });

    match outcome {
        Ok(status) => status,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
