//! AWS through the `aws` CLI
//!
//! Services are remapped to AWS handler types (ECS Fargate, RDS, EFS,
//! S3 + CloudFront, Lambda, CloudFormation stacks) and every call goes
//! through `aws ... --output json`. Response parsing is kept in pure
//! functions so it can be tested without an account.

use super::{CredentialStatus, LogCollector, LogOptions, PlatformStrategy};
use crate::process::{self, CommandLine};
use crate::registry::bind;
use crate::{
    AwsSettings, CommandKind, ContextExtensions, HandlerContext, HandlerInput, HandlerOutput,
    HandlerRegistryBuilder, HealthStatus, LogEntry, PlatformKind, ResourceRef, Result,
    ResultDetails, ResultStatus, Service, ServiceType,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(20);

/// ECS service state from `ecs describe-services`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsServiceState {
    /// `ACTIVE`, `DRAINING` or `INACTIVE`
    pub status: String,
    /// Desired task count
    pub desired: u64,
    /// Running task count
    pub running: u64,
    /// Current task definition ARN
    pub task_definition: Option<String>,
}

/// RDS instance state from `rds describe-db-instances`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstanceState {
    /// e.g. `available`, `stopped`, `starting`
    pub status: String,
    /// Endpoint address
    pub endpoint: Option<String>,
}

/// First service of a `describe-services` response
pub fn parse_ecs_service(response: &Value) -> Option<EcsServiceState> {
    let service = response.get("services")?.as_array()?.first()?;
    Some(EcsServiceState {
        status: service.get("status")?.as_str()?.to_string(),
        desired: service.get("desiredCount").and_then(Value::as_u64).unwrap_or(0),
        running: service.get("runningCount").and_then(Value::as_u64).unwrap_or(0),
        task_definition: service
            .get("taskDefinition")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// First instance of a `describe-db-instances` response
pub fn parse_db_instance(response: &Value) -> Option<DbInstanceState> {
    let instance = response.get("DBInstances")?.as_array()?.first()?;
    Some(DbInstanceState {
        status: instance.get("DBInstanceStatus")?.as_str()?.to_string(),
        endpoint: instance
            .pointer("/Endpoint/Address")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Events of a `logs filter-log-events` response
pub fn parse_log_events(response: &Value) -> Vec<LogEntry> {
    response
        .get("events")
        .and_then(Value::as_array)
        .map(|events| {
            events
                .iter()
                .filter_map(|event| {
                    let message = event.get("message")?.as_str()?.trim_end().to_string();
                    Some(LogEntry {
                        timestamp: event
                            .get("timestamp")
                            .and_then(Value::as_i64)
                            .and_then(DateTime::from_timestamp_millis),
                        source: event
                            .get("logStreamName")
                            .and_then(Value::as_str)
                            .unwrap_or("cloudwatch")
                            .to_string(),
                        message,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Running state and health of a non-ECS, non-RDS resource from its describe response
pub fn parse_resource_state(service_type: ServiceType, response: &Value) -> (bool, HealthStatus) {
    let (pointer, healthy): (&str, fn(&str) -> bool) = match service_type {
        ServiceType::Lambda => ("/Configuration/State", |s| s == "Active"),
        ServiceType::S3Cloudfront => ("/Distribution/Status", |s| s == "Deployed"),
        ServiceType::Efs => ("/FileSystems/0/LifeCycleState", |s| s == "available"),
        ServiceType::Stack => ("/Stacks/0/StackStatus", |s| s.ends_with("_COMPLETE") && !s.contains("ROLLBACK") && !s.starts_with("DELETE")),
        _ => return (false, HealthStatus::Unknown),
    };
    match response.pointer(pointer).and_then(Value::as_str) {
        Some(state) if healthy(state) => (true, HealthStatus::Healthy),
        Some(state) => (false, HealthStatus::Unhealthy(format!("state is {}", state))),
        None => (false, HealthStatus::Unknown),
    }
}

/// AWS handler type for a service
pub fn aws_service_type(declared: ServiceType, settings: &AwsSettings) -> ServiceType {
    if settings.lambda {
        return ServiceType::Lambda;
    }
    match declared {
        ServiceType::Frontend if settings.static_site => ServiceType::S3Cloudfront,
        ServiceType::Database => ServiceType::Rds,
        ServiceType::Filesystem => ServiceType::Efs,
        ServiceType::Stack => ServiceType::Stack,
        ServiceType::EcsFargate
        | ServiceType::Rds
        | ServiceType::Efs
        | ServiceType::S3Cloudfront
        | ServiceType::Lambda => declared,
        _ => ServiceType::EcsFargate,
    }
}

struct AwsCli {
    prefix: String,
}

/// Names of the AWS resources behind one service
struct Names {
    resource: String,
    cluster: String,
    ecs_service: String,
    db_instance: String,
    function: String,
}

impl AwsCli {
    fn names(&self, context: &HandlerContext, settings: &AwsSettings) -> Names {
        let resource = context.resource_name().to_string();
        Names {
            cluster: settings
                .cluster
                .clone()
                .or_else(|| context.extensions.cluster.clone())
                .unwrap_or_else(|| format!("{}-{}", self.prefix, context.environment())),
            ecs_service: settings.ecs_service.clone().unwrap_or_else(|| resource.clone()),
            db_instance: settings.db_instance.clone().unwrap_or_else(|| resource.clone()),
            function: settings.function_name.clone().unwrap_or_else(|| resource.clone()),
            resource,
        }
    }

    fn command(settings: &AwsSettings) -> CommandLine {
        let mut cmd = CommandLine::new("aws");
        cmd.args(["--output", "json"]);
        if let Some(region) = &settings.region {
            cmd.args(["--region", region]);
        }
        if let Some(profile) = &settings.profile {
            cmd.args(["--profile", profile]);
        }
        cmd
    }

    async fn call<I, S>(settings: &AwsSettings, args: I, timeout: Option<Duration>) -> Result<Value>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Self::command(settings);
        cmd.args(args);
        let output = process::run(&cmd, timeout).await?.into_result(&cmd)?;
        if output.stdout.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&output.stdout)?)
        }
    }

    async fn ecs_state(&self, settings: &AwsSettings, names: &Names, timeout: Option<Duration>) -> Result<Option<EcsServiceState>> {
        let response = Self::call(
            settings,
            ["ecs", "describe-services", "--cluster", &names.cluster, "--services", &names.ecs_service],
            timeout,
        )
        .await?;
        Ok(parse_ecs_service(&response).filter(|s| s.status != "INACTIVE"))
    }

    async fn db_state(&self, settings: &AwsSettings, names: &Names, timeout: Option<Duration>) -> Result<Option<DbInstanceState>> {
        match Self::call(
            settings,
            ["rds", "describe-db-instances", "--db-instance-identifier", &names.db_instance],
            timeout,
        )
        .await
        {
            Ok(response) => Ok(parse_db_instance(&response)),
            Err(crate::Error::CommandFailed { reason, .. }) if reason.contains("DBInstanceNotFound") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn log_group(service_type: ServiceType, settings: &AwsSettings, names: &Names) -> Option<String> {
        settings.log_group.clone().or_else(|| match service_type {
            ServiceType::EcsFargate => Some(format!("/ecs/{}", names.resource)),
            ServiceType::Lambda => Some(format!("/aws/lambda/{}", names.function)),
            _ => None,
        })
    }

    async fn logs(settings: &AwsSettings, group: &str, options: &LogOptions, timeout: Option<Duration>) -> Result<Vec<LogEntry>> {
        let since = options.since.unwrap_or_else(|| Utc::now() - ChronoDuration::hours(1));
        let response = Self::call(
            settings,
            [
                "logs".to_string(),
                "filter-log-events".to_string(),
                "--log-group-name".to_string(),
                group.to_string(),
                "--start-time".to_string(),
                since.timestamp_millis().to_string(),
            ],
            timeout,
        )
        .await?;
        let mut events = parse_log_events(&response);
        let skip = events.len().saturating_sub(options.tail);
        Ok(events.split_off(skip))
    }

    async fn observe(&self, context: &HandlerContext, settings: &AwsSettings) -> Result<(bool, HealthStatus, Option<String>)> {
        let names = self.names(context, settings);
        let timeout = context.timeout();
        match context.service_type {
            ServiceType::EcsFargate => Ok(match self.ecs_state(settings, &names, timeout).await? {
                Some(state) if state.running > 0 && state.running >= state.desired => (true, HealthStatus::Healthy, state.task_definition),
                Some(state) if state.running > 0 => (
                    true,
                    HealthStatus::Unhealthy(format!("{} of {} tasks running", state.running, state.desired)),
                    state.task_definition,
                ),
                Some(state) => (false, HealthStatus::Unknown, state.task_definition),
                None => (false, HealthStatus::Unknown, None),
            }),
            ServiceType::Rds => Ok(match self.db_state(settings, &names, timeout).await? {
                Some(state) if state.status == "available" => (true, HealthStatus::Healthy, None),
                Some(state) => (false, HealthStatus::Unhealthy(format!("instance is {}", state.status)), None),
                None => (false, HealthStatus::Unknown, None),
            }),
            ServiceType::Lambda => {
                let response = Self::call(settings, ["lambda", "get-function", "--function-name", &names.function], timeout).await?;
                let (running, health) = parse_resource_state(ServiceType::Lambda, &response);
                Ok((running, health, None))
            }
            ServiceType::S3Cloudfront => {
                let Some(distribution) = &settings.distribution_id else {
                    return Ok((false, HealthStatus::Unknown, None));
                };
                let response = Self::call(settings, ["cloudfront", "get-distribution", "--id", distribution], timeout).await?;
                let (running, health) = parse_resource_state(ServiceType::S3Cloudfront, &response);
                Ok((running, health, None))
            }
            ServiceType::Efs => {
                let Some(fs) = &settings.file_system_id else {
                    return Ok((false, HealthStatus::Unknown, None));
                };
                let response = Self::call(settings, ["efs", "describe-file-systems", "--file-system-id", fs], timeout).await?;
                let (running, health) = parse_resource_state(ServiceType::Efs, &response);
                Ok((running, health, None))
            }
            ServiceType::Stack => {
                let response = Self::call(settings, ["cloudformation", "describe-stacks", "--stack-name", &names.resource], timeout).await?;
                let (running, health) = parse_resource_state(ServiceType::Stack, &response);
                Ok((running, health, None))
            }
            _ => Ok((false, HealthStatus::Unknown, None)),
        }
    }
}

/// Strategy for AWS-managed compute
pub struct AwsStrategy {
    cli: Arc<AwsCli>,
}

impl AwsStrategy {
    /// Create the strategy
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            cli: Arc::new(AwsCli {
                prefix: prefix.into(),
            }),
        }
    }
}

#[async_trait]
impl PlatformStrategy for AwsStrategy {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Aws
    }

    fn resource_prefix(&self) -> &str {
        &self.cli.prefix
    }

    fn determine_service_type(&self, service: &Service) -> ServiceType {
        let settings = service.config.settings.aws().unwrap_or_default();
        aws_service_type(service.service_type(), &settings)
    }

    async fn build_context_extensions(&self, service: &Service, requires_discovery: bool) -> ContextExtensions {
        let mut extensions = ContextExtensions::named(self.resource_name(service));
        let settings = match service.config.settings.aws() {
            Ok(settings) => settings,
            Err(e) => {
                if requires_discovery {
                    extensions.discovery_error = Some(e.to_string());
                }
                return extensions;
            }
        };
        extensions.cluster = Some(
            settings
                .cluster
                .clone()
                .unwrap_or_else(|| format!("{}-{}", self.cli.prefix, service.environment)),
        );
        if !requires_discovery || self.determine_service_type(service) != ServiceType::Rds {
            return extensions;
        }

        let instance = settings
            .db_instance
            .clone()
            .unwrap_or_else(|| extensions.resource_name.clone());
        match AwsCli::call(&settings, ["rds", "describe-db-instances", "--db-instance-identifier", &instance], None).await {
            Ok(response) => {
                extensions.endpoint = parse_db_instance(&response).and_then(|state| state.endpoint);
            }
            Err(e) => extensions.discovery_error = Some(e.to_string()),
        }
        extensions
    }

    async fn validate_credentials(&self, environment: &str) -> CredentialStatus {
        let settings = AwsSettings::default();
        match AwsCli::call(&settings, ["sts", "get-caller-identity"], Some(CREDENTIAL_TIMEOUT)).await {
            Ok(identity) => {
                let arn = identity.get("Arn").and_then(Value::as_str).unwrap_or("unknown");
                debug!("AWS identity: {}", arn);
                CredentialStatus::valid()
            }
            Err(e) => CredentialStatus::invalid(
                format!("AWS credentials are not usable: {}", e),
                format!("run `aws sso login` or export credentials for the '{}' account", environment),
            ),
        }
    }

    fn register_handlers(&self, builder: &mut HandlerRegistryBuilder) {
        let aws = PlatformKind::Aws;
        let cli = &self.cli;
        builder
            .register(CommandKind::Start, aws, ServiceType::EcsFargate, bind(cli, ecs_start))
            .register(CommandKind::Start, aws, ServiceType::Rds, bind(cli, rds_start))
            .register_wildcard(CommandKind::Start, aws, bind(cli, always_on))
            .register(CommandKind::Stop, aws, ServiceType::EcsFargate, bind(cli, ecs_stop))
            .register(CommandKind::Stop, aws, ServiceType::Rds, bind(cli, rds_stop))
            .register_wildcard(CommandKind::Stop, aws, bind(cli, always_on))
            .register(CommandKind::Restart, aws, ServiceType::EcsFargate, bind(cli, ecs_redeploy))
            .register(CommandKind::Restart, aws, ServiceType::Rds, bind(cli, rds_reboot))
            .register(CommandKind::Update, aws, ServiceType::EcsFargate, bind(cli, ecs_redeploy))
            .register(CommandKind::Update, aws, ServiceType::Lambda, bind(cli, lambda_update))
            .register(CommandKind::Update, aws, ServiceType::S3Cloudfront, bind(cli, static_publish))
            .register_wildcard(CommandKind::Provision, aws, bind(cli, stack_deploy))
            .register(CommandKind::Publish, aws, ServiceType::S3Cloudfront, bind(cli, static_publish))
            .register(CommandKind::Publish, aws, ServiceType::EcsFargate, bind(cli, image_publish))
            .register(CommandKind::Publish, aws, ServiceType::Lambda, bind(cli, image_publish))
            .register_wildcard(CommandKind::Check, aws, bind(cli, check))
            .register_wildcard(CommandKind::Watch, aws, bind(cli, watch));
    }

    fn as_log_collector(&self) -> Option<&dyn LogCollector> {
        Some(self)
    }
}

#[async_trait]
impl LogCollector for AwsStrategy {
    async fn collect_logs(&self, service: &Service, options: &LogOptions) -> Option<Vec<LogEntry>> {
        let settings = service.config.settings.aws().ok()?;
        let resource = self.resource_name(service);
        let service_type = self.determine_service_type(service);
        let group = settings.log_group.clone().or_else(|| match service_type {
            ServiceType::EcsFargate => Some(format!("/ecs/{}", resource)),
            ServiceType::Lambda => Some(format!(
                "/aws/lambda/{}",
                settings.function_name.clone().unwrap_or_else(|| resource.clone())
            )),
            _ => None,
        })?;
        AwsCli::logs(&settings, &group, options, None).await.ok()
    }
}

fn resources(context: &HandlerContext, id: Option<String>, endpoint: Option<String>) -> ResourceRef {
    ResourceRef {
        resource_name: Some(context.resource_name().to_string()),
        id,
        endpoint,
    }
}

fn grace(context: &HandlerContext) -> Duration {
    match context.input {
        HandlerInput::Stop { grace_period } | HandlerInput::Restart { grace_period } => grace_period,
        _ => context.options.grace_period(),
    }
}

async fn always_on(_cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    Ok(HandlerOutput::with_status(ResultStatus::NoChange).warning(format!(
        "{} resources for '{}' have no {} operation",
        context.service_type,
        context.name(),
        context.command
    )))
}

async fn ecs_start(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    let Some(state) = cli.ecs_state(&settings, &names, context.timeout()).await? else {
        return Ok(HandlerOutput::failed(format!(
            "ECS service '{}' does not exist in cluster '{}'; run provision first",
            names.ecs_service, names.cluster
        )));
    };
    if state.desired > 0 && state.running > 0 {
        return Ok(HandlerOutput::with_status(ResultStatus::AlreadyRunning)
            .resources(resources(&context, state.task_definition, None)));
    }

    let replicas = context
        .requirements
        .resources
        .as_ref()
        .map(|r| r.replicas)
        .unwrap_or(1);
    info!("Scaling {} to {} task(s)", names.ecs_service, replicas);
    AwsCli::call(
        &settings,
        [
            "ecs".to_string(),
            "update-service".to_string(),
            "--cluster".to_string(),
            names.cluster.clone(),
            "--service".to_string(),
            names.ecs_service.clone(),
            "--desired-count".to_string(),
            replicas.to_string(),
        ],
        context.timeout(),
    )
    .await?;
    Ok(HandlerOutput::ok()
        .resources(resources(&context, state.task_definition, None))
        .details(ResultDetails::Start {
            started_at: Utc::now(),
            endpoint: None,
        }))
}

async fn ecs_stop(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    match cli.ecs_state(&settings, &names, context.timeout()).await? {
        Some(state) if state.desired > 0 => {
            AwsCli::call(
                &settings,
                [
                    "ecs",
                    "update-service",
                    "--cluster",
                    &names.cluster,
                    "--service",
                    &names.ecs_service,
                    "--desired-count",
                    "0",
                ],
                context.timeout(),
            )
            .await?;
            Ok(HandlerOutput::ok().details(ResultDetails::Stop {
                stopped_at: Utc::now(),
                graceful: true,
            }))
        }
        _ => Ok(HandlerOutput::with_status(ResultStatus::AlreadyStopped)),
    }
}

async fn ecs_redeploy(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    let Some(before) = cli.ecs_state(&settings, &names, context.timeout()).await? else {
        return Ok(HandlerOutput::failed(format!(
            "ECS service '{}' does not exist in cluster '{}'",
            names.ecs_service, names.cluster
        )));
    };
    let response = AwsCli::call(
        &settings,
        [
            "ecs",
            "update-service",
            "--cluster",
            &names.cluster,
            "--service",
            &names.ecs_service,
            "--force-new-deployment",
        ],
        context.timeout(),
    )
    .await?;
    let after = response
        .pointer("/service/taskDefinition")
        .and_then(Value::as_str)
        .map(str::to_string);
    let now = Utc::now();
    let details = match context.command {
        CommandKind::Restart => ResultDetails::Restart {
            stopped_at: Some(now),
            started_at: Some(now),
        },
        _ => ResultDetails::Update {
            previous_version: before.task_definition.clone(),
            new_version: after.clone(),
            strategy: "rolling".to_string(),
        },
    };
    Ok(HandlerOutput::ok()
        .resources(resources(&context, after, None))
        .details(details))
}

async fn rds_start(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    let Some(state) = cli.db_state(&settings, &names, context.timeout()).await? else {
        return Ok(HandlerOutput::failed(format!(
            "RDS instance '{}' does not exist; run provision first",
            names.db_instance
        )));
    };
    match state.status.as_str() {
        "available" | "starting" => Ok(HandlerOutput::with_status(ResultStatus::AlreadyRunning)
            .resources(resources(&context, Some(names.db_instance), state.endpoint))),
        "stopped" => {
            AwsCli::call(
                &settings,
                ["rds", "start-db-instance", "--db-instance-identifier", &names.db_instance],
                context.timeout(),
            )
            .await?;
            Ok(HandlerOutput::ok()
                .resources(resources(&context, Some(names.db_instance), state.endpoint.clone()))
                .details(ResultDetails::Start {
                    started_at: Utc::now(),
                    endpoint: state.endpoint,
                }))
        }
        other => Ok(HandlerOutput::failed(format!(
            "RDS instance '{}' is {} and cannot be started",
            names.db_instance, other
        ))),
    }
}

async fn rds_stop(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    match cli.db_state(&settings, &names, context.timeout()).await? {
        Some(state) if state.status == "available" => {
            AwsCli::call(
                &settings,
                ["rds", "stop-db-instance", "--db-instance-identifier", &names.db_instance],
                context.timeout(),
            )
            .await?;
            Ok(HandlerOutput::ok().details(ResultDetails::Stop {
                stopped_at: Utc::now(),
                graceful: true,
            }))
        }
        Some(state) if state.status == "stopped" || state.status == "stopping" => {
            Ok(HandlerOutput::with_status(ResultStatus::AlreadyStopped))
        }
        Some(state) => Ok(HandlerOutput::failed(format!(
            "RDS instance '{}' is {} and cannot be stopped",
            names.db_instance, state.status
        ))),
        None => Ok(HandlerOutput::with_status(ResultStatus::AlreadyStopped)),
    }
}

async fn rds_reboot(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    debug!("Rebooting {} (grace {:?} is not applicable)", names.db_instance, grace(&context));
    AwsCli::call(
        &settings,
        ["rds", "reboot-db-instance", "--db-instance-identifier", &names.db_instance],
        context.timeout(),
    )
    .await?;
    let now = Utc::now();
    Ok(HandlerOutput::ok().details(ResultDetails::Restart {
        stopped_at: Some(now),
        started_at: Some(now),
    }))
}

async fn lambda_update(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    let Some(repository) = &settings.repository else {
        return Ok(HandlerOutput::failed(format!(
            "no image repository configured for lambda '{}'",
            names.function
        )));
    };
    let image = format!("{}:latest", repository);
    let response = AwsCli::call(
        &settings,
        ["lambda", "update-function-code", "--function-name", &names.function, "--image-uri", &image],
        context.timeout(),
    )
    .await?;
    Ok(HandlerOutput::ok().details(ResultDetails::Update {
        previous_version: None,
        new_version: response
            .get("CodeSha256")
            .and_then(Value::as_str)
            .map(str::to_string),
        strategy: "replace".to_string(),
    }))
}

async fn stack_deploy(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let names = cli.names(&context, &settings);
    let Some(template) = &settings.template else {
        return Ok(HandlerOutput::failed(format!(
            "no CloudFormation template configured for '{}'",
            context.name()
        )));
    };
    info!("Deploying stack {} from {}", names.resource, template);
    AwsCli::call(
        &settings,
        [
            "cloudformation",
            "deploy",
            "--stack-name",
            &names.resource,
            "--template-file",
            template,
            "--capabilities",
            "CAPABILITY_NAMED_IAM",
            "--no-fail-on-empty-changeset",
        ],
        context.timeout(),
    )
    .await?;
    Ok(HandlerOutput::ok()
        .resources(resources(&context, Some(names.resource.clone()), None))
        .details(ResultDetails::Provision {
            created: vec![format!("stack/{}", names.resource)],
        }))
}

async fn static_publish(_cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let (Some(bucket), Some(dist_dir)) = (&settings.bucket, &settings.dist_dir) else {
        return Ok(HandlerOutput::failed(format!(
            "static site '{}' needs both `bucket` and `dist_dir`",
            context.name()
        )));
    };
    let target = format!("s3://{}", bucket);
    AwsCli::call(&settings, ["s3", "sync", dist_dir, &target, "--delete"], context.timeout()).await?;

    let mut output = HandlerOutput::ok();
    match &settings.distribution_id {
        Some(distribution) => {
            AwsCli::call(
                &settings,
                ["cloudfront", "create-invalidation", "--distribution-id", distribution, "--paths", "/*"],
                context.timeout(),
            )
            .await?;
        }
        None => output = output.warning("no distribution_id; CloudFront cache not invalidated"),
    }

    Ok(output.details(static_details(&context.input, target)))
}

/// Details for a static-site sync
///
/// Update carries no version; only publish records a tag.
fn static_details(input: &HandlerInput, target: String) -> ResultDetails {
    match input {
        HandlerInput::Publish { tag } => ResultDetails::Publish {
            artifact: Some(target),
            tag: tag.clone(),
        },
        _ => ResultDetails::Update {
            previous_version: None,
            new_version: None,
            strategy: "sync".to_string(),
        },
    }
}

async fn image_publish(_cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    let settings = context.service.config.settings.aws()?;
    let Some(repository) = &settings.repository else {
        return Ok(HandlerOutput::failed(format!(
            "no image repository configured for '{}'",
            context.name()
        )));
    };
    let Some(build) = &context.requirements.build else {
        return Ok(HandlerOutput::failed(format!(
            "no build configuration for '{}'",
            context.name()
        )));
    };
    let tag = match &context.input {
        HandlerInput::Publish { tag } => tag.clone(),
        _ => None,
    };
    let reference = format!("{}:{}", repository, tag.as_deref().unwrap_or("latest"));

    let mut docker_build = CommandLine::new("docker");
    docker_build.args(["build", "-t", &reference, "-f", &build.dockerfile, &build.context]);
    let mut docker_push = CommandLine::new("docker");
    docker_push.args(["push", &reference]);
    for cmd in [&docker_build, &docker_push] {
        let output = process::run(cmd, context.timeout()).await?;
        if !output.success() {
            return Ok(HandlerOutput::failed(output.failure_reason()));
        }
    }

    Ok(HandlerOutput::ok().details(ResultDetails::Publish {
        artifact: Some(reference),
        tag,
    }))
}

async fn check(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let settings = context.service.config.settings.aws()?;
    let (include_logs, tail) = match context.input {
        HandlerInput::Check { include_logs, tail } => (include_logs, tail),
        _ => (false, 0),
    };
    let (running, health, id) = cli.observe(&context, &settings).await?;

    let logs = if include_logs {
        let names = cli.names(&context, &settings);
        match AwsCli::log_group(context.service_type, &settings, &names) {
            Some(group) => {
                let options = LogOptions { tail, since: None };
                AwsCli::logs(&settings, &group, &options, context.timeout()).await.ok()
            }
            None => None,
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
        .resources(resources(&context, id, context.extensions.endpoint.clone()))
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

async fn watch(cli: Arc<AwsCli>, context: HandlerContext) -> Result<HandlerOutput> {
    if let Some(failed) = context.discovery_failure() {
        return Ok(failed);
    }
    let settings = context.service.config.settings.aws()?;
    let tail = match context.input {
        HandlerInput::Watch { tail } => tail,
        _ => crate::DEFAULT_LOG_TAIL,
    };
    let (running, health, _) = cli.observe(&context, &settings).await?;
    let names = cli.names(&context, &settings);
    let recent_logs = match AwsCli::log_group(context.service_type, &settings, &names) {
        Some(group) => {
            let options = LogOptions { tail, since: None };
            AwsCli::logs(&settings, &group, &options, context.timeout())
                .await
                .unwrap_or_default()
        }
        None => Vec::new(),
    };
    Ok(HandlerOutput::ok().details(ResultDetails::Watch {
        running,
        health,
        recent_logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlatformSettings, ServiceConfig};
    use serde_json::json;

    #[test]
    fn test_service_type_remapping() {
        let plain = AwsSettings::default();
        let static_site = AwsSettings {
            static_site: true,
            ..Default::default()
        };
        let lambda = AwsSettings {
            lambda: true,
            ..Default::default()
        };
        assert_eq!(aws_service_type(ServiceType::Frontend, &plain), ServiceType::EcsFargate);
        assert_eq!(aws_service_type(ServiceType::Frontend, &static_site), ServiceType::S3Cloudfront);
        assert_eq!(aws_service_type(ServiceType::Database, &plain), ServiceType::Rds);
        assert_eq!(aws_service_type(ServiceType::Filesystem, &plain), ServiceType::Efs);
        assert_eq!(aws_service_type(ServiceType::Worker, &lambda), ServiceType::Lambda);
        assert_eq!(aws_service_type(ServiceType::Generic, &plain), ServiceType::EcsFargate);
        assert_eq!(aws_service_type(ServiceType::Stack, &plain), ServiceType::Stack);
    }

    #[test]
    fn test_strategy_uses_service_settings_for_type() {
        let strategy = AwsStrategy::new("acme");
        let mut settings = serde_json::Map::new();
        settings.insert("static_site".into(), json!(true));
        let service = Service::new(
            "web",
            "prod",
            ServiceConfig {
                service_type: Some("frontend".into()),
                settings: PlatformSettings::Generic(settings),
                ..Default::default()
            },
        );
        assert_eq!(strategy.determine_service_type(&service), ServiceType::S3Cloudfront);
    }

    #[test]
    fn test_parse_ecs_service() {
        let response = json!({
            "services": [{
                "status": "ACTIVE",
                "desiredCount": 2,
                "runningCount": 1,
                "taskDefinition": "arn:aws:ecs:us-east-1:123:task-definition/api:7"
            }],
            "failures": []
        });
        let state = parse_ecs_service(&response).unwrap();
        assert_eq!(state.desired, 2);
        assert_eq!(state.running, 1);
        assert!(state.task_definition.unwrap().ends_with("api:7"));
        assert!(parse_ecs_service(&json!({"services": []})).is_none());
    }

    #[test]
    fn test_parse_db_instance() {
        let response = json!({
            "DBInstances": [{
                "DBInstanceStatus": "available",
                "Endpoint": {"Address": "db.abc.us-east-1.rds.amazonaws.com", "Port": 5432}
            }]
        });
        let state = parse_db_instance(&response).unwrap();
        assert_eq!(state.status, "available");
        assert_eq!(state.endpoint.as_deref(), Some("db.abc.us-east-1.rds.amazonaws.com"));
    }

    #[test]
    fn test_parse_log_events() {
        let response = json!({
            "events": [
                {"timestamp": 1714557600000i64, "message": "GET /health 200\n", "logStreamName": "ecs/api/1"},
                {"message": "no timestamp"}
            ]
        });
        let events = parse_log_events(&response);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "GET /health 200");
        assert!(events[0].timestamp.is_some());
        assert_eq!(events[1].source, "cloudwatch");
        assert!(parse_log_events(&Value::Null).is_empty());
    }

    #[test]
    fn test_parse_resource_state() {
        let stack = json!({"Stacks": [{"StackStatus": "UPDATE_ROLLBACK_COMPLETE"}]});
        let (running, health) = parse_resource_state(ServiceType::Stack, &stack);
        assert!(!running);
        assert!(matches!(health, HealthStatus::Unhealthy(_)));

        let lambda = json!({"Configuration": {"State": "Active"}});
        assert_eq!(
            parse_resource_state(ServiceType::Lambda, &lambda),
            (true, HealthStatus::Healthy)
        );
    }

    #[test]
    fn test_static_details_follow_the_verb() {
        let update = static_details(&HandlerInput::Update, "s3://acme-site".into());
        assert_eq!(
            update,
            ResultDetails::Update {
                previous_version: None,
                new_version: None,
                strategy: "sync".into(),
            }
        );

        let publish = static_details(
            &HandlerInput::Publish {
                tag: Some("v2".into()),
            },
            "s3://acme-site".into(),
        );
        assert_eq!(
            publish,
            ResultDetails::Publish {
                artifact: Some("s3://acme-site".into()),
                tag: Some("v2".into()),
            }
        );
    }
}
