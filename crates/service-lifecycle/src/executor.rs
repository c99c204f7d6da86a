//! Multi-service command executor
//!
//! Drives one verb across an ordered list of deployments. Each service moves
//! through `pending → context-built → dispatched → succeeded | failed`;
//! anything that goes wrong on the way, including a panicking handler, ends
//! in `failed` for that service only. Whether the run goes on after a
//! failure is decided by `force` and the descriptor's `continue_on_error`.

use crate::preflight::{self, PreflightReport};
use crate::{
    CommandDescriptor, CommandOptions, CommandResults, Error, ExecutionContext,
    FORCE_CONTINUATION_KEY, HandlerContext, INTENDED_EFFECT_KEY, PlatformSet, ResourceRef,
    Result, ResultStatus, ServiceDeployment, ServiceResult,
};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where one service is in its execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not yet attempted
    Pending,
    /// Strategy resolved and handler context built
    ContextBuilt,
    /// Handler invoked
    Dispatched,
    /// Finished with `success == true`
    Succeeded,
    /// Finished with `success == false`
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Pending => "pending",
            ServiceState::ContextBuilt => "context-built",
            ServiceState::Dispatched => "dispatched",
            ServiceState::Succeeded => "succeeded",
            ServiceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks one service's state transitions
struct ServiceRun<'a> {
    name: &'a str,
    state: ServiceState,
}

impl<'a> ServiceRun<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            state: ServiceState::Pending,
        }
    }

    fn advance(&mut self, next: ServiceState) {
        debug!("{}: {} -> {}", self.name, self.state, next);
        self.state = next;
    }

    fn finish(&mut self, result: &ServiceResult) {
        self.advance(if result.success {
            ServiceState::Succeeded
        } else {
            ServiceState::Failed
        });
    }
}

/// Runs one verb over many services
pub struct MultiServiceExecutor<'a> {
    platforms: &'a PlatformSet,
    descriptor: &'a dyn CommandDescriptor,
}

impl<'a> MultiServiceExecutor<'a> {
    /// Create an executor for a verb
    pub fn new(platforms: &'a PlatformSet, descriptor: &'a dyn CommandDescriptor) -> Self {
        Self {
            platforms,
            descriptor,
        }
    }

    /// Execute the verb over `deployments` in the given order
    ///
    /// Only configuration errors are returned as `Err`; every per-service
    /// problem becomes a failed [`ServiceResult`].
    pub async fn execute(
        &self,
        deployments: Vec<ServiceDeployment>,
        options: &CommandOptions,
    ) -> Result<CommandResults> {
        let kind = self.descriptor.kind();
        let started = Instant::now();
        let timestamp = Utc::now();

        if options.selection.is_all() && !self.descriptor.supports_all() {
            return Err(Error::config(format!(
                "'{}' needs explicit service names",
                kind
            )));
        }

        info!(
            "Running {} on {} service(s) in '{}'{}",
            kind,
            deployments.len(),
            options.environment,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let preflight = if !options.dry_run && self.descriptor.requires_credential_preflight() {
            preflight::validate(self.platforms, &deployments, &options.environment).await
        } else {
            PreflightReport::default()
        };

        let mut results = Vec::with_capacity(deployments.len());
        let mut failure_seen = false;

        for deployment in &deployments {
            let mut run = ServiceRun::new(deployment.name());

            let mut result = if options.dry_run {
                self.simulate(deployment, options)
            } else if let Some(status) = preflight.rejection(deployment.platform) {
                preflight::credential_failure(deployment, status)
            } else {
                self.run_one(deployment, options, &mut run).await
            };
            run.finish(&result);

            if options.force && failure_seen {
                result = result.with_metadata(FORCE_CONTINUATION_KEY, true);
            }

            let halts = !result.success && !self.descriptor.continue_on_error();
            if !result.success {
                failure_seen = true;
                warn!(
                    "{} failed for '{}': {}",
                    kind,
                    deployment.name(),
                    result.error.as_deref().unwrap_or("unknown error")
                );
                if options.force && result.status == ResultStatus::Failed {
                    result.status = ResultStatus::ForceContinued;
                }
            }

            results.push(result);
            if halts && !options.force {
                info!(
                    "Halting {} after '{}' failed; {} service(s) not attempted",
                    kind,
                    deployment.name(),
                    deployments.len() - results.len()
                );
                break;
            }
        }

        let results = CommandResults::new(
            kind,
            options.environment.clone(),
            timestamp,
            started.elapsed(),
            results,
            ExecutionContext::current(options.dry_run),
        );
        let summary = results.summary();
        info!(
            "{} finished: {} succeeded, {} failed",
            kind, summary.succeeded, summary.failed
        );
        Ok(results)
    }

    fn simulate(&self, deployment: &ServiceDeployment, options: &CommandOptions) -> ServiceResult {
        let effect = self.descriptor.describe_effect(deployment, options);
        debug!("dry run: {}", effect);
        ServiceResult::success(deployment.name(), deployment.platform, ResultStatus::DryRun)
            .with_metadata(INTENDED_EFFECT_KEY, effect)
    }

    async fn run_one(
        &self,
        deployment: &ServiceDeployment,
        options: &CommandOptions,
        run: &mut ServiceRun<'_>,
    ) -> ServiceResult {
        let dispatched = AssertUnwindSafe(self.dispatch(deployment, options, run))
            .catch_unwind()
            .await;
        match dispatched {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ServiceResult::failure(deployment.name(), deployment.platform, e.to_string()),
            Err(panic) => ServiceResult::failure(
                deployment.name(),
                deployment.platform,
                format!("handler panicked: {}", panic_message(panic.as_ref())),
            ),
        }
    }

    async fn dispatch(
        &self,
        deployment: &ServiceDeployment,
        options: &CommandOptions,
        run: &mut ServiceRun<'_>,
    ) -> Result<ServiceResult> {
        let kind = self.descriptor.kind();
        let service = &deployment.service;
        let strategy = self.platforms.strategy(deployment.platform)?;
        let service_type = strategy.determine_service_type(service);
        let extensions = strategy
            .build_context_extensions(service, self.descriptor.requires_discovery())
            .await;
        let resource_name = extensions.resource_name.clone();

        let context = HandlerContext {
            command: kind,
            service: service.clone(),
            platform: deployment.platform,
            service_type,
            requirements: service.requirements(),
            options: options.clone(),
            input: self.descriptor.build_input(service, options),
            extensions,
        };
        run.advance(ServiceState::ContextBuilt);

        let handler = self
            .platforms
            .registry()
            .lookup(kind, deployment.platform, service_type)?;
        run.advance(ServiceState::Dispatched);

        let output = handler.handle(context).await?;
        let mut result = self.descriptor.build_result(deployment, output);
        if result.resources.is_none() {
            result.resources = Some(ResourceRef {
                resource_name: Some(resource_name),
                ..Default::default()
            });
        }
        Ok(result)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ServiceState::ContextBuilt.to_string(), "context-built");
        assert_eq!(ServiceState::Failed.to_string(), "failed");
    }
}
