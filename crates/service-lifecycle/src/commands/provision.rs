//! `provision`: create the infrastructure services need.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, HandlerOutput,
    PlatformSet, Result, ResultDetails, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `provision`
#[derive(Debug, Clone, Copy, Default)]
pub struct Provision;

impl CommandDescriptor for Provision {
    fn kind(&self) -> CommandKind {
        CommandKind::Provision
    }

    fn build_input(&self, _service: &Service, _options: &CommandOptions) -> HandlerInput {
        HandlerInput::Provision
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Provisioned
    }

    fn continue_on_error(&self) -> bool {
        false
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn requires_credential_preflight(&self) -> bool {
        true
    }

    fn default_details(&self, output: &HandlerOutput) -> Option<ResultDetails> {
        let created = output
            .resources
            .as_ref()
            .and_then(|r| r.resource_name.clone())
            .into_iter()
            .collect();
        Some(ResultDetails::Provision { created })
    }
}

/// Provision infrastructure
pub async fn provision(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Provision, platforms, deployments, options).await
}
