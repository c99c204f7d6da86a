//! `publish`: build and push artifacts.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, PlatformSet,
    Result, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `publish`
#[derive(Debug, Clone, Copy, Default)]
pub struct Publish;

impl CommandDescriptor for Publish {
    fn kind(&self) -> CommandKind {
        CommandKind::Publish
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Publish {
            tag: options.extras.tag.clone(),
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Published
    }

    fn continue_on_error(&self) -> bool {
        true
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn requires_credential_preflight(&self) -> bool {
        true
    }

    fn describe_effect(&self, deployment: &ServiceDeployment, options: &CommandOptions) -> String {
        match &options.extras.tag {
            Some(tag) => format!(
                "would publish '{}' on {} as {}",
                deployment.name(),
                deployment.platform,
                tag
            ),
            None => format!("would publish '{}' on {}", deployment.name(), deployment.platform),
        }
    }
}

/// Publish artifacts
pub async fn publish(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Publish, platforms, deployments, options).await
}
