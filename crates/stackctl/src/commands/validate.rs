use crate::GlobalArgs;
use anyhow::{Context, Result};
use service_lifecycle::{DeploymentResolver, ServiceSelection};
use stack_config::EnvironmentResolver;
use std::process::ExitCode;

pub fn run(global: &GlobalArgs) -> Result<ExitCode> {
    println!("Validating {}...", global.config.display());

    let resolver =
        EnvironmentResolver::from_file(&global.config).context("Failed to parse configuration")?;
    let config = resolver.config();

    println!("✓ Configuration valid");
    println!("  Version: {}", config.version);
    println!("  Project: {}", config.project);

    // Resolving substitutes variables, which parsing alone does not
    let environments = match &global.environment {
        Some(environment) => vec![environment.clone()],
        None => resolver.environments(),
    };
    for environment in environments {
        let deployments = resolver
            .resolve(&environment, &ServiceSelection::All)
            .with_context(|| format!("Failed to resolve environment '{}'", environment))?;
        println!("  Environment {} ({} services):", environment, deployments.len());
        for deployment in deployments {
            println!(
                "    {} [{}, {}]",
                deployment.name(),
                deployment.platform,
                deployment.service.service_type()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
