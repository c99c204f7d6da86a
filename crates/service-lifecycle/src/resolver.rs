//! Deployment resolution seam
//!
//! The engine never reads configuration itself. A [`DeploymentResolver`]
//! turns an environment name and a service selection into the ordered
//! deployments a verb runs over.

use crate::{Error, Result, ServiceDeployment, ServiceSelection};

/// Supplies ordered deployments for an environment
pub trait DeploymentResolver {
    /// Deployments for `environment`, restricted to `selection`
    ///
    /// Unknown environments and unknown service names are configuration
    /// errors. The returned order is the start order.
    fn resolve(
        &self,
        environment: &str,
        selection: &ServiceSelection,
    ) -> Result<Vec<ServiceDeployment>>;

    /// Names of every known environment
    fn environments(&self) -> Vec<String>;
}

/// Restrict an ordered list to a selection, keeping its order
pub fn select(
    environment: &str,
    deployments: Vec<ServiceDeployment>,
    selection: &ServiceSelection,
) -> Result<Vec<ServiceDeployment>> {
    let ServiceSelection::Named(names) = selection else {
        return Ok(deployments);
    };
    if let Some(unknown) = names
        .iter()
        .find(|name| !deployments.iter().any(|d| d.name() == name.as_str()))
    {
        return Err(Error::UnknownService {
            service: unknown.clone(),
            environment: environment.to_string(),
        });
    }
    Ok(deployments
        .into_iter()
        .filter(|d| names.iter().any(|name| name == d.name()))
        .collect())
}

/// Resolver over deployments held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    environments: Vec<(String, Vec<ServiceDeployment>)>,
}

impl StaticResolver {
    /// Empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment with its deployments in start order
    pub fn with_environment(
        mut self,
        name: impl Into<String>,
        deployments: Vec<ServiceDeployment>,
    ) -> Self {
        self.environments.push((name.into(), deployments));
        self
    }
}

impl DeploymentResolver for StaticResolver {
    fn resolve(
        &self,
        environment: &str,
        selection: &ServiceSelection,
    ) -> Result<Vec<ServiceDeployment>> {
        let (_, deployments) = self
            .environments
            .iter()
            .find(|(name, _)| name == environment)
            .ok_or_else(|| Error::UnknownEnvironment(environment.to_string()))?;
        select(environment, deployments.clone(), selection)
    }

    fn environments(&self) -> Vec<String> {
        self.environments.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlatformKind, Service, ServiceConfig};

    fn resolver() -> StaticResolver {
        let deployments = ["database", "backend", "frontend"]
            .into_iter()
            .map(|name| {
                ServiceDeployment::new(
                    Service::new(name, "staging", ServiceConfig::default()),
                    PlatformKind::Mock,
                )
            })
            .collect();
        StaticResolver::new().with_environment("staging", deployments)
    }

    #[test]
    fn test_named_selection_keeps_resolution_order() {
        let selection = ServiceSelection::Named(vec!["frontend".into(), "database".into()]);
        let names: Vec<_> = resolver()
            .resolve("staging", &selection)
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["database", "frontend"]);
    }

    #[test]
    fn test_unknown_names_are_configuration_errors() {
        let err = resolver().resolve("prod", &ServiceSelection::All).unwrap_err();
        assert!(matches!(err, Error::UnknownEnvironment(_)));

        let selection = ServiceSelection::Named(vec!["cache".into()]);
        let err = resolver().resolve("staging", &selection).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "unknown service 'cache' in environment 'staging'"
        );
    }
}
