//! Variable substitution and deployment resolution
//!
//! This module handles:
//! - Variables: `${VAR}` and `${VAR:-default}` in any string value
//! - Dependency ordering: dependencies first, ties by declaration order
//! - Settings layering: `defaults`, then `settings.<platform>`, then the service

use crate::{ConfigError, EnvironmentConfig, Result, StackConfig, parser};
use serde_json::{Map, Value};
use service_lifecycle::resolver::select;
use service_lifecycle::{
    DeploymentResolver, PlatformKind, Service, ServiceConfig, ServiceDeployment, ServiceSelection,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const VARIABLE_PATTERN: &str = r"\$\{([^}]+)\}";

/// Values available to `${VAR}` substitution
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Variable values
    pub env_vars: HashMap<String, String>,
}

impl ResolutionContext {
    /// Context seeded from the process environment
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Context with no variables at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or update a variable
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(key.into(), value.into());
    }

    /// Builder form of [`set_env`](Self::set_env)
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_env(key, value);
        self
    }
}

/// Substitute variables in one string
pub fn resolve_string(input: &str, context: &ResolutionContext) -> Result<String> {
    let re = parser::compile(VARIABLE_PATTERN)?;
    let mut missing = Vec::new();
    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for cap in re.captures_iter(input) {
        let Some(full) = cap.get(0) else { continue };
        let expr = &cap[1];

        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        result.push_str(&input[last..full.start()]);
        match context.env_vars.get(name).map(String::as_str).or(default) {
            Some(value) => result.push_str(value),
            None => missing.push(name.to_string()),
        }
        last = full.end();
    }
    result.push_str(&input[last..]);

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }
    Ok(result)
}

/// Substitute variables in every string inside a value
pub fn resolve_value(value: Value, context: &ResolutionContext) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(resolve_string(&s, context)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| resolve_value(item, context))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(resolve_map(map, context)?),
        other => other,
    })
}

fn resolve_map(map: Map<String, Value>, context: &ResolutionContext) -> Result<Map<String, Value>> {
    map.into_iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            Ok((key, resolve_value(value, context)?))
        })
        .collect()
}

/// Service names of an environment, dependencies first
///
/// Among services whose dependencies are all placed, the one declared first
/// goes next.
pub fn dependency_order(environment: &str, env: &EnvironmentConfig) -> Result<Vec<String>> {
    let mut ordered: Vec<String> = Vec::with_capacity(env.services.len());
    let mut remaining: Vec<&String> = env.services.keys().collect();

    while !remaining.is_empty() {
        let mut ready = None;
        for (index, name) in remaining.iter().enumerate() {
            let deps = env.dependencies(name);
            if let Some(unknown) = deps.iter().find(|dep| !env.services.contains_key(*dep)) {
                return Err(ConfigError::ServiceNotFound {
                    service: unknown.clone(),
                    environment: environment.to_string(),
                });
            }
            if deps.iter().all(|dep| ordered.contains(dep)) {
                ready = Some(index);
                break;
            }
        }

        match ready {
            Some(index) => ordered.push(remaining.remove(index).clone()),
            None => {
                return Err(ConfigError::DependencyCycle {
                    environment: environment.to_string(),
                    services: remaining.into_iter().cloned().collect(),
                });
            }
        }
    }

    Ok(ordered)
}

/// Environment variables in YAML may be numbers or booleans
fn stringify_environment(map: &mut Map<String, Value>) {
    if let Some(Value::Object(vars)) = map.get_mut("environment") {
        for value in vars.values_mut() {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            *value = Value::String(text);
        }
    }
}

/// Resolves deployments from a parsed `stack.yaml`
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    config: StackConfig,
    context: ResolutionContext,
}

impl EnvironmentResolver {
    /// Resolver substituting from the process environment
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            context: ResolutionContext::new(),
        }
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(parser::parse_file(path)?))
    }

    /// Replace the substitution context
    pub fn with_context(mut self, context: ResolutionContext) -> Self {
        self.context = context;
        self
    }

    /// Parsed configuration
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Project name
    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Layered, substituted configuration map of one service
    pub fn service_map(&self, environment: &str, service: &str) -> Result<Map<String, Value>> {
        let env = self.config.environment(environment)?;
        let own = env
            .services
            .get(service)
            .ok_or_else(|| ConfigError::ServiceNotFound {
                service: service.to_string(),
                environment: environment.to_string(),
            })?;

        let mut merged = self.config.defaults.clone();
        let platform = env
            .platform_of(service)
            .and_then(|p| p.parse::<PlatformKind>().ok());
        if let Some(platform) = platform
            && let Some((_, settings)) = env
                .settings
                .iter()
                .find(|(key, _)| key.parse::<PlatformKind>().ok() == Some(platform))
        {
            merged.extend(settings.clone());
        }
        merged.extend(own.clone());
        merged.remove("platform");

        let mut resolved = resolve_map(merged, &self.context)?;
        stringify_environment(&mut resolved);
        Ok(resolved)
    }

    /// Every deployment of an environment in start order
    pub fn deployments(&self, environment: &str) -> Result<Vec<ServiceDeployment>> {
        let env = self.config.environment(environment)?;
        let order = dependency_order(environment, env)?;
        debug!("Resolved order for '{}': {}", environment, order.join(", "));

        order
            .into_iter()
            .map(|name| -> Result<ServiceDeployment> {
                let platform: PlatformKind = env
                    .platform_of(&name)
                    .ok_or_else(|| {
                        ConfigError::ValidationError(format!("service '{}' has no platform", name))
                    })?
                    .parse()?;
                let config = ServiceConfig::from_map(platform, self.service_map(environment, &name)?)?;
                Ok(ServiceDeployment::new(
                    Service::new(name, environment, config),
                    platform,
                ))
            })
            .collect()
    }
}

impl DeploymentResolver for EnvironmentResolver {
    fn resolve(
        &self,
        environment: &str,
        selection: &ServiceSelection,
    ) -> service_lifecycle::Result<Vec<ServiceDeployment>> {
        let deployments = self.deployments(environment)?;
        select(environment, deployments, selection)
    }

    fn environments(&self) -> Vec<String> {
        self.config.environment_names()
    }
}
