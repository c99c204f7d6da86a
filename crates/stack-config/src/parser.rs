//! Configuration parser and structural validation

use crate::{CONFIG_VERSION, ConfigError, EnvironmentConfig, Result, StackConfig, resolver};
use regex::Regex;
use serde_json::Value;
use service_lifecycle::PlatformKind;
use std::path::Path;
use tracing::debug;

/// Pattern every project, environment and service name must match
pub const NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9-]*$";

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<StackConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<StackConfig> {
    let config: StackConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ConfigError::ValidationError(format!("bad pattern: {}", e)))
}

fn check_name(names: &Regex, what: &str, name: &str) -> Result<()> {
    if names.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{} name '{}' must match {}",
            what, name, NAME_PATTERN
        )))
    }
}

fn parse_platform(name: &str) -> Result<PlatformKind> {
    name.parse()
        .map_err(|_| ConfigError::ValidationError(format!("unknown platform '{}'", name)))
}

/// Validate configuration
fn validate_config(config: &StackConfig) -> Result<()> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::ValidationError(format!(
            "unsupported version: {}, expected {}",
            config.version, CONFIG_VERSION
        )));
    }

    let names = compile(NAME_PATTERN)?;
    check_name(&names, "project", &config.project)?;

    if config.environments.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one environment is required".to_string(),
        ));
    }

    for (env_name, env) in &config.environments {
        check_name(&names, "environment", env_name)?;
        validate_environment(&names, env_name, env)?;
    }

    Ok(())
}

fn validate_environment(names: &Regex, env_name: &str, env: &EnvironmentConfig) -> Result<()> {
    if let Some(platform) = &env.platform {
        parse_platform(platform)?;
    }
    for platform in env.settings.keys() {
        parse_platform(platform)?;
    }

    for (name, service) in &env.services {
        check_name(names, "service", name)?;

        match service.get("platform") {
            None | Some(Value::String(_)) => {}
            Some(other) => {
                return Err(ConfigError::ValidationError(format!(
                    "service '{}' has a non-string platform: {}",
                    name, other
                )));
            }
        }
        match env.platform_of(name) {
            Some(platform) => {
                parse_platform(platform)?;
            }
            None => {
                return Err(ConfigError::ValidationError(format!(
                    "service '{}' in '{}' has no platform and the environment sets none",
                    name, env_name
                )));
            }
        }

        if let Some(deps) = service.get("dependencies")
            && !deps
                .as_array()
                .is_some_and(|deps| deps.iter().all(Value::is_string))
        {
            return Err(ConfigError::ValidationError(format!(
                "dependencies of '{}' must be a list of service names",
                name
            )));
        }
        for dep in env.dependencies(name) {
            if !env.services.contains_key(&dep) {
                return Err(ConfigError::ValidationError(format!(
                    "service '{}' depends on unknown service '{}'",
                    name, dep
                )));
            }
        }
    }

    resolver::dependency_order(env_name, env)?;
    Ok(())
}
