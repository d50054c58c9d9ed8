use crate::config::types::{Config, UnreachablePolicy};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "SUMI_HARVEST_";

/// Command-line overrides, the highest-precedence configuration layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub per_source_count: Option<usize>,
    pub database_path: Option<String>,
    pub output_directory: Option<String>,
    pub min_crawl_delay_secs: Option<f64>,
}

/// Loads and parses a configuration file from the given path
///
/// Only the file layer is applied; use [`load_layered`] for the full
/// CLI > environment > file > default merge.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Workers: {}", config.harvest.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Parses TOML content without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the file, then applies environment and CLI layers, then validates
///
/// Returns the merged configuration together with the hash of the file it
/// was built from.
pub fn load_layered(path: &Path, overrides: &Overrides) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let file_layer = parse_config(&content)?;
    let env: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();

    let config = merge_layers(file_layer, &env, overrides)?;
    validate(&config)?;

    Ok((config, hash_content(&content)))
}

/// Applies the environment layer and then the CLI layer on top of `file`
///
/// Defaults are already present in `file` through serde. The merge is a pure
/// function of its inputs so the resulting snapshot is deterministic.
pub fn merge_layers(
    file: Config,
    env: &HashMap<String, String>,
    overrides: &Overrides,
) -> Result<Config, ConfigError> {
    let mut config = file;

    if let Some(v) = env_value::<usize>(env, "WORKERS")? {
        config.harvest.workers = v;
    }
    if let Some(v) = env_value::<usize>(env, "PER_SOURCE_COUNT")? {
        config.harvest.per_source_count = v;
    }
    if let Some(v) = env_value::<usize>(env, "MAX_CONNECTIONS")? {
        config.connection.max_connections = v;
    }
    if let Some(v) = env_value::<f64>(env, "MIN_CRAWL_DELAY_SECS")? {
        config.gate.min_crawl_delay_secs = v;
    }
    if let Some(v) = env_value::<u32>(env, "MAX_RETRIES")? {
        config.retry.max_retries = v;
    }
    if let Some(v) = env.get(&format!("{}DATABASE_PATH", ENV_PREFIX)) {
        config.monitor.database_path = v.clone();
    }
    if let Some(v) = env.get(&format!("{}OUTPUT_DIR", ENV_PREFIX)) {
        config.output.directory = Some(v.clone());
    }
    if let Some(v) = env.get(&format!("{}ROBOTS_UNREACHABLE", ENV_PREFIX)) {
        config.gate.robots_unreachable = match v.to_ascii_lowercase().as_str() {
            "allow" => UnreachablePolicy::Allow,
            "deny" => UnreachablePolicy::Deny,
            other => {
                return Err(ConfigError::Env {
                    var: format!("{}ROBOTS_UNREACHABLE", ENV_PREFIX),
                    message: format!("expected 'allow' or 'deny', got '{}'", other),
                })
            }
        };
    }

    if let Some(v) = overrides.workers {
        config.harvest.workers = v;
    }
    if let Some(v) = overrides.per_source_count {
        config.harvest.per_source_count = v;
    }
    if let Some(v) = &overrides.database_path {
        config.monitor.database_path = v.clone();
    }
    if let Some(v) = &overrides.output_directory {
        config.output.directory = Some(v.clone());
    }
    if let Some(v) = overrides.min_crawl_delay_secs {
        config.gate.min_crawl_delay_secs = v;
    }

    Ok(config)
}

fn env_value<T>(env: &HashMap<String, String>, suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{}{}", ENV_PREFIX, suffix);
    match env.get(&var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Env {
                var,
                message: e.to_string(),
            }),
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with each run record so runs can be matched to their configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
