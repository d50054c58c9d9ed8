//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, layering, and validating the TOML configuration.
//! Layers are applied in the order CLI > environment > file > defaults and
//! produce one immutable [`Config`] snapshot shared by every component.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::{load_layered, Overrides};
//! use std::path::Path;
//!
//! let (config, hash) = load_layered(Path::new("harvest.toml"), &Overrides::default()).unwrap();
//! println!("{} sources configured (config {})", config.sources.len(), hash);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    bounded_secs, Config, ConnectionConfig, GateConfig, HarvestConfig, MonitorConfig, OutputConfig,
    ProgrammaticRecord, RetryConfig, SourceRecord, UnreachablePolicy, UserAgentConfig, MAX_DELAY,
};

pub use parser::{
    compute_config_hash, load_config, load_layered, merge_layers, parse_config, Overrides,
    ENV_PREFIX,
};
