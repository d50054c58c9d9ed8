use crate::config::types::{
    Config, ConnectionConfig, GateConfig, HarvestConfig, MonitorConfig, UserAgentConfig,
    MAX_DELAY,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Source records are not checked here: a malformed source is excluded by the
/// catalog and reported, it never prevents the harvester from starting.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_connection_config(&config.connection)?;
    validate_gate_config(&config.gate)?;
    validate_monitor_config(&config.monitor)?;
    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.nesting_depth > 4 {
        return Err(ConfigError::Validation(format!(
            "nesting_depth must be at most 4, got {}",
            config.nesting_depth
        )));
    }

    if config.per_source_count < 1 {
        return Err(ConfigError::Validation(
            "per_source_count must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_connection_config(config: &ConnectionConfig) -> Result<(), ConfigError> {
    if config.max_connections < 1 {
        return Err(ConfigError::Validation(
            "max_connections must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_ms == 0 || config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "connection timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_gate_config(config: &GateConfig) -> Result<(), ConfigError> {
    if !config.min_crawl_delay_secs.is_finite() || config.min_crawl_delay_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min_crawl_delay_secs must be >= 0, got {}",
            config.min_crawl_delay_secs
        )));
    }

    if config.min_crawl_delay_secs > MAX_DELAY.as_secs_f64() {
        return Err(ConfigError::Validation(format!(
            "min_crawl_delay_secs must not exceed {} seconds, got {}",
            MAX_DELAY.as_secs(),
            config.min_crawl_delay_secs
        )));
    }

    if !config.backoff_base.is_finite() || config.backoff_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_base must be >= 1.0, got {}",
            config.backoff_base
        )));
    }

    if config.max_delay_ms < config.initial_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must not be below initial_delay_ms ({})",
            config.max_delay_ms, config.initial_delay_ms
        )));
    }

    Ok(())
}

fn validate_monitor_config(config: &MonitorConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&config.health_threshold) {
        return Err(ConfigError::Validation(format!(
            "health_threshold must be within 0..=100, got {}",
            config.health_threshold
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_gate_rejects_negative_floor() {
        let gate = GateConfig {
            min_crawl_delay_secs: -1.0,
            ..Default::default()
        };
        assert!(validate_gate_config(&gate).is_err());
    }

    #[test]
    fn test_gate_rejects_huge_crawl_delay() {
        let gate = GateConfig {
            min_crawl_delay_secs: 1e300,
            ..Default::default()
        };
        assert!(validate_gate_config(&gate).is_err());

        let one_day = GateConfig {
            min_crawl_delay_secs: MAX_DELAY.as_secs_f64(),
            ..Default::default()
        };
        assert!(validate_gate_config(&one_day).is_ok());
    }

    #[test]
    fn test_gate_rejects_shrinking_backoff() {
        let gate = GateConfig {
            backoff_base: 0.5,
            ..Default::default()
        };
        assert!(validate_gate_config(&gate).is_err());
    }

    #[test]
    fn test_monitor_threshold_bounds() {
        let mut monitor = MonitorConfig::default();
        assert!(validate_monitor_config(&monitor).is_ok());

        monitor.health_threshold = 120.0;
        assert!(validate_monitor_config(&monitor).is_err());
    }

    #[test]
    fn test_harvest_bounds() {
        let mut harvest = HarvestConfig::default();
        assert!(validate_harvest_config(&harvest).is_ok());

        harvest.workers = 0;
        assert!(validate_harvest_config(&harvest).is_err());

        harvest.workers = 4;
        harvest.nesting_depth = 9;
        assert!(validate_harvest_config(&harvest).is_err());
    }
}
