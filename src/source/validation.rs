//! Source record validation
//!
//! Turns a loosely-typed [`SourceRecord`] into a [`SourceDescriptor`], or
//! reports the first problem found.

use crate::config::{SourceRecord, MAX_DELAY};
use crate::source::descriptor::{
    Capabilities, OriginKind, SourceDescriptor, DEFAULT_CATEGORY, DEFAULT_SOURCE_TIMEOUT,
};
use crate::url::parse_http_url;
use crate::{UrlError, ValidationError};
use regex::Regex;
use scraper::Selector;
use std::time::Duration;
use url::Url;

/// Selector used by declarative sources that do not set `article-selector`
pub const DEFAULT_ARTICLE_SELECTOR: &str = "a[href]";

/// Validates a record and builds its descriptor
///
/// # Arguments
///
/// * `record` - The raw record from configuration or a provider factory
/// * `origin` - Whether the record is declarative or programmatic
///
/// # Returns
///
/// The descriptor, or the first validation error encountered
pub fn validate_record(
    record: &SourceRecord,
    origin: OriginKind,
) -> Result<SourceDescriptor, ValidationError> {
    let id = required(&record.id, "id")?;
    let name = required(&record.name, "name")?;
    let raw_url = required(&record.base_url, "base-url")?;
    let base_url = parse_source_url(&raw_url)?;

    let timeout = match record.timeout_secs {
        None => DEFAULT_SOURCE_TIMEOUT,
        Some(secs) if secs.is_finite() && secs > 0.0 && secs <= MAX_DELAY.as_secs_f64() => {
            Duration::from_secs_f64(secs)
        }
        Some(secs) => return Err(ValidationError::InvalidTimeout(secs)),
    };

    let min_delay = match record.rate_limit_secs {
        None => Duration::ZERO,
        Some(secs) if secs.is_finite() && secs >= 0.0 && secs <= MAX_DELAY.as_secs_f64() => {
            Duration::from_secs_f64(secs)
        }
        Some(secs) => return Err(ValidationError::InvalidRateLimit(secs)),
    };

    let article_selector = match (&record.article_selector, origin) {
        (Some(selector), _) => Some(selector.trim().to_string()),
        (None, OriginKind::Declarative) => Some(DEFAULT_ARTICLE_SELECTOR.to_string()),
        (None, OriginKind::Programmatic) => None,
    };
    if let Some(selector) = &article_selector {
        compile_selector(selector)?;
    }

    if let Some(pattern) = &record.url_pattern {
        compile_pattern(pattern)?;
    }

    let fallback_urls = record
        .fallback_urls
        .iter()
        .map(|raw| parse_source_url(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let category = record
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_lowercase();

    Ok(SourceDescriptor {
        id,
        name,
        base_url,
        category,
        timeout,
        min_delay,
        capabilities: Capabilities {
            supports_comments: record.supports_comments,
        },
        origin,
        article_selector,
        url_pattern: record.url_pattern.clone(),
        fallback_urls,
    })
}

/// Compiles a CSS selector, mapping failures to a validation error
pub fn compile_selector(selector: &str) -> Result<Selector, ValidationError> {
    Selector::parse(selector).map_err(|e| ValidationError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Compiles a URL pattern, mapping failures to a validation error
pub fn compile_pattern(pattern: &str) -> Result<Regex, ValidationError> {
    Regex::new(pattern).map_err(|e| ValidationError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingField(field))
}

fn parse_source_url(raw: &str) -> Result<Url, ValidationError> {
    parse_http_url(raw.trim()).map_err(|e| match e {
        UrlError::InvalidScheme(scheme) => ValidationError::InvalidScheme(scheme),
        other => ValidationError::InvalidUrl {
            url: raw.to_string(),
            message: other.to_string(),
        },
    })
}
