//! URL helpers shared by the fetch gate and source providers
//!
//! Domain keys identify a politeness scope (robots.txt, crawl-delay) and
//! article canonicalization de-duplicates discovered links.

mod domain;
mod normalize;

pub use domain::{extract_domain, robots_url};
pub use normalize::canonicalize_article_url;

use crate::UrlError;
use url::Url;

/// Parses a string as an absolute http(s) URL
pub fn parse_http_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}
