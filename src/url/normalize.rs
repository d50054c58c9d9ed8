use url::Url;

/// Query parameters that only carry campaign tracking
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_eid",
    "ocid",
    "cmpid",
];

/// Canonicalizes an article URL for de-duplication
///
/// The fragment and tracking parameters are removed; everything else,
/// including query order, is kept because some sources route on it.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::canonicalize_article_url;
///
/// let url = Url::parse("https://example.com/a?id=7&utm_source=rss#comments").unwrap();
/// assert_eq!(canonicalize_article_url(&url).as_str(), "https://example.com/a?id=7");
/// ```
pub fn canonicalize_article_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
