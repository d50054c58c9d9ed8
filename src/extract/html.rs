//! HTML to plain-text article extraction

use crate::extract::{ContentExtractor, ExtractedContent};
use crate::robots::FetchedPage;
use anyhow::bail;
use scraper::{Html, Selector};

/// Containers tried in order; the first one holding paragraphs wins
const BODY_SELECTORS: &[&str] = &["article p", "main p", "[role=main] p", "p"];

/// Paragraph-based text extractor for HTML articles
///
/// Plain-text responses are passed through unchanged.
#[derive(Debug, Clone)]
pub struct HtmlTextExtractor {
    min_words: usize,
}

impl Default for HtmlTextExtractor {
    fn default() -> Self {
        Self { min_words: 1 }
    }
}

impl HtmlTextExtractor {
    /// Extractor that rejects articles shorter than `min_words`
    pub fn with_min_words(min_words: usize) -> Self {
        Self {
            min_words: min_words.max(1),
        }
    }
}

impl ContentExtractor for HtmlTextExtractor {
    fn extract(&self, page: &FetchedPage) -> anyhow::Result<ExtractedContent> {
        let is_plain_text = page
            .content_type
            .as_deref()
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/plain"))
            .unwrap_or(false);

        let (title, text) = if is_plain_text {
            (None, normalize_paragraphs(page.body.split("\n\n")))
        } else {
            let document = Html::parse_document(&page.body);
            (extract_title(&document), extract_body(&document))
        };

        let word_count = text.split_whitespace().count();
        if word_count < self.min_words {
            bail!(
                "{} has {} readable words, need at least {}",
                page.final_url,
                word_count,
                self.min_words
            );
        }

        Ok(ExtractedContent {
            url: page.final_url.clone(),
            title,
            text,
            word_count,
        })
    }
}

/// Prefers `og:title`, then `<title>`, then the first `<h1>`
fn extract_title(document: &Html) -> Option<String> {
    if let Ok(og) = Selector::parse(r#"meta[property="og:title"][content]"#) {
        let found = document
            .select(&og)
            .filter_map(|m| m.value().attr("content"))
            .map(collapse_whitespace)
            .find(|t| !t.is_empty());
        if found.is_some() {
            return found;
        }
    }

    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(|e| collapse_whitespace(&e.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

fn extract_body(document: &Html) -> String {
    for raw in BODY_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let paragraphs: Vec<String> = document
            .select(&selector)
            .map(|p| p.text().collect::<String>())
            .collect();
        let text = normalize_paragraphs(paragraphs.iter().map(String::as_str));
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

fn normalize_paragraphs<'a>(paragraphs: impl Iterator<Item = &'a str>) -> String {
    paragraphs
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
