//! Markdown output
//!
//! This module writes one markdown file per harvested article and renders
//! the run summary as markdown.

use crate::extract::ExtractedContent;
use crate::monitor::HealthStatus;
use crate::orchestrator::RunSummary;
use crate::output::traits::{OutputResult, OutputWriter};
use crate::source::{ArticleRef, SourceDescriptor};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes articles as `<dir>/<source-id>/<slug>-<hash>.md`
#[derive(Debug, Clone)]
pub struct MarkdownWriter {
    root: PathBuf,
}

impl MarkdownWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an article will be written to
    pub fn article_path(&self, source_id: &str, article: &ArticleRef) -> PathBuf {
        self.root
            .join(sanitize(source_id))
            .join(format!("{}.md", file_stem(article)))
    }
}

impl OutputWriter for MarkdownWriter {
    fn write_article(
        &self,
        source: &SourceDescriptor,
        article: &ArticleRef,
        content: &ExtractedContent,
    ) -> OutputResult<Option<PathBuf>> {
        let path = self.article_path(&source.id, article);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let markdown = format_article(source, article, content);
        let mut file = File::create(&path)?;
        file.write_all(markdown.as_bytes())?;

        Ok(Some(path))
    }
}

/// Formats one article as markdown
pub fn format_article(
    source: &SourceDescriptor,
    article: &ArticleRef,
    content: &ExtractedContent,
) -> String {
    let title = content
        .title
        .as_deref()
        .or(article.title.as_deref())
        .unwrap_or("(untitled)");

    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", title));
    md.push_str(&format!("- **Source**: {} ({})\n", source.name, source.id));
    md.push_str(&format!("- **Category**: {}\n", source.category));
    md.push_str(&format!("- **URL**: {}\n", content.url));
    md.push_str(&format!("- **Words**: {}\n", content.word_count));
    md.push_str(&format!("- **Harvested**: {}\n\n", Utc::now().to_rfc3339()));
    md.push_str(&content.text);
    md.push('\n');
    md
}

/// Writes the run summary to `output_path`
pub fn generate_markdown_summary(
    summary: &RunSummary,
    health: &[HealthStatus],
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary, health);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `health` - Health of every tracked source
pub fn format_markdown_summary(summary: &RunSummary, health: &[HealthStatus]) -> String {
    let totals = summary.totals();
    let mut md = String::new();

    md.push_str("# Sumi-Harvest Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    if let Some(run_id) = summary.run_id {
        md.push_str(&format!("- **Run ID**: {}\n", run_id));
    }
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.elapsed.as_secs_f64()
    ));
    md.push_str(&format!("- **Status**: {}\n", summary.status().to_db_string()));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Sources**: {}\n", totals.sources));
    md.push_str(&format!("- **Articles Succeeded**: {}\n", totals.succeeded));
    md.push_str(&format!("- **Articles Skipped**: {}\n", totals.skipped));
    md.push_str(&format!("- **Articles Failed**: {}\n\n", totals.failed));

    md.push_str("## Sources\n\n");
    md.push_str("| Source | Discovered | Attempted | Succeeded | Skipped | Failed |\n");
    md.push_str("|--------|------------|-----------|-----------|---------|--------|\n");
    for (id, tally) in &summary.sources {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            id, tally.discovered, tally.attempted, tally.succeeded, tally.skipped, tally.failed
        ));
    }
    md.push('\n');

    let failed = summary.failed_sources();
    if !failed.is_empty() {
        md.push_str("## Source Errors\n\n");
        for (id, error) in failed {
            md.push_str(&format!("- **{}**: {}\n", id, error));
        }
        md.push('\n');
    }

    if !summary.skipped_sources.is_empty() {
        md.push_str("## Skipped Sources\n\n");
        for id in &summary.skipped_sources {
            md.push_str(&format!("- {}\n", id));
        }
        md.push('\n');
    }

    if !health.is_empty() {
        md.push_str("## Source Health\n\n");
        md.push_str("| Source | Success Rate | Healthy |\n");
        md.push_str("|--------|--------------|---------|\n");
        for status in health {
            md.push_str(&format!(
                "| {} | {:.1}% | {} |\n",
                status.source_id,
                status.success_rate,
                if status.healthy { "yes" } else { "no" }
            ));
        }
        md.push('\n');
    }

    md
}

/// Slug from the URL path plus a short hash of the full URL
fn file_stem(article: &ArticleRef) -> String {
    let digest = Sha256::digest(article.url.as_str().as_bytes());
    let hash = hex::encode(&digest[..6]);

    let slug = article
        .url
        .path_segments()
        .and_then(|mut segments| segments.rev().find(|s| !s.is_empty()))
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string());

    let slug: String = slug.chars().take(60).collect();
    format!("{}-{}", slug, hash)
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SourceTally;
    use crate::source::{Capabilities, OriginKind};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use url::Url;

    fn source() -> SourceDescriptor {
        SourceDescriptor {
            id: "lite-news".into(),
            name: "Lite News".into(),
            base_url: Url::parse("https://lite.example.com/").unwrap(),
            category: "news".into(),
            timeout: Duration::from_secs(5),
            min_delay: Duration::ZERO,
            capabilities: Capabilities::default(),
            origin: OriginKind::Declarative,
            article_selector: None,
            url_pattern: None,
            fallback_urls: Vec::new(),
        }
    }

    fn article(url: &str) -> ArticleRef {
        ArticleRef::new("lite-news", Url::parse(url).unwrap())
    }

    fn content(url: &str) -> ExtractedContent {
        ExtractedContent {
            url: Url::parse(url).unwrap(),
            title: Some("Big News".into()),
            text: "Something happened.".into(),
            word_count: 2,
        }
    }

    #[test]
    fn test_file_stem_is_stable_and_safe() {
        let a = file_stem(&article("https://lite.example.com/2024/01/Big_News.html"));
        let b = file_stem(&article("https://lite.example.com/2024/01/Big_News.html"));
        assert_eq!(a, b);
        assert!(a.starts_with("big-news-html-"));

        let root = file_stem(&article("https://lite.example.com/"));
        assert!(root.starts_with("index-"));
    }

    #[test]
    fn test_write_article() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MarkdownWriter::new(dir.path());
        let url = "https://lite.example.com/story/1";

        let path = writer
            .write_article(&source(), &article(url), &content(url))
            .unwrap()
            .unwrap();

        assert!(path.starts_with(dir.path().join("lite-news")));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("# Big News\n"));
        assert!(written.contains("Something happened."));
        assert!(written.contains("Lite News (lite-news)"));
    }

    #[test]
    fn test_format_markdown_summary() {
        let mut sources = BTreeMap::new();
        sources.insert(
            "lite-news".to_string(),
            SourceTally {
                discovered: 10,
                attempted: 10,
                succeeded: 9,
                failed: 1,
                ..Default::default()
            },
        );
        let summary = RunSummary {
            run_id: Some(3),
            config_hash: "abc123".into(),
            started_at: Utc::now(),
            elapsed: Duration::from_secs(12),
            sources,
            skipped_sources: vec!["down".into()],
            cancelled: false,
        };
        let health = vec![HealthStatus {
            source_id: "lite-news".into(),
            healthy: true,
            success_rate: 90.0,
            last_updated: None,
        }];

        let md = format_markdown_summary(&summary, &health);
        assert!(md.contains("# Sumi-Harvest Run Summary"));
        assert!(md.contains("- **Run ID**: 3"));
        assert!(md.contains("| lite-news | 10 | 10 | 9 | 0 | 1 |"));
        assert!(md.contains("## Skipped Sources"));
        assert!(md.contains("| lite-news | 90.0% | yes |"));
    }
}
