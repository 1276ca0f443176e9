use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed, FeedType};
use scraper::{Html, Selector};
use tracing::warn;

use super::dates::parse_date;

/// Selector table for a source that publishes an HTML listing instead of a feed.
#[derive(Debug, Clone)]
pub struct HtmlSourceRules {
    /// Substring matched against the source URL to select these rules.
    pub url_pattern: String,
    pub entry_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub date_selector: Option<String>,
    pub content_selector: Option<String>,
}

/// Entry pulled out of an HTML listing page before normalization.
#[derive(Debug, Clone)]
pub struct HtmlEntry {
    pub title: String,
    pub link: String,
    pub published_raw: Option<String>,
    pub content_html: Option<String>,
}

/// Extraction strategy for one feed document shape.
///
/// RSS and Atom operate on the parsed `feed_rs` model with format-specific
/// fallback orders; Html drives a selector table over a scraped page.
#[derive(Debug, Clone)]
pub enum FeedStrategy {
    Rss,
    Atom,
    Html(HtmlSourceRules),
}

impl FeedStrategy {
    /// Select a strategy from a successfully parsed feed document.
    pub fn resolve(feed: &Feed) -> Self {
        match feed.feed_type {
            FeedType::Atom => FeedStrategy::Atom,
            // RSS 0.x/1.0/2.0 and JSON Feed all expose plain first-link semantics.
            _ => FeedStrategy::Rss,
        }
    }

    /// Select a source-specific HTML strategy by URL pattern.
    pub fn resolve_html(source_url: &str, sources: &[HtmlSourceRules]) -> Option<Self> {
        sources
            .iter()
            .find(|rules| source_url.contains(rules.url_pattern.as_str()))
            .cloned()
            .map(FeedStrategy::Html)
    }

    pub fn supports(&self, feed: &Feed) -> bool {
        match self {
            FeedStrategy::Rss => !matches!(feed.feed_type, FeedType::Atom),
            FeedStrategy::Atom => matches!(feed.feed_type, FeedType::Atom),
            FeedStrategy::Html(_) => false,
        }
    }

    /// Entry link with per-format fallbacks: primary link tag, then the
    /// alternate-relation link (Atom), then the entry id/guid.
    pub fn extract_link(&self, entry: &Entry) -> Option<String> {
        let from_links = match self {
            FeedStrategy::Atom => entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("alternate"))
                .or_else(|| entry.links.first()),
            _ => entry.links.first(),
        };

        from_links
            .map(|l| l.href.clone())
            .filter(|href| !href.trim().is_empty())
            .or_else(|| {
                let id = entry.id.trim();
                if id.starts_with("http") {
                    Some(id.to_string())
                } else {
                    None
                }
            })
    }

    /// Publish date with fallback: primary date field, then the secondary one.
    pub fn extract_published_date(&self, entry: &Entry) -> Option<DateTime<Utc>> {
        entry.published.or(entry.updated)
    }

    /// Entry content with fallback: rich/encoded content body, then summary.
    pub fn extract_content(&self, entry: &Entry) -> Option<String> {
        entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .filter(|body| !body.trim().is_empty())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .filter(|text| !text.trim().is_empty())
    }

    /// Enumerate entries from an HTML listing page. Only valid for the Html
    /// variant; feed-shaped strategies enumerate through `feed_rs` directly.
    pub fn parse_html_entries(&self, html: &str) -> Vec<HtmlEntry> {
        let rules = match self {
            FeedStrategy::Html(rules) => rules,
            _ => return Vec::new(),
        };

        let entry_sel = match Selector::parse(&rules.entry_selector) {
            Ok(sel) => sel,
            Err(e) => {
                warn!("Invalid entry selector '{}': {:?}", rules.entry_selector, e);
                return Vec::new();
            }
        };
        let title_sel = Selector::parse(&rules.title_selector).ok();
        let link_sel = Selector::parse(&rules.link_selector).ok();
        let date_sel = rules
            .date_selector
            .as_deref()
            .and_then(|s| Selector::parse(s).ok());
        let content_sel = rules
            .content_selector
            .as_deref()
            .and_then(|s| Selector::parse(s).ok());

        let doc = Html::parse_document(html);
        let mut entries = Vec::new();

        for container in doc.select(&entry_sel) {
            let title = title_sel
                .as_ref()
                .and_then(|sel| container.select(sel).next())
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            let link = link_sel
                .as_ref()
                .and_then(|sel| container.select(sel).next())
                .and_then(|el| el.value().attr("href"))
                .map(|href| href.to_string())
                .unwrap_or_default();

            if title.is_empty() || link.is_empty() {
                continue;
            }

            let published_raw = date_sel
                .as_ref()
                .and_then(|sel| container.select(sel).next())
                .map(|el| el.text().collect::<String>().trim().to_string());

            let content_html = content_sel
                .as_ref()
                .and_then(|sel| container.select(sel).next())
                .map(|el| el.inner_html());

            entries.push(HtmlEntry {
                title,
                link,
                published_raw,
                content_html,
            });
        }

        entries
    }

    /// Parse the raw date string of an HTML entry through the shared date parser.
    pub fn parse_html_date(&self, entry: &HtmlEntry) -> Option<DateTime<Utc>> {
        entry.published_raw.as_deref().and_then(parse_date)
    }
}
