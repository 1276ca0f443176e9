use std::collections::HashSet;

use feed_rs::parser as feed_parser;
use tracing::{debug, info, warn};

use crate::extractor::extract_structured_text;
use crate::types::NormalizedPost;

use super::strategy::{FeedStrategy, HtmlSourceRules};

/// Composes fetch results into normalized article candidates:
/// detect strategy, enumerate entries, extract fields with fallbacks, run the
/// structured-text extractor over HTML-bearing fields.
///
/// Per-source failures are swallowed into an empty result; one bad source
/// must never abort the run.
pub struct FeedParser {
    html_sources: Vec<HtmlSourceRules>,
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            html_sources: Vec::new(),
            seen_urls: HashSet::new(),
        }
    }

    /// Register a selector table for a source that has no RSS/Atom feed.
    pub fn with_html_source(mut self, rules: HtmlSourceRules) -> Self {
        self.html_sources.push(rules);
        self
    }

    /// Parse a raw feed document into normalized posts. Never fails: parse
    /// errors are logged and yield an empty list.
    pub fn parse_list(&mut self, source_url: &str, raw: &[u8]) -> Vec<NormalizedPost> {
        match self.try_parse(source_url, raw) {
            Ok(posts) => {
                info!("Parsed {} posts from {}", posts.len(), source_url);
                posts
            }
            Err(reason) => {
                warn!("Skipping source {}: {}", source_url, reason);
                Vec::new()
            }
        }
    }

    pub fn clear_seen_urls(&mut self) {
        self.seen_urls.clear();
    }

    fn try_parse(&mut self, source_url: &str, raw: &[u8]) -> Result<Vec<NormalizedPost>, String> {
        match feed_parser::parse(raw) {
            Ok(feed) => {
                let strategy = FeedStrategy::resolve(&feed);
                debug!("Resolved {:?} strategy for {}", feed.feed_type, source_url);
                Ok(self.parse_feed_entries(&strategy, feed))
            }
            Err(feed_err) => {
                // Not a feed document; fall back to a source-specific HTML strategy.
                let strategy = FeedStrategy::resolve_html(source_url, &self.html_sources)
                    .ok_or_else(|| format!("unparsable feed and no HTML rules: {}", feed_err))?;
                let html = std::str::from_utf8(raw)
                    .map_err(|e| format!("source is not valid UTF-8: {}", e))?;
                Ok(self.parse_html_entries(&strategy, html))
            }
        }
    }

    fn parse_feed_entries(
        &mut self,
        strategy: &FeedStrategy,
        feed: feed_rs::model::Feed,
    ) -> Vec<NormalizedPost> {
        let mut posts = Vec::new();

        for entry in feed.entries {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                debug!("Discarding entry with empty title: {}", entry.id);
                continue;
            }

            let url = match strategy.extract_link(&entry) {
                Some(url) => url,
                None => {
                    debug!("Discarding entry without link: {}", title);
                    continue;
                }
            };
            if !self.seen_urls.insert(url.clone()) {
                debug!("Skipping duplicate entry: {}", url);
                continue;
            }

            let content = strategy
                .extract_content(&entry)
                .map(|body| normalize_content(&body))
                .unwrap_or_default();

            let thumbnail = entry
                .media
                .iter()
                .flat_map(|m| m.thumbnails.first())
                .map(|t| t.image.uri.clone())
                .next();

            posts.push(NormalizedPost {
                title,
                url,
                content,
                published_at: strategy.extract_published_date(&entry),
                thumbnail,
            });
        }

        posts
    }

    fn parse_html_entries(&mut self, strategy: &FeedStrategy, html: &str) -> Vec<NormalizedPost> {
        let mut posts = Vec::new();

        for entry in strategy.parse_html_entries(html) {
            if entry.title.is_empty() {
                continue;
            }
            if !self.seen_urls.insert(entry.link.clone()) {
                continue;
            }

            let published_at = strategy.parse_html_date(&entry);
            let content = entry
                .content_html
                .as_deref()
                .map(|body| normalize_content(body))
                .unwrap_or_default();

            posts.push(NormalizedPost {
                title: entry.title,
                url: entry.link,
                content,
                published_at,
                thumbnail: None,
            });
        }

        posts
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

/// HTML-bearing fields go through the structured-text extractor; plain text
/// only gets trimmed and de-NULed.
fn normalize_content(body: &str) -> String {
    if body.contains('<') && body.contains('>') {
        extract_structured_text(body)
    } else {
        body.replace('\0', "").trim().to_string()
    }
}
