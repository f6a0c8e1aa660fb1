use super::http::HttpClient;
use crate::traits::Fetcher;
use crate::types::{Article, FetchConfig, Result, SourceCategory, SourceDescriptor, WatchError};
use crate::utils::text::strip_html;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// RSS/Atom fetcher for FEED sources
pub struct FeedFetcher {
    http: HttpClient,
}

impl FeedFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    fn category(&self) -> SourceCategory {
        SourceCategory::Feed
    }

    fn fetcher_name(&self) -> String {
        "feed".to_string()
    }

    async fn fetch_articles(&self, source: &SourceDescriptor, max_age_days: u32) -> Result<Vec<Article>> {
        info!("Pulling feed: {}", source.url);

        let content = self
            .http
            .get_text(&source.url)
            .await
            .map_err(|e| WatchError::fetch(SourceCategory::Feed, format!("{}: {}", source.url, e)))?;

        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let articles = parse_feed(&content, cutoff)?;

        info!("{} recent articles from {}", articles.len(), source.label());
        Ok(articles)
    }
}

/// Parse RSS/Atom `content` into articles published at or after `cutoff`.
///
/// Entries without any date or link are dropped, as are repeated links.
pub fn parse_feed(content: &str, cutoff: DateTime<Utc>) -> Result<Vec<Article>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| WatchError::Parse(format!("Failed to parse feed: {}", e)))?;

    let total = feed.entries.len();
    let mut seen_links = HashSet::new();
    let mut articles = Vec::new();

    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            debug!("Skipping entry without link: {}", entry.id);
            continue;
        };

        let Some(published) = entry.published.or(entry.updated) else {
            debug!("Skipping undated entry: {}", link);
            continue;
        };
        let published = published.with_timezone(&Utc);

        if published < cutoff {
            continue;
        }

        if !seen_links.insert(link.clone()) {
            debug!("Skipping duplicate entry with URL: {}", link);
            continue;
        }

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());

        // prefer full content over the summary
        let body = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content))
            .map(|raw| strip_html(&raw))
            .filter(|text| !text.is_empty());

        let mut article = Article::new(title.trim(), link, published, SourceCategory::Feed);
        article.summary = body;
        articles.push(article);
    }

    debug!("{} entries in feed, {} recent", total, articles.len());
    Ok(articles)
}
