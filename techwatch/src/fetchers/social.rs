use super::http::HttpClient;
use crate::traits::Fetcher;
use crate::types::{Article, FetchConfig, Result, SourceCategory, SourceDescriptor, WatchError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

const SOCIAL_API_URL: &str = "https://public.api.bsky.app/xrpc";
const TITLE_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AuthorFeed {
    #[serde(default)]
    pub feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct FeedItem {
    pub post: Post,
}

#[derive(Debug, Deserialize)]
pub struct Post {
    pub uri: String,
    pub author: Author,
    pub record: PostRecord,
}

#[derive(Debug, Deserialize)]
pub struct Author {
    pub handle: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub embed: Option<Embed>,
}

#[derive(Debug, Deserialize)]
pub struct Embed {
    pub external: Option<ExternalEmbed>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalEmbed {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Fetcher for SOCIAL sources: the public author feed of one account
pub struct SocialFetcher {
    http: HttpClient,
    api_url: String,
    max_items: usize,
}

impl SocialFetcher {
    pub fn new(config: FetchConfig, max_items: usize) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            api_url: SOCIAL_API_URL.to_string(),
            max_items,
        })
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// Account handle from `@handle`, a `did:` identifier or a profile url
pub fn actor_of(source_url: &str) -> Option<String> {
    let url = source_url.trim();
    let actor = if let Some(rest) = url.split("/profile/").nth(1) {
        rest.trim_matches('/').split('/').next().unwrap_or("")
    } else {
        url.trim_start_matches('@')
    };

    if actor.is_empty() {
        None
    } else {
        Some(actor.to_string())
    }
}

#[async_trait]
impl Fetcher for SocialFetcher {
    fn category(&self) -> SourceCategory {
        SourceCategory::Social
    }

    fn fetcher_name(&self) -> String {
        "social".to_string()
    }

    async fn fetch_articles(&self, source: &SourceDescriptor, max_age_days: u32) -> Result<Vec<Article>> {
        let actor = actor_of(&source.url).ok_or_else(|| {
            WatchError::fetch(SourceCategory::Social, format!("Unsupported social source: {}", source.url))
        })?;

        let url = format!(
            "{}/app.bsky.feed.getAuthorFeed?actor={}&limit={}&filter=posts_no_replies",
            self.api_url, actor, self.max_items
        );
        info!("Pulling social feed of {}", actor);

        let feed: AuthorFeed = self
            .http
            .get_json(&url)
            .await
            .map_err(|e| WatchError::fetch(SourceCategory::Social, format!("{}: {}", actor, e)))?;

        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let articles = author_feed_to_articles(feed, cutoff);

        info!("{} recent posts from {}", articles.len(), actor);
        Ok(articles)
    }
}

/// Convert a decoded author feed into articles published at or after `cutoff`
pub fn author_feed_to_articles(feed: AuthorFeed, cutoff: DateTime<Utc>) -> Vec<Article> {
    feed.feed
        .into_iter()
        .filter_map(|item| {
            let post = item.post;
            let published = match DateTime::parse_from_rfc3339(&post.record.created_at) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    warn!("Bad createdAt on {}: {}", post.uri, e);
                    return None;
                }
            };
            if published < cutoff {
                return None;
            }

            let text = post.record.text.trim().to_string();
            if text.is_empty() {
                debug!("Skipping empty post {}", post.uri);
                return None;
            }

            let mut body = text.clone();
            if let Some(external) = post.record.embed.and_then(|e| e.external) {
                if !external.title.is_empty() {
                    body.push_str("\n\n");
                    body.push_str(&external.title);
                }
                if !external.description.is_empty() {
                    body.push('\n');
                    body.push_str(&external.description);
                }
            }

            let title = if text.chars().count() > TITLE_CHARS {
                format!("{}...", text.chars().take(TITLE_CHARS).collect::<String>())
            } else {
                text
            };

            // at://<did>/<collection>/<rkey>
            let rkey = post.uri.rsplit('/').next().unwrap_or_default();
            let link = format!("https://bsky.app/profile/{}/post/{}", post.author.handle, rkey);

            Some(Article::new(title, link, published, SourceCategory::Social).with_summary(body))
        })
        .collect()
}
