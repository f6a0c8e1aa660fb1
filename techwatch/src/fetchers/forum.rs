use super::http::HttpClient;
use crate::traits::Fetcher;
use crate::types::{
    Article, FetchConfig, ForumSort, Result, SourceCategory, SourceDescriptor, SourceParams, TimeWindow,
    WatchError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info};

const FORUM_BASE_URL: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: ForumPost,
}

#[derive(Debug, Deserialize)]
pub struct ForumPost {
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub permalink: String,
    pub created_utc: f64,
}

/// Fetcher for FORUM sources, backed by the public listing JSON
pub struct ForumFetcher {
    http: HttpClient,
    base_url: String,
    max_items: usize,
}

impl ForumFetcher {
    pub fn new(config: FetchConfig, max_items: usize) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            base_url: FORUM_BASE_URL.to_string(),
            max_items,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn listing_url(&self, community: &str, sort: ForumSort, window: TimeWindow) -> String {
        format!(
            "{}/r/{}/{}.json?limit={}&t={}",
            self.base_url,
            community,
            sort.as_str(),
            self.max_items,
            window.as_str()
        )
    }
}

/// Community name from the descriptor params, or from a `.../r/<name>` url
fn community_of(source: &SourceDescriptor) -> Option<(String, ForumSort, TimeWindow)> {
    match &source.params {
        SourceParams::Forum { community, sort, window } => Some((community.clone(), *sort, *window)),
        SourceParams::None => source
            .url
            .split("/r/")
            .nth(1)
            .map(|rest| rest.trim_matches('/').split('/').next().unwrap_or("").to_string())
            .filter(|name| !name.is_empty())
            .map(|name| (name, ForumSort::default(), TimeWindow::default())),
    }
}

#[async_trait]
impl Fetcher for ForumFetcher {
    fn category(&self) -> SourceCategory {
        SourceCategory::Forum
    }

    fn fetcher_name(&self) -> String {
        "forum".to_string()
    }

    async fn fetch_articles(&self, source: &SourceDescriptor, max_age_days: u32) -> Result<Vec<Article>> {
        let (community, sort, window) = community_of(source).ok_or_else(|| {
            WatchError::fetch(SourceCategory::Forum, format!("No community in source {}", source.url))
        })?;

        let url = self.listing_url(&community, sort, window);
        info!("Pulling forum listing r/{} ({})", community, sort.as_str());

        let listing: Listing = self
            .http
            .get_json(&url)
            .await
            .map_err(|e| WatchError::fetch(SourceCategory::Forum, format!("r/{}: {}", community, e)))?;

        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let articles = listing_to_articles(listing, cutoff);

        info!("{} recent posts from r/{}", articles.len(), community);
        Ok(articles)
    }
}

/// Convert a decoded listing into articles published at or after `cutoff`
pub fn listing_to_articles(listing: Listing, cutoff: DateTime<Utc>) -> Vec<Article> {
    listing
        .data
        .children
        .into_iter()
        .filter_map(|child| {
            let post = child.data;
            let published = Utc.timestamp_opt(post.created_utc as i64, 0).single()?;
            if published < cutoff {
                debug!("Skipping old post: {}", post.title);
                return None;
            }

            let mut body = post.title.clone();
            if !post.selftext.is_empty() {
                body.push_str("\n\n");
                body.push_str(&post.selftext);
            }

            let link = format!("https://reddit.com{}", post.permalink);
            Some(Article::new(post.title, link, published, SourceCategory::Forum).with_summary(body))
        })
        .collect()
}
