use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin type of a piece of content. Declaration order is the order used
/// for merging buckets and for guaranteed selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Feed,
    Forum,
    Social,
    Web,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 4] = [
        SourceCategory::Feed,
        SourceCategory::Forum,
        SourceCategory::Social,
        SourceCategory::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Feed => "feed",
            SourceCategory::Forum => "forum",
            SourceCategory::Social => "social",
            SourceCategory::Web => "web",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            // legacy names from older source files
            "feed" | "rss" => Ok(SourceCategory::Feed),
            "forum" | "reddit" => Ok(SourceCategory::Forum),
            "social" | "bluesky" => Ok(SourceCategory::Social),
            "web" => Ok(SourceCategory::Web),
            other => Err(WatchError::Parse(format!("Unknown source category: {}", other))),
        }
    }
}

/// Listing order for forum sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForumSort {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl ForumSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumSort::Hot => "hot",
            ForumSort::New => "new",
            ForumSort::Top => "top",
            ForumSort::Rising => "rising",
        }
    }
}

/// Time window applied to `top` forum listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

/// Category-specific source parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SourceParams {
    #[default]
    None,
    Forum {
        community: String,
        sort: ForumSort,
        window: TimeWindow,
    },
}

/// One configured source, loaded once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub category: SourceCategory,
    pub url: String,
    pub name: Option<String>,
    pub link: Option<String>,
    pub params: SourceParams,
}

impl SourceDescriptor {
    pub fn new(category: SourceCategory, url: impl Into<String>) -> Self {
        Self {
            category,
            url: url.into(),
            name: None,
            link: None,
            params: SourceParams::None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_params(mut self, params: SourceParams) -> Self {
        self.params = params;
        self
    }

    /// Name for logs: the display name if any, the url otherwise
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

/// A normalized content item produced by a fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: Option<String>,
    pub link: String,
    pub published: DateTime<Utc>,
    pub category: SourceCategory,
    pub score: Option<f64>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        published: DateTime<Utc>,
        category: SourceCategory,
    ) -> Self {
        Self {
            title: title.into(),
            summary: None,
            link: link.into(),
            published,
            category,
            score: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Text used for relevance scoring: `title + " " + summary`, trimmed
    pub fn scoring_text(&self) -> String {
        format!("{} {}", self.title, self.summary.as_deref().unwrap_or(""))
            .trim()
            .to_string()
    }

    /// ISO-8601 form of `published` used for storage and the dedup key
    pub fn published_iso(&self) -> String {
        self.published.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// An article that passed the relevance filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredArticle {
    pub article: Article,
    pub score: f64,
    pub matched_keywords: Vec<String>,
}

impl FilteredArticle {
    pub fn category(&self) -> SourceCategory {
        self.article.category
    }
}

/// A selected article together with its generated summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizedArticle {
    pub article: FilteredArticle,
    pub summary: String,
}

/// Row to be inserted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub score: f64,
    pub published: String,
    pub source: SourceCategory,
}

impl NewArticle {
    pub fn dedup_key(&self) -> (String, String) {
        (self.title.clone(), self.published.clone())
    }
}

impl From<&SummarizedArticle> for NewArticle {
    fn from(item: &SummarizedArticle) -> Self {
        let article = &item.article.article;
        Self {
            title: article.title.clone(),
            link: article.link.clone(),
            summary: item.summary.clone(),
            score: item.article.score,
            published: article.published_iso(),
            source: article.category,
        }
    }
}

/// A persisted article row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub score: f64,
    pub published: String,
    pub source: SourceCategory,
}

/// One full-text search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub article: StoredArticle,
    /// Text relevance normalized to 0-100 against the best hit of the result set
    pub relevance: f64,
    pub title_highlight: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "TechWatch/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Fetch error for {category}: {message}")]
    Fetch {
        category: SourceCategory,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Fetch for {category} timed out after {seconds}s")]
    Timeout {
        category: SourceCategory,
        seconds: u64,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    pub fn fetch(category: SourceCategory, message: impl Into<String>) -> Self {
        WatchError::Fetch {
            category,
            message: message.into(),
        }
    }

    /// Fatal errors abort the run; everything else is contained to one source or item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatchError::Configuration(_) | WatchError::Embedding(_) | WatchError::Persistence(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
