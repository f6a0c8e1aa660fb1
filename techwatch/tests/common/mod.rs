#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;
use techwatch::{
    Article, EmbeddingProvider, Fetcher, FilteredArticle, Result, SourceCategory, SourceDescriptor,
    Summarizer, WatchError,
};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn article(title: &str, category: SourceCategory) -> Article {
    Article::new(
        title,
        format!("https://example.com/{}", title.replace(' ', "-").to_lowercase()),
        at(10, 8),
        category,
    )
}

pub fn scored(title: &str, category: SourceCategory, score: f64) -> FilteredArticle {
    let mut article = article(title, category);
    article.score = Some(score);
    FilteredArticle {
        article,
        score,
        matched_keywords: vec!["rust".to_string()],
    }
}

/// Embedder returning fixed vectors per text, `fallback` for unknown texts
pub struct StubEmbedder {
    name: String,
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    fail: bool,
}

impl StubEmbedder {
    pub fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
        Self {
            name: "stub".to_string(),
            vectors: pairs
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            fallback: vec![0.0, 1.0],
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Same stub reporting a different model name
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn failing() -> Self {
        let mut embedder = Self::new(&[]);
        embedder.fail = true;
        embedder
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn provider_name(&self) -> String {
        self.name.clone()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        if self.fail {
            return Err(WatchError::Embedding("model not loaded".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect())
    }
}

/// What a stub fetcher does for one source url
#[derive(Clone)]
pub enum StubBehavior {
    Articles(Vec<Article>),
    Fail(String),
    Hang,
}

pub struct StubFetcher {
    category: SourceCategory,
    behaviors: HashMap<String, StubBehavior>,
}

impl StubFetcher {
    pub fn new(category: SourceCategory, behaviors: HashMap<String, StubBehavior>) -> Self {
        Self { category, behaviors }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    fn category(&self) -> SourceCategory {
        self.category
    }

    fn fetcher_name(&self) -> String {
        format!("stub-{}", self.category)
    }

    async fn fetch_articles(&self, source: &SourceDescriptor, _max_age_days: u32) -> Result<Vec<Article>> {
        match self.behaviors.get(&source.url) {
            Some(StubBehavior::Articles(articles)) => Ok(articles.clone()),
            Some(StubBehavior::Fail(message)) => Err(WatchError::fetch(self.category, message.clone())),
            Some(StubBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Summarizer echoing the title, failing for titles in `fail_on`
pub struct StubSummarizer {
    fail_on: Vec<String>,
    pub calls: AtomicUsize,
}

impl StubSummarizer {
    pub fn new() -> Self {
        Self {
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(titles: &[&str]) -> Self {
        Self {
            fail_on: titles.iter().map(|t| t.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    fn summarizer_name(&self) -> String {
        "stub".to_string()
    }

    async fn summarize(&self, title: &str, _content: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.iter().any(|t| t == title) {
            return Err(WatchError::Summarization("model timeout".to_string()));
        }
        Ok(format!("Summary of {}", title))
    }
}
