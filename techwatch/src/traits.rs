use crate::types::{Article, Result, SourceCategory, SourceDescriptor};
use async_trait::async_trait;

/// Pulls content from one kind of source and normalizes it into [`Article`]s.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Category this fetcher produces articles for
    fn category(&self) -> SourceCategory;

    /// Human-readable name used in logs
    fn fetcher_name(&self) -> String;

    /// Fetch the articles of one source published within the last `max_age_days`.
    ///
    /// Every returned article has title, link, published and category populated.
    async fn fetch_articles(
        &self,
        source: &SourceDescriptor,
        max_age_days: u32,
    ) -> Result<Vec<Article>>;
}

/// Turns texts into embedding vectors. Must be deterministic for identical input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn provider_name(&self) -> String;

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces a short summary of an article for the digest
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn summarizer_name(&self) -> String;

    async fn summarize(&self, title: &str, content: &str) -> Result<String>;
}
