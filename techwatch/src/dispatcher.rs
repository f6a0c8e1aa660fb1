use crate::registry::{FetcherParams, SourceRegistry};
use crate::traits::Fetcher;
use crate::types::{Article, Result, SourceCategory, SourceDescriptor, WatchError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Terminal state of one category's fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryOutcome {
    pub category: SourceCategory,
    pub status: FetchStatus,
    pub article_count: usize,
    pub errors: Vec<String>,
}

impl CategoryOutcome {
    fn pending(category: SourceCategory) -> Self {
        Self {
            category,
            status: FetchStatus::Pending,
            article_count: 0,
            errors: Vec::new(),
        }
    }
}

/// Fan-in result: all buckets concatenated in category declaration order
#[derive(Debug, Clone, Default)]
pub struct MergedBatch {
    pub articles: Vec<Article>,
    pub outcomes: Vec<CategoryOutcome>,
}

impl MergedBatch {
    pub fn outcome(&self, category: SourceCategory) -> Option<&CategoryOutcome> {
        self.outcomes.iter().find(|o| o.category == category)
    }

    pub fn count_for(&self, category: SourceCategory) -> usize {
        self.articles.iter().filter(|a| a.category == category).count()
    }
}

/// Runs one fetch task per enabled category and merges the buckets
pub struct Dispatcher<'a> {
    registry: &'a SourceRegistry,
    params: FetcherParams,
    max_age_days: u32,
    fetch_timeout: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a SourceRegistry, params: FetcherParams) -> Self {
        let fetch_timeout = Duration::from_secs(params.fetch.timeout_seconds);
        Self {
            registry,
            params,
            max_age_days: 10,
            fetch_timeout,
        }
    }

    pub fn with_max_age_days(mut self, max_age_days: u32) -> Self {
        self.max_age_days = max_age_days;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Checks that run before any fetcher is built or any task launched
    pub fn preflight(&self, enabled: &[SourceCategory]) -> Result<()> {
        if enabled.is_empty() {
            return Err(WatchError::Configuration(
                "No source category enabled, nothing to fetch".to_string(),
            ));
        }

        for category in enabled {
            if !self.registry.is_registered(*category) {
                return Err(WatchError::Configuration(format!(
                    "Category {} is enabled but has no registered fetcher",
                    category
                )));
            }
        }

        Ok(())
    }

    /// Fetch every enabled category concurrently and wait for all of them.
    ///
    /// Per-source failures and timeouts are recorded in the outcomes; only
    /// configuration problems are returned as errors.
    pub async fn dispatch(
        &self,
        enabled: &[SourceCategory],
        sources: &[SourceDescriptor],
    ) -> Result<MergedBatch> {
        self.preflight(enabled)?;

        let mut categories: Vec<SourceCategory> = enabled.to_vec();
        categories.sort();
        categories.dedup();

        info!("Dispatching fetch for {} categories", categories.len());

        let mut handles = Vec::with_capacity(categories.len());
        for category in &categories {
            let category = *category;
            let category_sources: Vec<SourceDescriptor> = sources
                .iter()
                .filter(|s| s.category == category)
                .cloned()
                .collect();

            if category_sources.is_empty() {
                warn!("No sources configured for {}", category);
            }

            let fetcher = self.registry.create(category, &self.params);
            let max_age_days = self.max_age_days;
            let fetch_timeout = self.fetch_timeout;

            handles.push(tokio::spawn(async move {
                match fetcher {
                    Ok(fetcher) => {
                        fetch_category(fetcher, category, category_sources, max_age_days, fetch_timeout).await
                    }
                    Err(e) => {
                        error!("Could not build fetcher for {}: {}", category, e);
                        let mut outcome = CategoryOutcome::pending(category);
                        outcome.status = FetchStatus::Failed;
                        outcome.errors.push(e.to_string());
                        (Vec::new(), outcome)
                    }
                }
            }));
        }

        // barrier: every task reaches a terminal state before merging
        let results = join_all(handles).await;

        let mut batch = MergedBatch::default();
        for (category, result) in categories.iter().zip(results) {
            match result {
                Ok((articles, outcome)) => {
                    batch.articles.extend(articles);
                    batch.outcomes.push(outcome);
                }
                Err(e) => {
                    error!("Fetch task for {} panicked: {}", category, e);
                    let mut outcome = CategoryOutcome::pending(*category);
                    outcome.status = FetchStatus::Failed;
                    outcome.errors.push(format!("task failed: {}", e));
                    batch.outcomes.push(outcome);
                }
            }
        }

        info!(
            "Merged {} articles from {} categories",
            batch.articles.len(),
            batch.outcomes.len()
        );
        Ok(batch)
    }
}

async fn fetch_category(
    fetcher: Box<dyn Fetcher>,
    category: SourceCategory,
    sources: Vec<SourceDescriptor>,
    max_age_days: u32,
    fetch_timeout: Duration,
) -> (Vec<Article>, CategoryOutcome) {
    let mut bucket = Vec::new();
    let mut outcome = CategoryOutcome::pending(category);

    for source in &sources {
        match timeout(fetch_timeout, fetcher.fetch_articles(source, max_age_days)).await {
            Ok(Ok(articles)) => {
                debug!("{} articles from {}", articles.len(), source.label());
                bucket.extend(articles.into_iter().map(|mut article| {
                    article.category = category;
                    article
                }));
            }
            Ok(Err(e)) => {
                error!("Fetch failed for {} ({}): {}", source.label(), category, e);
                outcome.errors.push(format!("{}: {}", source.label(), e));
            }
            Err(_) => {
                let e = WatchError::Timeout {
                    category,
                    seconds: fetch_timeout.as_secs(),
                };
                warn!("{} ({})", e, source.label());
                outcome.errors.push(format!("{}: {}", source.label(), e));
            }
        }
    }

    outcome.article_count = bucket.len();
    outcome.status = if bucket.is_empty() && !outcome.errors.is_empty() {
        FetchStatus::Failed
    } else {
        FetchStatus::Done
    };

    info!(
        "{} fetch finished: {} articles, {} errors",
        category,
        outcome.article_count,
        outcome.errors.len()
    );
    (bucket, outcome)
}
