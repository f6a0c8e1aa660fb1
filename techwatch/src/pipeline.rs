use crate::config::WatchConfig;
use crate::dispatcher::{CategoryOutcome, Dispatcher};
use crate::registry::SourceRegistry;
use crate::relevance::RelevanceFilter;
use crate::selection::{select, QuotaPlan};
use crate::store::ArticleStore;
use crate::summarizer::summarize_selection;
use crate::traits::{EmbeddingProvider, Summarizer};
use crate::types::{NewArticle, Result, SourceDescriptor, SummarizedArticle, WatchError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Init,
    Dispatched,
    Fetching,
    Merged,
    Filtered,
    Selected,
    Summarized,
    Persisted,
    Completed,
    Aborted,
}

/// What one run did, kept even when persistence failed so it can be retried
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stage: RunStage,
    pub outcomes: Vec<CategoryOutcome>,
    pub merged_count: usize,
    pub filtered_count: usize,
    pub selected_count: usize,
    pub plan: Option<QuotaPlan>,
    pub summaries: Vec<SummarizedArticle>,
    pub inserted: usize,
    pub persist_error: Option<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: RunStage::Init,
            outcomes: Vec::new(),
            merged_count: 0,
            filtered_count: 0,
            selected_count: 0,
            plan: None,
            summaries: Vec::new(),
            inserted: 0,
            persist_error: None,
        }
    }

    fn advance(&mut self, stage: RunStage) {
        debug!("Run {}: {:?} -> {:?}", self.run_id, self.stage, stage);
        self.stage = stage;
    }

    pub fn is_completed(&self) -> bool {
        self.stage == RunStage::Completed
    }

    /// Rows to hand to the store
    pub fn new_articles(&self) -> Vec<NewArticle> {
        self.summaries.iter().map(NewArticle::from).collect()
    }
}

/// Fetch, filter, select, summarize and persist in one batch
pub struct WatchPipeline {
    config: WatchConfig,
    registry: SourceRegistry,
    filter: RelevanceFilter,
    summarizer: Arc<dyn Summarizer>,
    store: ArticleStore,
    sources: Vec<SourceDescriptor>,
}

impl WatchPipeline {
    pub fn new(
        config: WatchConfig,
        registry: SourceRegistry,
        embedder: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        store: ArticleStore,
    ) -> Self {
        let mut filter = RelevanceFilter::new(embedder);
        if let Some(dir) = &config.keyword_cache_dir {
            filter = filter.with_cache_dir(dir);
        }

        Self {
            config,
            registry,
            filter,
            summarizer,
            store,
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceDescriptor>) -> Self {
        self.sources = sources;
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// Run the whole batch for `keywords` (the configured keywords when empty).
    ///
    /// Configuration and embedding failures abort the run and are returned as
    /// errors. A persistence failure returns a report in the `Aborted` stage
    /// that still carries the summaries, for [`WatchPipeline::retry_persist`].
    pub async fn run(&self, keywords: &[String]) -> Result<RunReport> {
        let mut report = RunReport::new();
        let span = info_span!("run", run_id = %report.run_id);

        async {
            match self.run_stages(keywords, &mut report).await {
                Ok(()) => {
                    info!(
                        "Run finished: {} merged, {} relevant, {} selected, {} inserted",
                        report.merged_count, report.filtered_count, report.selected_count, report.inserted
                    );
                    Ok(report)
                }
                Err(WatchError::Persistence(e)) => {
                    error!("Persisting failed, {} summaries kept for retry: {}", report.summaries.len(), e);
                    report.persist_error = Some(e.to_string());
                    report.advance(RunStage::Aborted);
                    Ok(report)
                }
                Err(e) => {
                    error!("Run aborted at {:?}: {}", report.stage, e);
                    report.advance(RunStage::Aborted);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, keywords: &[String], report: &mut RunReport) -> Result<()> {
        self.config.validate()?;

        let keywords: Vec<String> = if keywords.is_empty() {
            self.config.keywords.clone()
        } else {
            keywords.to_vec()
        };
        if keywords.is_empty() {
            return Err(WatchError::Configuration("No keywords to watch".to_string()));
        }

        let enabled = self.config.enabled_categories();
        let dispatcher = Dispatcher::new(&self.registry, self.config.fetcher_params())
            .with_max_age_days(self.config.max_days)
            .with_fetch_timeout(Duration::from_secs(self.config.fetch.timeout_seconds));
        dispatcher.preflight(&enabled)?;
        report.advance(RunStage::Dispatched);

        report.advance(RunStage::Fetching);
        let batch = dispatcher.dispatch(&enabled, &self.sources).await?;
        report.merged_count = batch.articles.len();
        report.outcomes = batch.outcomes;
        report.advance(RunStage::Merged);

        let filtered = self
            .filter
            .filter(batch.articles, &keywords, self.config.similarity_threshold)
            .await?;
        report.filtered_count = filtered.len();
        report.advance(RunStage::Filtered);

        let selection = select(&filtered, &self.config.selection_config());
        report.selected_count = selection.len();
        report.plan = Some(selection.plan.clone());
        report.advance(RunStage::Selected);

        if selection.is_empty() {
            warn!("Nothing selected, skipping summaries");
        }
        report.summaries = summarize_selection(self.summarizer.as_ref(), &selection.articles).await;
        report.advance(RunStage::Summarized);

        report.inserted = self.store.persist(&report.new_articles()).await?;
        report.advance(RunStage::Persisted);

        report.advance(RunStage::Completed);
        Ok(())
    }

    /// Persist the summaries of a run whose insert failed
    pub async fn retry_persist(&self, report: &mut RunReport) -> Result<usize> {
        info!("Retrying persistence for run {}", report.run_id);
        let inserted = self.store.persist(&report.new_articles()).await?;

        report.inserted = inserted;
        report.persist_error = None;
        report.advance(RunStage::Persisted);
        report.advance(RunStage::Completed);
        Ok(inserted)
    }
}
