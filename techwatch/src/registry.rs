use crate::fetchers::{FeedFetcher, ForumFetcher, SocialFetcher, WebFetcher};
use crate::traits::Fetcher;
use crate::types::{FetchConfig, Result, SourceCategory, WatchError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings handed to every fetcher constructor
#[derive(Debug, Clone)]
pub struct FetcherParams {
    pub fetch: FetchConfig,
    /// Posts requested per forum source
    pub forum_max_items: usize,
    /// Posts requested per social account
    pub social_max_items: usize,
}

impl Default for FetcherParams {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            forum_max_items: 10,
            social_max_items: 10,
        }
    }
}

pub type FetcherConstructor =
    Arc<dyn Fn(&FetcherParams) -> Result<Box<dyn Fetcher>> + Send + Sync>;

/// Maps a source category to the constructor of its fetcher.
///
/// Built once at startup and passed by reference to the dispatcher, so tests
/// can register their own fetchers without touching process-wide state.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    constructors: HashMap<SourceCategory, FetcherConstructor>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with a built-in fetcher for every category
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(SourceCategory::Feed, |params: &FetcherParams| {
            Ok(Box::new(FeedFetcher::new(params.fetch.clone())?) as Box<dyn Fetcher>)
        });
        registry.register(SourceCategory::Forum, |params: &FetcherParams| {
            Ok(Box::new(ForumFetcher::new(params.fetch.clone(), params.forum_max_items)?) as Box<dyn Fetcher>)
        });
        registry.register(SourceCategory::Social, |params: &FetcherParams| {
            Ok(Box::new(SocialFetcher::new(params.fetch.clone(), params.social_max_items)?) as Box<dyn Fetcher>)
        });
        registry.register(SourceCategory::Web, |params: &FetcherParams| {
            Ok(Box::new(WebFetcher::new(params.fetch.clone())?) as Box<dyn Fetcher>)
        });

        registry
    }

    /// Register (or replace) the constructor for a category
    pub fn register<F>(&mut self, category: SourceCategory, constructor: F)
    where
        F: Fn(&FetcherParams) -> Result<Box<dyn Fetcher>> + Send + Sync + 'static,
    {
        if self.constructors.insert(category, Arc::new(constructor)).is_some() {
            info!("Replaced fetcher registration for {}", category);
        } else {
            debug!("Registered fetcher for {}", category);
        }
    }

    pub fn is_registered(&self, category: SourceCategory) -> bool {
        self.constructors.contains_key(&category)
    }

    /// Build a fetcher for `category`
    pub fn create(&self, category: SourceCategory, params: &FetcherParams) -> Result<Box<dyn Fetcher>> {
        let constructor = self.constructors.get(&category).ok_or_else(|| {
            WatchError::Configuration(format!("No fetcher registered for {}", category))
        })?;

        let fetcher = constructor(params)?;
        debug!("Created fetcher {} for {}", fetcher.fetcher_name(), category);
        Ok(fetcher)
    }

    /// Registered categories in declaration order
    pub fn categories(&self) -> Vec<SourceCategory> {
        SourceCategory::ALL
            .iter()
            .copied()
            .filter(|category| self.constructors.contains_key(category))
            .collect()
    }
}
