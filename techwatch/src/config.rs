use crate::registry::FetcherParams;
use crate::types::{FetchConfig, Result, SourceCategory, WatchError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Parameters of the quota-based selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    /// Target count N
    pub limit: usize,
    /// Weight percentage per enabled category
    pub weights: BTreeMap<SourceCategory, u32>,
    /// FEED share of the filtered set below which the FEED quota is reduced
    pub freshness_threshold: f64,
    /// Score multipliers applied during the flexible fill
    pub multipliers: BTreeMap<SourceCategory, f64>,
}

impl SelectionConfig {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            weights: BTreeMap::new(),
            freshness_threshold: 0.3,
            multipliers: default_multipliers(),
        }
    }

    pub fn with_weight(mut self, category: SourceCategory, weight: u32) -> Self {
        self.weights.insert(category, weight);
        self
    }

    pub fn with_freshness_threshold(mut self, threshold: f64) -> Self {
        self.freshness_threshold = threshold;
        self
    }

    pub fn with_multiplier(mut self, category: SourceCategory, multiplier: f64) -> Self {
        self.multipliers.insert(category, multiplier);
        self
    }

    pub fn multiplier(&self, category: SourceCategory) -> f64 {
        self.multipliers.get(&category).copied().unwrap_or(1.0)
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self::new(15)
            .with_weight(SourceCategory::Feed, 50)
            .with_weight(SourceCategory::Forum, 30)
            .with_weight(SourceCategory::Social, 20)
    }
}

fn default_multipliers() -> BTreeMap<SourceCategory, f64> {
    BTreeMap::from([
        (SourceCategory::Feed, 1.5),
        (SourceCategory::Forum, 1.0),
        (SourceCategory::Social, 1.2),
        (SourceCategory::Web, 1.0),
    ])
}

/// Enable flag and weight of one source category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategorySettings {
    pub enabled: bool,
    pub weight: u32,
}

/// Connection settings for the OpenAI-compatible LLM endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "mistral".to_string(),
            embedding_model: "all-minilm".to_string(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub database_url: String,
    pub categories: BTreeMap<SourceCategory, CategorySettings>,
    pub freshness_threshold: f64,
    pub limit: usize,
    /// Similarity threshold τ
    pub similarity_threshold: f64,
    pub max_days: u32,
    pub keywords: Vec<String>,
    pub opml_file: Option<PathBuf>,
    pub sources_file: Option<PathBuf>,
    pub keyword_cache_dir: Option<PathBuf>,
    pub llm: LlmConfig,
    pub fetch: FetchConfig,
    pub forum_max_fetch: usize,
    pub social_max_fetch: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://techwatch.db".to_string(),
            categories: BTreeMap::from([
                (SourceCategory::Feed, CategorySettings { enabled: true, weight: 50 }),
                (SourceCategory::Forum, CategorySettings { enabled: false, weight: 30 }),
                (SourceCategory::Social, CategorySettings { enabled: false, weight: 20 }),
                (SourceCategory::Web, CategorySettings { enabled: false, weight: 0 }),
            ]),
            freshness_threshold: 0.3,
            limit: 15,
            similarity_threshold: 0.5,
            max_days: 10,
            keywords: Vec::new(),
            opml_file: None,
            sources_file: None,
            keyword_cache_dir: None,
            llm: LlmConfig::default(),
            fetch: FetchConfig::default(),
            forum_max_fetch: 10,
            social_max_fetch: 10,
        }
    }
}

impl WatchConfig {
    /// Load from the process environment, after reading `.env` if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup; unset variables keep their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| -> Option<String> { lookup(key).filter(|v| !v.trim().is_empty()) };

        let mut categories = BTreeMap::new();
        for (category, prefix) in [
            (SourceCategory::Feed, "FEED"),
            (SourceCategory::Forum, "FORUM"),
            (SourceCategory::Social, "SOCIAL"),
            (SourceCategory::Web, "WEB"),
        ] {
            let default = defaults.categories[&category];
            categories.insert(
                category,
                CategorySettings {
                    enabled: env_value(&parse, &format!("{}_FETCH", prefix), default.enabled)?,
                    weight: env_value(&parse, &format!("{}_WEIGHT", prefix), default.weight)?,
                },
            );
        }

        let fetch = FetchConfig {
            timeout_seconds: env_value(&parse, "FETCH_TIMEOUT_SECONDS", defaults.fetch.timeout_seconds)?,
            max_retries: env_value(&parse, "FETCH_MAX_RETRIES", defaults.fetch.max_retries)?,
            ..defaults.fetch.clone()
        };

        let llm = LlmConfig {
            base_url: parse("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            api_key: parse("LLM_API_KEY"),
            model: parse("LLM_MODEL").unwrap_or(defaults.llm.model),
            embedding_model: parse("EMBEDDING_MODEL").unwrap_or(defaults.llm.embedding_model),
            temperature: env_value(&parse, "LLM_TEMPERATURE", defaults.llm.temperature)?,
        };

        let config = Self {
            database_url: parse("DATABASE_URL").unwrap_or(defaults.database_url),
            categories,
            freshness_threshold: env_value(&parse, "FRESHNESS_BOOST_THRESHOLD", defaults.freshness_threshold)?,
            limit: env_value(&parse, "LIMIT_ARTICLES_TO_RESUME", defaults.limit)?,
            similarity_threshold: env_value(&parse, "THRESHOLD_SEMANTIC_SEARCH", defaults.similarity_threshold)?,
            max_days: env_value(&parse, "MAX_DAYS", defaults.max_days)?,
            keywords: parse("KEYWORDS").map(|v| split_keywords(&v)).unwrap_or_default(),
            opml_file: parse("OPML_FILE").map(PathBuf::from),
            sources_file: parse("SOURCES_FILE").map(PathBuf::from),
            keyword_cache_dir: parse("KEYWORD_CACHE_DIR").map(PathBuf::from),
            llm,
            fetch,
            forum_max_fetch: env_value(&parse, "FORUM_MAX_FETCH", defaults.forum_max_fetch)?,
            social_max_fetch: env_value(&parse, "SOCIAL_MAX_FETCH", defaults.social_max_fetch)?,
        };

        config.log_summary();
        Ok(config)
    }

    /// Enabled categories in declaration order
    pub fn enabled_categories(&self) -> Vec<SourceCategory> {
        self.categories
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(category, _)| *category)
            .collect()
    }

    pub fn set_enabled(&mut self, category: SourceCategory, enabled: bool) {
        let settings = self
            .categories
            .entry(category)
            .or_insert(CategorySettings { enabled, weight: 0 });
        settings.enabled = enabled;
    }

    /// Selection parameters restricted to the enabled categories
    pub fn selection_config(&self) -> SelectionConfig {
        let mut selection = SelectionConfig::new(self.limit).with_freshness_threshold(self.freshness_threshold);
        for (category, settings) in &self.categories {
            if settings.enabled {
                selection = selection.with_weight(*category, settings.weight);
            }
        }
        selection
    }

    pub fn fetcher_params(&self) -> FetcherParams {
        FetcherParams {
            fetch: self.fetch.clone(),
            forum_max_items: self.forum_max_fetch,
            social_max_items: self.social_max_fetch,
        }
    }

    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        if self.enabled_categories().is_empty() {
            return Err(WatchError::Configuration(
                "No source category enabled".to_string(),
            ));
        }

        let total_weight: u32 = self
            .categories
            .values()
            .filter(|settings| settings.enabled)
            .map(|settings| settings.weight)
            .sum();
        if total_weight > 100 {
            return Err(WatchError::Configuration(format!(
                "Weights of enabled categories sum to {}%, above 100%",
                total_weight
            )));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(WatchError::Configuration(format!(
                "Similarity threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.freshness_threshold) {
            return Err(WatchError::Configuration(format!(
                "Freshness threshold {} outside [0, 1]",
                self.freshness_threshold
            )));
        }

        Ok(())
    }

    fn log_summary(&self) {
        info!("Config loaded:");
        info!("  DATABASE_URL: {}", self.database_url);
        for (category, settings) in &self.categories {
            info!("  {}: enabled={} weight={}%", category, settings.enabled, settings.weight);
        }
        info!("  LIMIT_ARTICLES_TO_RESUME: {}", self.limit);
        info!("  THRESHOLD_SEMANTIC_SEARCH: {}", self.similarity_threshold);
        info!("  LLM: {} ({})", self.llm.model, self.llm.base_url);
    }
}

fn env_value<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|e| WatchError::Configuration(format!("Invalid {}={}: {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Split a comma-separated keyword list, dropping blanks
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}
