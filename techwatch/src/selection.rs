use crate::config::SelectionConfig;
use crate::types::{FilteredArticle, SourceCategory};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Slot allocation computed for one selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaPlan {
    /// Guaranteed slots per enabled category, after the freshness adjustment
    pub quotas: BTreeMap<SourceCategory, usize>,
    /// Slots filled by cross-category weighted ranking
    pub flexible: usize,
    /// FEED share of the filtered set
    pub feed_ratio: f64,
    /// Slots moved from FEED to the flexible pool
    pub freshness_boost: usize,
}

impl QuotaPlan {
    pub fn quota(&self, category: SourceCategory) -> usize {
        self.quotas.get(&category).copied().unwrap_or(0)
    }

    pub fn guaranteed(&self) -> usize {
        self.quotas.values().sum()
    }
}

/// Bounded, source-balanced subset of the filtered articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Guaranteed picks in category order, then flexible picks by weighted score
    pub articles: Vec<FilteredArticle>,
    pub plan: QuotaPlan,
}

impl SelectionResult {
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn count_for(&self, category: SourceCategory) -> usize {
        self.articles.iter().filter(|a| a.category() == category).count()
    }
}

/// `ceil(n * weight / 100)` in integer arithmetic
pub fn base_quota(limit: usize, weight: u32) -> usize {
    (limit * weight as usize).div_ceil(100)
}

/// Compute quotas and the flexible pool for `filtered` under `config`
pub fn plan_quotas(filtered: &[FilteredArticle], config: &SelectionConfig) -> QuotaPlan {
    let mut quotas: BTreeMap<SourceCategory, usize> = config
        .weights
        .iter()
        .map(|(category, weight)| (*category, base_quota(config.limit, *weight)))
        .collect();

    let guaranteed: usize = quotas.values().sum();
    let mut flexible = config.limit.saturating_sub(guaranteed);

    let feed_count = filtered
        .iter()
        .filter(|a| a.category() == SourceCategory::Feed)
        .count();
    let feed_ratio = feed_count as f64 / filtered.len().max(1) as f64;

    let mut freshness_boost = 0;
    if feed_ratio < config.freshness_threshold {
        if let Some(feed_quota) = quotas.get_mut(&SourceCategory::Feed) {
            freshness_boost = *feed_quota / 3;
            *feed_quota -= freshness_boost;
            flexible += freshness_boost;
            debug!(
                "Feed ratio {:.2} below {}, moving {} slots to the flexible pool",
                feed_ratio, config.freshness_threshold, freshness_boost
            );
        }
    }

    QuotaPlan {
        quotas,
        flexible,
        feed_ratio,
        freshness_boost,
    }
}

/// Pick at most `config.limit` articles, balanced across categories.
///
/// Each enabled category first gets its quota, taken in fetch order. The
/// remaining slots go to the leftovers with the best `score * multiplier`.
pub fn select(filtered: &[FilteredArticle], config: &SelectionConfig) -> SelectionResult {
    let plan = plan_quotas(filtered, config);

    let mut result: Vec<FilteredArticle> = Vec::new();
    let mut leftovers: Vec<(f64, &FilteredArticle)> = Vec::new();

    for (category, quota) in &plan.quotas {
        let mut in_category = filtered.iter().filter(|a| a.category() == *category);

        let picked: Vec<&FilteredArticle> = in_category.by_ref().take(*quota).collect();
        debug!("{}: {} of {} guaranteed slots used", category, picked.len(), quota);
        result.extend(picked.into_iter().cloned());

        let multiplier = config.multiplier(*category);
        leftovers.extend(in_category.map(|a| (a.score * multiplier, a)));
    }

    // stable sort keeps category then fetch order among equal weights
    leftovers.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    result.extend(
        leftovers
            .into_iter()
            .take(plan.flexible)
            .map(|(_, article)| article.clone()),
    );

    result.truncate(config.limit);

    info!(
        "Selected {} of {} articles (guaranteed {}, flexible {})",
        result.len(),
        filtered.len(),
        plan.guaranteed(),
        plan.flexible
    );

    SelectionResult {
        articles: result,
        plan,
    }
}
