use crate::traits::Summarizer;
use crate::types::{FilteredArticle, SummarizedArticle};
use crate::utils::text::smart_truncate;
use tracing::{info, warn};

/// Length of the fallback summary taken from the article body
pub const FALLBACK_SUMMARY_CHARS: usize = 400;

/// Summary used when the summarizer fails for one article
pub fn fallback_summary(article: &FilteredArticle) -> String {
    let body = article
        .article
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(article.article.title.as_str());
    smart_truncate(body.trim(), FALLBACK_SUMMARY_CHARS)
}

/// Summarize every selected article in order.
///
/// A failure on one article falls back to a truncated copy of its body.
pub async fn summarize_selection(
    summarizer: &dyn Summarizer,
    selection: &[FilteredArticle],
) -> Vec<SummarizedArticle> {
    let mut summarized = Vec::with_capacity(selection.len());
    let mut fallbacks = 0;

    for (i, article) in selection.iter().enumerate() {
        let title = &article.article.title;
        let content = article.article.summary.as_deref().unwrap_or("");

        info!("Summarizing {}/{}: {}", i + 1, selection.len(), title);
        let summary = match summarizer.summarize(title, content).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summary failed for {}: {}", article.article.link, e);
                fallbacks += 1;
                fallback_summary(article)
            }
        };

        summarized.push(SummarizedArticle {
            article: article.clone(),
            summary,
        });
    }

    info!(
        "Summarized {} articles with {} ({} fallbacks)",
        summarized.len(),
        summarizer.summarizer_name(),
        fallbacks
    );
    summarized
}
