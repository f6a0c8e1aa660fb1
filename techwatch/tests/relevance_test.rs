mod common;

use common::{article, init_tracing, StubEmbedder};
use std::sync::Arc;
use techwatch::relevance::{cosine_similarity, dot, normalize};
use techwatch::{KeywordIndex, RelevanceFilter, Result, SourceCategory, WatchError};
use tracing::info;
use uuid::Uuid;

fn keywords(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

/// Against `rust` = [1, 0]: "exact" scores 0.6, "high" 0.8, "just below" under 0.6
fn boundary_embedder() -> StubEmbedder {
    StubEmbedder::new(&[
        ("rust", vec![1.0, 0.0]),
        ("exact", vec![3.0, 4.0]),
        ("high", vec![4.0, 3.0]),
        ("just below", vec![3.0, 4.01]),
    ])
}

#[test]
fn test_cosine_similarity() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
    assert_eq!(normalize(&[3.0, 4.0]), vec![0.6, 0.8]);
}

#[test]
fn test_dot_rejects_mismatched_dimensions() -> Result<()> {
    assert_eq!(dot(&[0.6, 0.8], &[1.0, 0.0])?, 0.6);
    assert!(matches!(
        dot(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
        Err(WatchError::Embedding(_))
    ));

    let index = KeywordIndex {
        key: KeywordIndex::key_for("stub", &keywords(&["rust"])),
        provider: "stub".to_string(),
        keywords: keywords(&["rust"]),
        vectors: vec![vec![1.0, 0.0]],
    };
    assert!(matches!(
        index.score(&[0.0, 0.0, 1.0], 0.5),
        Err(WatchError::Embedding(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_threshold_is_inclusive() -> Result<()> {
    init_tracing();

    let filter = RelevanceFilter::new(Arc::new(boundary_embedder()));
    let articles = vec![
        article("exact", SourceCategory::Feed),
        article("just below", SourceCategory::Feed),
        article("high", SourceCategory::Forum),
    ];

    let kept = filter.filter(articles, &keywords(&["rust"]), 0.6).await?;
    info!("Kept {} articles", kept.len());

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].article.title, "exact");
    assert_eq!(kept[0].score, 0.6);
    assert_eq!(kept[0].article.score, Some(0.6));
    assert_eq!(kept[0].matched_keywords, vec!["rust".to_string()]);
    assert_eq!(kept[1].article.title, "high");
    assert_eq!(kept[1].score, 0.8);

    Ok(())
}

#[tokio::test]
async fn test_score_is_best_keyword_and_matches_are_per_keyword() -> Result<()> {
    let embedder = StubEmbedder::new(&[
        ("rust", vec![1.0, 0.0]),
        ("wasm", vec![0.0, 1.0]),
        ("toolchain news", vec![3.0, 4.0]),
        ("unrelated", vec![4.0, 3.0]),
    ]);
    let filter = RelevanceFilter::new(Arc::new(embedder));
    let articles = vec![
        article("toolchain news", SourceCategory::Feed),
        article("unrelated", SourceCategory::Feed),
    ];

    // similarities: toolchain news 0.6 / 0.8, unrelated 0.8 / 0.6
    let kept = filter.filter(articles, &keywords(&["rust", "wasm"]), 0.7).await?;

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.8);
    assert_eq!(kept[0].matched_keywords, vec!["wasm".to_string()]);
    assert_eq!(kept[1].matched_keywords, vec!["rust".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_articles_without_text_are_skipped() -> Result<()> {
    let embedder = Arc::new(boundary_embedder());
    let filter = RelevanceFilter::new(embedder.clone());

    let mut blank = article("  ", SourceCategory::Social);
    blank.summary = Some("   ".to_string());
    let articles = vec![blank, article("high", SourceCategory::Feed)];

    let kept = filter.filter(articles, &keywords(&["rust"]), 0.5).await?;

    assert_eq!(kept.len(), 1);
    // one keyword plus one scorable article
    assert_eq!(embedder.texts_embedded.load(std::sync::atomic::Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_no_keywords_keeps_nothing() -> Result<()> {
    let embedder = Arc::new(boundary_embedder());
    let filter = RelevanceFilter::new(embedder.clone());

    let kept = filter
        .filter(vec![article("high", SourceCategory::Feed)], &[], 0.1)
        .await?;

    assert!(kept.is_empty());
    assert_eq!(embedder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_embedding_failure_is_fatal() -> Result<()> {
    let filter = RelevanceFilter::new(Arc::new(StubEmbedder::failing()));

    let result = filter
        .filter(vec![article("high", SourceCategory::Feed)], &keywords(&["rust"]), 0.5)
        .await;

    match result {
        Err(e @ WatchError::Embedding(_)) => assert!(e.is_fatal()),
        other => panic!("expected an embedding error, got {:?}", other.map(|v| v.len())),
    }
    Ok(())
}

#[tokio::test]
async fn test_keyword_index_is_reused_in_memory() -> Result<()> {
    let embedder = Arc::new(boundary_embedder());
    let filter = RelevanceFilter::new(embedder.clone());
    let kw = keywords(&["rust"]);

    let first = filter.filter(vec![article("high", SourceCategory::Feed)], &kw, 0.5).await?;
    let second = filter.filter(vec![article("high", SourceCategory::Feed)], &kw, 0.5).await?;

    assert_eq!(first, second);
    // keywords once, articles twice
    assert_eq!(embedder.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn test_disk_cache_gives_same_result_as_cold_run() -> Result<()> {
    init_tracing();

    let dir = std::env::temp_dir().join(format!("techwatch-kw-{}", Uuid::new_v4()));
    let kw = keywords(&["rust"]);
    let articles = vec![
        article("exact", SourceCategory::Feed),
        article("high", SourceCategory::Forum),
        article("just below", SourceCategory::Social),
    ];

    let cold_embedder = Arc::new(boundary_embedder());
    let cold = RelevanceFilter::new(cold_embedder.clone()).with_cache_dir(&dir);
    let cold_result = cold.filter(articles.clone(), &kw, 0.6).await?;
    assert_eq!(cold_embedder.calls(), 2);

    let cache_file = dir.join(format!("{}.json", KeywordIndex::key_for("stub", &kw)));
    assert!(cache_file.exists());

    let warm_embedder = Arc::new(boundary_embedder());
    let warm = RelevanceFilter::new(warm_embedder.clone()).with_cache_dir(&dir);
    let warm_result = warm.filter(articles, &kw, 0.6).await?;

    assert_eq!(warm_embedder.calls(), 1);
    assert_eq!(cold_result, warm_result);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
async fn test_stale_cache_file_is_rebuilt() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("techwatch-kw-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;

    let kw = keywords(&["rust"]);
    let stale = KeywordIndex {
        key: KeywordIndex::key_for("stub", &kw),
        provider: "stub".to_string(),
        keywords: keywords(&["python"]),
        vectors: vec![vec![0.0, 1.0]],
    };
    let cache_file = dir.join(format!("{}.json", stale.key));
    std::fs::write(&cache_file, serde_json::to_string(&stale)?)?;

    let embedder = Arc::new(boundary_embedder());
    let filter = RelevanceFilter::new(embedder.clone()).with_cache_dir(&dir);
    let kept = filter.filter(vec![article("high", SourceCategory::Feed)], &kw, 0.6).await?;

    assert_eq!(kept.len(), 1);
    assert_eq!(embedder.calls(), 2);

    let rebuilt: KeywordIndex = serde_json::from_str(&std::fs::read_to_string(&cache_file)?)?;
    assert_eq!(rebuilt.keywords, kw);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
async fn test_cache_written_by_another_model_is_not_reused() -> Result<()> {
    init_tracing();

    let dir = std::env::temp_dir().join(format!("techwatch-kw-{}", Uuid::new_v4()));
    let kw = keywords(&["rust"]);
    let articles = vec![article("borrow checker", SourceCategory::Feed)];

    let model_a = StubEmbedder::new(&[
        ("rust", vec![1.0, 0.0]),
        ("borrow checker", vec![1.0, 0.0]),
    ])
    .named("model-a");
    let first = RelevanceFilter::new(Arc::new(model_a)).with_cache_dir(&dir);
    assert_eq!(first.filter(articles.clone(), &kw, 0.5).await?.len(), 1);

    // under model b the keyword and the article are orthogonal
    let model_b = || {
        StubEmbedder::new(&[
            ("rust", vec![1.0, 0.0, 0.0]),
            ("borrow checker", vec![0.0, 1.0, 0.0]),
        ])
        .named("model-b")
    };

    let cold = RelevanceFilter::new(Arc::new(model_b()));
    let cold_result = cold.filter(articles.clone(), &kw, 0.5).await?;

    let warm_embedder = Arc::new(model_b());
    let warm = RelevanceFilter::new(warm_embedder.clone()).with_cache_dir(&dir);
    let warm_result = warm.filter(articles, &kw, 0.5).await?;

    assert!(cold_result.is_empty());
    assert_eq!(warm_result, cold_result);
    // model a's keyword vectors were not picked up
    assert_eq!(warm_embedder.calls(), 2);
    assert!(dir.join(format!("{}.json", KeywordIndex::key_for("model-b", &kw))).exists());
    assert_ne!(
        KeywordIndex::key_for("model-a", &kw),
        KeywordIndex::key_for("model-b", &kw)
    );

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
async fn test_cached_index_of_other_dimension_is_rebuilt() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("techwatch-kw-{}", Uuid::new_v4()));
    let kw = keywords(&["rust"]);
    let articles = vec![article("borrow checker", SourceCategory::Feed)];

    // same provider name, but the model behind it now has three dimensions
    let old = RelevanceFilter::new(Arc::new(boundary_embedder())).with_cache_dir(&dir);
    old.keyword_index(&kw).await?;

    let embedder = Arc::new(StubEmbedder::new(&[
        ("rust", vec![1.0, 0.0, 0.0]),
        ("borrow checker", vec![0.0, 1.0, 0.0]),
    ]));
    let filter = RelevanceFilter::new(embedder.clone()).with_cache_dir(&dir);
    let kept = filter.filter(articles, &kw, 0.5).await?;

    assert!(kept.is_empty());
    // articles once, then the keywords again
    assert_eq!(embedder.calls(), 2);

    let cache_file = dir.join(format!("{}.json", KeywordIndex::key_for("stub", &kw)));
    let rebuilt: KeywordIndex = serde_json::from_str(&std::fs::read_to_string(&cache_file)?)?;
    assert_eq!(rebuilt.dimension(), 3);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
async fn test_inconsistent_embedder_dimensions_are_an_embedding_error() -> Result<()> {
    let embedder = StubEmbedder::new(&[
        ("rust", vec![1.0, 0.0]),
        ("borrow checker", vec![1.0, 0.0, 0.0]),
    ]);
    let filter = RelevanceFilter::new(Arc::new(embedder));

    let result = filter
        .filter(vec![article("borrow checker", SourceCategory::Feed)], &keywords(&["rust"]), 0.5)
        .await;

    assert!(matches!(result, Err(WatchError::Embedding(_))));
    Ok(())
}
