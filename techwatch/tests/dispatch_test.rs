mod common;

use common::{article, init_tracing, StubBehavior, StubFetcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use techwatch::{
    Dispatcher, FetchStatus, Fetcher, FetcherParams, Result, SourceCategory, SourceDescriptor,
    SourceRegistry, WatchConfig, WatchError,
};
use tracing::info;

use SourceCategory::{Feed, Forum, Social, Web};

/// Registry whose fetchers follow `behaviors`, counting constructor calls
fn stub_registry(
    categories: &[SourceCategory],
    behaviors: &HashMap<String, StubBehavior>,
    built: &Arc<AtomicUsize>,
) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for category in categories {
        let category = *category;
        let behaviors = behaviors.clone();
        let built = built.clone();
        registry.register(category, move |_params: &FetcherParams| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubFetcher::new(category, behaviors.clone())) as Box<dyn Fetcher>)
        });
    }
    registry
}

fn source(category: SourceCategory, url: &str) -> SourceDescriptor {
    SourceDescriptor::new(category, url)
}

#[tokio::test]
async fn test_nothing_enabled_is_a_configuration_error() -> Result<()> {
    init_tracing();

    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Forum, Social], &HashMap::new(), &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let result = dispatcher.dispatch(&[], &[source(Feed, "https://a.example/rss")]).await;

    match result {
        Err(e @ WatchError::Configuration(_)) => assert!(e.is_fatal()),
        other => panic!("expected a configuration error, got {:?}", other.map(|b| b.articles.len())),
    }
    assert_eq!(built.load(Ordering::SeqCst), 0);

    let mut config = WatchConfig::default();
    for category in SourceCategory::ALL {
        config.set_enabled(category, false);
    }
    assert!(matches!(config.validate(), Err(WatchError::Configuration(_))));

    Ok(())
}

#[tokio::test]
async fn test_unregistered_category_stops_before_any_fetch() -> Result<()> {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Forum], &HashMap::new(), &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let result = dispatcher
        .dispatch(&[Feed, Web], &[source(Web, "https://blog.example")])
        .await;

    assert!(matches!(result, Err(WatchError::Configuration(_))));
    assert_eq!(built.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_buckets_merge_in_declaration_order() -> Result<()> {
    init_tracing();

    let mut behaviors = HashMap::new();
    behaviors.insert(
        "https://forum.example/r/rust".to_string(),
        StubBehavior::Articles(vec![article("forum post", Forum)]),
    );
    behaviors.insert(
        "https://a.example/rss".to_string(),
        StubBehavior::Articles(vec![article("feed one", Feed), article("feed two", Feed)]),
    );
    behaviors.insert(
        "@dev.social.example".to_string(),
        // fetchers that mislabel their output are re-tagged with the task's category
        StubBehavior::Articles(vec![article("skeet", Feed)]),
    );

    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Forum, Social], &behaviors, &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let sources = vec![
        source(Social, "@dev.social.example"),
        source(Forum, "https://forum.example/r/rust"),
        source(Feed, "https://a.example/rss"),
    ];
    // enabled order does not matter, duplicates are ignored
    let batch = dispatcher.dispatch(&[Social, Feed, Forum, Feed], &sources).await?;

    let titles: Vec<&str> = batch.articles.iter().map(|a| a.title.as_str()).collect();
    info!("Merged: {:?}", titles);

    assert_eq!(titles, vec!["feed one", "feed two", "forum post", "skeet"]);
    assert_eq!(batch.count_for(Social), 1);
    assert_eq!(built.load(Ordering::SeqCst), 3);

    let categories: Vec<SourceCategory> = batch.outcomes.iter().map(|o| o.category).collect();
    assert_eq!(categories, vec![Feed, Forum, Social]);
    assert!(batch.outcomes.iter().all(|o| o.status == FetchStatus::Done));

    Ok(())
}

#[tokio::test]
async fn test_failing_category_does_not_affect_the_others() -> Result<()> {
    init_tracing();

    let mut behaviors = HashMap::new();
    behaviors.insert(
        "https://a.example/rss".to_string(),
        StubBehavior::Articles(vec![article("feed one", Feed)]),
    );
    behaviors.insert(
        "https://forum.example/r/rust".to_string(),
        StubBehavior::Fail("HTTP 503".to_string()),
    );

    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Forum], &behaviors, &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let sources = vec![
        source(Feed, "https://a.example/rss"),
        source(Forum, "https://forum.example/r/rust"),
    ];
    let batch = dispatcher.dispatch(&[Feed, Forum], &sources).await?;

    assert_eq!(batch.articles.len(), 1);
    assert_eq!(batch.outcome(Feed).map(|o| o.status), Some(FetchStatus::Done));

    let forum = batch.outcome(Forum).ok_or_else(|| WatchError::Parse("no forum outcome".into()))?;
    assert_eq!(forum.status, FetchStatus::Failed);
    assert_eq!(forum.article_count, 0);
    assert!(forum.errors[0].contains("HTTP 503"));

    Ok(())
}

#[tokio::test]
async fn test_one_bad_source_leaves_the_category_done() -> Result<()> {
    let mut behaviors = HashMap::new();
    behaviors.insert(
        "https://a.example/rss".to_string(),
        StubBehavior::Fail("invalid XML".to_string()),
    );
    behaviors.insert(
        "https://b.example/rss".to_string(),
        StubBehavior::Articles(vec![article("feed b", Feed)]),
    );

    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed], &behaviors, &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let sources = vec![
        source(Feed, "https://a.example/rss"),
        source(Feed, "https://b.example/rss"),
    ];
    let batch = dispatcher.dispatch(&[Feed], &sources).await?;

    let feed = &batch.outcomes[0];
    assert_eq!(feed.status, FetchStatus::Done);
    assert_eq!(feed.article_count, 1);
    assert_eq!(feed.errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_hanging_source_times_out() -> Result<()> {
    init_tracing();

    let mut behaviors = HashMap::new();
    behaviors.insert("@slow.example".to_string(), StubBehavior::Hang);
    behaviors.insert(
        "https://a.example/rss".to_string(),
        StubBehavior::Articles(vec![article("feed one", Feed)]),
    );

    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Social], &behaviors, &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default())
        .with_fetch_timeout(Duration::from_millis(50));

    let sources = vec![
        source(Feed, "https://a.example/rss"),
        source(Social, "@slow.example"),
    ];
    let batch = dispatcher.dispatch(&[Feed, Social], &sources).await?;

    assert_eq!(batch.articles.len(), 1);
    let social = &batch.outcomes[1];
    assert_eq!(social.category, Social);
    assert_eq!(social.status, FetchStatus::Failed);
    assert!(social.errors[0].contains("timed out"));

    Ok(())
}

#[tokio::test]
async fn test_category_without_sources_is_done_and_empty() -> Result<()> {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = stub_registry(&[Feed, Forum], &HashMap::new(), &built);
    let dispatcher = Dispatcher::new(&registry, FetcherParams::default());

    let batch = dispatcher.dispatch(&[Feed, Forum], &[]).await?;

    assert!(batch.articles.is_empty());
    assert_eq!(batch.outcomes.len(), 2);
    assert!(batch.outcomes.iter().all(|o| o.status == FetchStatus::Done));
    Ok(())
}

#[test]
fn test_default_registry_covers_every_category() -> Result<()> {
    let registry = SourceRegistry::with_defaults();

    assert_eq!(registry.categories(), SourceCategory::ALL.to_vec());

    let web = registry.create(Web, &FetcherParams::default())?;
    assert_eq!(web.category(), Web);
    assert_eq!(web.fetcher_name(), "web");
    Ok(())
}
