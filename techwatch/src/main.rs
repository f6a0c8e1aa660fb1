use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use techwatch::config::split_keywords;
use techwatch::sources::{filter_by_keywords, load_opml, load_sources_file};
use techwatch::{
    ArticleStore, OpenAiCompatClient, RunStage, SourceCategory, SourceDescriptor, SourceRegistry,
    WatchConfig, WatchPipeline,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "techwatch", about = "Keyword-driven technology watch over feeds, forums, social accounts and web pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, filter, select, summarize and store one batch
    Run {
        /// Comma-separated keywords, overriding KEYWORDS
        #[arg(long)]
        keywords: Option<String>,
        /// Number of articles to select, overriding LIMIT_ARTICLES_TO_RESUME
        #[arg(long)]
        limit: Option<usize>,
        /// Similarity threshold, overriding THRESHOLD_SEMANTIC_SEARCH
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Full-text search over stored articles
    Search {
        query: String,
        /// Earliest published date (inclusive)
        #[arg(long)]
        from: Option<String>,
        /// Latest published date (inclusive)
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List stored articles, newest first
    List {
        /// Only articles whose published date contains this string
        #[arg(long)]
        date: Option<String>,
    },
    /// Show the configured sources
    Sources {
        /// Comma-separated terms; only sources whose name or url mention one are shown
        #[arg(long)]
        filter: Option<String>,
    },
    /// Create the database schema
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("techwatch=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = WatchConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run {
            keywords,
            limit,
            threshold,
        } => {
            if let Some(limit) = limit {
                config.limit = limit;
            }
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            let keywords = keywords.map(|k| split_keywords(&k)).unwrap_or_default();
            run(config, keywords).await
        }
        Command::Search {
            query,
            from,
            to,
            limit,
        } => {
            let store = ArticleStore::connect(&config.database_url).await?;
            let hits = store
                .search(&query, from.as_deref(), to.as_deref(), limit)
                .await?;

            if hits.is_empty() {
                println!("No match for '{}'", query);
            }
            for hit in hits {
                println!(
                    "[{:>5.1}] {} ({}, {})\n        {}\n        {}",
                    hit.relevance,
                    hit.title_highlight,
                    hit.article.source,
                    hit.article.published,
                    hit.snippet,
                    hit.article.link
                );
            }
            Ok(())
        }
        Command::List { date } => {
            let store = ArticleStore::connect(&config.database_url).await?;
            for article in store.list_by_date(date.as_deref()).await? {
                println!(
                    "{}  [{}] {:.2}  {}\n    {}",
                    article.published, article.source, article.score, article.title, article.link
                );
            }
            Ok(())
        }
        Command::Sources { filter } => {
            let mut sources = load_sources(&config)?;
            if let Some(filter) = filter {
                sources = filter_by_keywords(sources, &split_keywords(&filter));
            }
            for source in &sources {
                println!("{:<7} {}  {}", source.category, source.label(), source.url);
            }
            info!("{} sources", sources.len());
            Ok(())
        }
        Command::InitDb => {
            let store = ArticleStore::connect(&config.database_url).await?;
            info!("Database ready, {} articles stored", store.count().await?);
            Ok(())
        }
    }
}

fn load_sources(config: &WatchConfig) -> Result<Vec<SourceDescriptor>> {
    let mut sources = Vec::new();
    if config.enabled_categories().contains(&SourceCategory::Feed) {
        match &config.opml_file {
            Some(path) => sources.extend(load_opml(path)),
            None => warn!("FEED enabled but OPML_FILE not set"),
        }
    }
    if let Some(path) = &config.sources_file {
        sources.extend(
            load_sources_file(path)
                .with_context(|| format!("Failed to read sources file {}", path.display()))?,
        );
    }
    Ok(sources)
}

async fn run(config: WatchConfig, keywords: Vec<String>) -> Result<()> {
    let sources = load_sources(&config)?;

    let client = Arc::new(OpenAiCompatClient::new(config.llm.clone())?);
    let store = ArticleStore::connect(&config.database_url).await?;

    let pipeline = WatchPipeline::new(
        config,
        SourceRegistry::with_defaults(),
        client.clone(),
        client,
        store,
    )
    .with_sources(sources);

    let mut report = pipeline.run(&keywords).await?;

    if report.stage == RunStage::Aborted {
        warn!("Persistence failed, retrying once");
        if let Err(e) = pipeline.retry_persist(&mut report).await {
            error!("Retry failed: {}", e);
            anyhow::bail!("Run {} could not be persisted: {}", report.run_id, e);
        }
    }

    for summarized in &report.summaries {
        let article = &summarized.article.article;
        println!(
            "## {} [{} | {:.2}]\n{}\n{}\n",
            article.title, article.category, summarized.article.score, summarized.summary, article.link
        );
    }
    info!("Run {} completed, {} new articles stored", report.run_id, report.inserted);
    Ok(())
}
