pub mod types;
pub mod traits;
pub mod config;
pub mod utils;
pub mod fetchers;
pub mod registry;
pub mod sources;
pub mod dispatcher;
pub mod relevance;
pub mod selection;
pub mod llm;
pub mod summarizer;
pub mod store;
pub mod pipeline;

pub use types::*;
pub use traits::{EmbeddingProvider, Fetcher, Summarizer};
pub use config::{LlmConfig, SelectionConfig, WatchConfig};
pub use registry::{FetcherParams, SourceRegistry};
pub use dispatcher::{CategoryOutcome, Dispatcher, FetchStatus, MergedBatch};
pub use relevance::{KeywordIndex, RelevanceFilter};
pub use selection::{select, QuotaPlan, SelectionResult};
pub use llm::OpenAiCompatClient;
pub use store::ArticleStore;
pub use pipeline::{RunReport, RunStage, WatchPipeline};
