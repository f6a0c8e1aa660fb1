use crate::traits::EmbeddingProvider;
use crate::types::{Article, FilteredArticle, Result, WatchError};
use crate::utils::hash::sha256_lines;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cosine similarity of two vectors; 0 when either has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Inner product; equals the cosine for normalized vectors. Errors when the dimensions differ.
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(WatchError::Embedding(format!(
            "Cannot compare vectors of dimension {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// L2-normalize an embedding, widening to f64
pub fn normalize(vector: &[f32]) -> Vec<f64> {
    let wide: Vec<f64> = vector.iter().map(|x| f64::from(*x)).collect();
    let norm = wide.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return wide;
    }
    wide.into_iter().map(|x| x / norm).collect()
}

/// Normalized keyword vectors for one keyword set, as embedded by `provider`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndex {
    pub key: String,
    pub provider: String,
    pub keywords: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
}

impl KeywordIndex {
    /// Cache key of a keyword set embedded by `provider`
    pub fn key_for(provider: &str, keywords: &[String]) -> String {
        let mut lines = Vec::with_capacity(keywords.len() + 1);
        lines.push(provider.to_string());
        lines.extend(keywords.iter().cloned());
        sha256_lines(&lines)
    }

    pub fn dimension(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }

    /// Whether this index really describes `keywords` embedded by `provider`
    fn matches(&self, provider: &str, keywords: &[String]) -> bool {
        let dim = self.dimension();
        self.provider == provider
            && self.keywords == keywords
            && self.vectors.len() == keywords.len()
            && dim > 0
            && self.vectors.iter().all(|v| v.len() == dim)
    }

    /// Best similarity over all keywords and the keywords at or above `threshold`.
    /// `vector` must be normalized and of the index dimension.
    pub fn score(&self, vector: &[f64], threshold: f64) -> Result<(f64, Vec<String>)> {
        let mut best = f64::MIN;
        let mut matched = Vec::new();

        for (keyword, keyword_vector) in self.keywords.iter().zip(&self.vectors) {
            let similarity = dot(vector, keyword_vector)?;
            if similarity > best {
                best = similarity;
            }
            if similarity >= threshold {
                matched.push(keyword.clone());
            }
        }

        Ok((best.clamp(0.0, 1.0), matched))
    }
}

/// Scores articles against a keyword set and keeps the relevant ones
pub struct RelevanceFilter {
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Mutex<HashMap<String, Arc<KeywordIndex>>>,
    cache_dir: Option<PathBuf>,
}

impl RelevanceFilter {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            cache: Mutex::new(HashMap::new()),
            cache_dir: None,
        }
    }

    /// Also persist keyword indexes as JSON under `dir`
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let vectors = self.embedder.embed(texts).await.map_err(|e| match e {
            WatchError::Embedding(msg) => WatchError::Embedding(msg),
            other => WatchError::Embedding(other.to_string()),
        })?;

        if vectors.len() != texts.len() {
            return Err(WatchError::Embedding(format!(
                "{} returned {} vectors for {} texts",
                self.embedder.provider_name(),
                vectors.len(),
                texts.len()
            )));
        }

        Ok(vectors.iter().map(|v| normalize(v)).collect())
    }

    /// Keyword index for `keywords`, from memory, disk or the embedder
    pub async fn keyword_index(&self, keywords: &[String]) -> Result<Arc<KeywordIndex>> {
        let provider = self.embedder.provider_name();
        let key = KeywordIndex::key_for(&provider, keywords);

        let mut cache = self.cache.lock().await;
        if let Some(index) = cache.get(&key) {
            debug!("Keyword index {} served from memory", &key[..12]);
            return Ok(index.clone());
        }

        if let Some(index) = self.load_cached(&key, &provider, keywords) {
            let index = Arc::new(index);
            cache.insert(key, index.clone());
            return Ok(index);
        }

        let index = Arc::new(self.build_index(key.clone(), provider, keywords).await?);
        cache.insert(key, index.clone());
        Ok(index)
    }

    /// Embed `keywords` again, replacing any cached index
    async fn rebuild_index(&self, keywords: &[String]) -> Result<Arc<KeywordIndex>> {
        let provider = self.embedder.provider_name();
        let key = KeywordIndex::key_for(&provider, keywords);

        let mut cache = self.cache.lock().await;
        cache.remove(&key);

        let index = Arc::new(self.build_index(key.clone(), provider, keywords).await?);
        cache.insert(key, index.clone());
        Ok(index)
    }

    async fn build_index(&self, key: String, provider: String, keywords: &[String]) -> Result<KeywordIndex> {
        info!("Embedding {} keywords with {}", keywords.len(), provider);
        let vectors = self.embed(keywords).await?;
        let index = KeywordIndex {
            key,
            provider,
            keywords: keywords.to_vec(),
            vectors,
        };
        self.store_cached(&index);
        Ok(index)
    }

    fn load_cached(&self, key: &str, provider: &str, keywords: &[String]) -> Option<KeywordIndex> {
        let path = self.cache_dir.as_ref()?.join(format!("{}.json", key));
        let content = std::fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<KeywordIndex>(&content) {
            Ok(index) if index.matches(provider, keywords) => {
                info!("Keyword index loaded from {}", path.display());
                Some(index)
            }
            Ok(_) => {
                warn!("Stale keyword index at {}, rebuilding", path.display());
                None
            }
            Err(e) => {
                warn!("Unreadable keyword index at {}: {}", path.display(), e);
                None
            }
        }
    }

    fn store_cached(&self, index: &KeywordIndex) {
        let Some(dir) = &self.cache_dir else {
            return;
        };

        let path = dir.join(format!("{}.json", index.key));
        let result = std::fs::create_dir_all(dir)
            .map_err(WatchError::from)
            .and_then(|_| serde_json::to_string(index).map_err(WatchError::from))
            .and_then(|json| std::fs::write(&path, json).map_err(WatchError::from));

        if let Err(e) = result {
            warn!("Could not write keyword index {}: {}", path.display(), e);
        }
    }

    /// Keep the articles whose best keyword similarity is at least `threshold`.
    ///
    /// Articles with no text are skipped. Input order is preserved.
    pub async fn filter(
        &self,
        articles: Vec<Article>,
        keywords: &[String],
        threshold: f64,
    ) -> Result<Vec<FilteredArticle>> {
        if keywords.is_empty() {
            warn!("No keywords given, nothing can be relevant");
            return Ok(Vec::new());
        }

        let (scorable, texts): (Vec<Article>, Vec<String>) = articles
            .into_iter()
            .filter_map(|article| {
                let text = article.scoring_text();
                if text.is_empty() {
                    debug!("Skipping article without text: {}", article.link);
                    None
                } else {
                    Some((article, text))
                }
            })
            .unzip();

        if scorable.is_empty() {
            return Ok(Vec::new());
        }

        let mut index = self.keyword_index(keywords).await?;
        let vectors = self.embed(&texts).await?;

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if index.dimension() != dimension {
            warn!(
                "Keyword vectors have dimension {} but articles have {}, re-embedding keywords",
                index.dimension(),
                dimension
            );
            index = self.rebuild_index(keywords).await?;
        }

        let total = scorable.len();
        let mut filtered = Vec::new();
        for (mut article, vector) in scorable.into_iter().zip(vectors) {
            let (score, matched_keywords) = index.score(&vector, threshold)?;
            if score >= threshold {
                article.score = Some(score);
                filtered.push(FilteredArticle {
                    article,
                    score,
                    matched_keywords,
                });
            }
        }

        info!(
            "{} of {} articles relevant at threshold {}",
            filtered.len(),
            total,
            threshold
        );
        Ok(filtered)
    }
}
