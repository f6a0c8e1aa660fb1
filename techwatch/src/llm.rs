use crate::config::LlmConfig;
use crate::traits::{EmbeddingProvider, Summarizer};
use crate::types::{Result, WatchError};
use crate::utils::text::clean_summary;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for any server speaking the OpenAI `/embeddings` and
/// `/chat/completions` API (OpenAI, Ollama, vLLM...)
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: LlmConfig,
    theme: String,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            config,
            theme: "technology".to_string(),
        })
    }

    /// Domain the summarizer is told it is an expert in
    pub fn with_theme(mut self, theme: &str) -> Self {
        self.theme = theme.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| WatchError::Configuration(format!("Invalid LLM_API_KEY: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn prompt(&self, title: &str, content: &str) -> String {
        format!(
            "You are an expert in {}. Summarize only the article below in at most 3 sentences, covering:\n\
             1. The main information (who, what), mentioning any code or project with code.\n\
             2. The key details (figures, names, dates).\n\
             3. The impact or the proposed solution.\n\n\
             Title: {}\n\n\
             Content: {}\n\n\
             Summary:",
            self.theme, title, content
        )
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatClient {
    fn provider_name(&self) -> String {
        format!("openai-compat embeddings ({})", self.config.embedding_model)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} texts", texts.len());
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response = self
            .http
            .post(self.url("embeddings"))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| WatchError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WatchError::Embedding(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| WatchError::Embedding(format!("bad response: {}", e)))?;

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Summarizer for OpenAiCompatClient {
    fn summarizer_name(&self) -> String {
        format!("openai-compat chat ({})", self.config.model)
    }

    async fn summarize(&self, title: &str, content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(self.prompt(title, content)),
            }],
            temperature: self.config.temperature,
        };

        debug!("Summarizing: {}", title);
        let response = self
            .http
            .post(self.url("chat/completions"))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| WatchError::Summarization(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WatchError::Summarization(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| WatchError::Summarization(format!("bad response: {}", e)))?;

        let raw = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WatchError::Summarization("No completion returned".to_string()))?;

        let summary = clean_summary(raw.trim().trim_matches('"'));
        if summary.is_empty() {
            return Err(WatchError::Summarization("Empty completion".to_string()));
        }
        Ok(summary)
    }
}
