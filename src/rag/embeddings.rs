use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fastembed::{InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Maps text to fixed-dimension vectors. Must be deterministic for identical
/// input within a session.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in errors and logs.
    fn name(&self) -> &str;

    /// Identifies the model behind the vectors. Indexes built under one
    /// fingerprint cannot be queried with embeddings from another.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(self.name(), "provider returned no vector for query"))
    }
}

/// Local ONNX sentence-embedding model loaded from a directory of model files.
pub struct LocalEmbedder {
    model: TextEmbedding,
    model_id: String,
}

impl LocalEmbedder {
    pub fn new(model_dir: &Path) -> Result<Self> {
        tracing::info!(model_dir = %model_dir.display(), "Initializing embedding model from local files...");

        if !model_dir.exists() {
            return Err(RagError::embedding(
                "local",
                format!("model directory not found: {}", model_dir.display()),
            ));
        }

        let read = |name: &str| -> Result<Vec<u8>> {
            std::fs::read(model_dir.join(name))
                .map_err(|e| RagError::embedding("local", format!("failed to read {name}: {e}")))
        };

        let user_model = UserDefinedEmbeddingModel {
            onnx_file: read("model.onnx")?,
            tokenizer_files: TokenizerFiles {
                tokenizer_file: read("tokenizer.json")?,
                config_file: read("config.json")?,
                special_tokens_map_file: read("special_tokens_map.json")?,
                tokenizer_config_file: read("tokenizer_config.json")?,
            },
        };

        let model = TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
            .map_err(|e| RagError::embedding("local", format!("failed to initialize embedding model: {e}")))?;

        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| model_dir.display().to_string());

        tracing::info!(model = %model_id, "Embedding model initialized successfully");
        Ok(Self { model, model_id })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    fn fingerprint(&self) -> String {
        format!("local:{}", self.model_id)
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| RagError::embedding("local", e.to_string()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint (e.g. a LiteLLM gateway).
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn fingerprint(&self) -> String {
        format!("http:{}", self.model)
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut req = self
            .client
            .post(&url)
            .json(&EmbeddingRequest { model: &self.model, input: texts });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RagError::embedding("http", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::embedding("http", format!("API returned {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::embedding("http", format!("failed to parse response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::embedding(
                "http",
                format!("expected {} embeddings, got {}", texts.len(), parsed.data.len()),
            ));
        }
        parsed.data.sort_by_key(|d| d.index.unwrap_or(0));
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic feature-hashing embedder. Needs no model or network; used for
/// offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn fingerprint(&self) -> String {
        format!("hashing:{}", self.dimensions)
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Embedding provider selection, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingSettings {
    Local { model_dir: PathBuf },
    Http {
        base_url: String,
        model: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Hashing { dimensions: usize },
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::Local { model_dir: PathBuf::from("models/bge-small-en-v1.5") }
    }
}

impl EmbeddingSettings {
    pub fn build(&self) -> Result<Box<dyn EmbeddingProvider>> {
        Ok(match self {
            Self::Local { model_dir } => Box::new(LocalEmbedder::new(model_dir)?),
            Self::Http { base_url, model, api_key } => {
                Box::new(HttpEmbedder::new(base_url.clone(), model.clone(), api_key.clone()))
            }
            Self::Hashing { dimensions } => Box::new(HashingEmbedder::new(*dimensions)),
        })
    }
}
