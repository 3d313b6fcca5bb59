use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::embeddings::EmbeddingProvider;
use super::mmr::{cosine_similarity, mmr_select, MmrCandidate};
use crate::error::{RagError, Result};
use crate::indexer::document::Document;
use crate::persist::atomic_write_json;

pub const INDEX_FORMAT: &str = "course-advisor-index";
pub const INDEX_VERSION: u32 = 2;
pub const INDEX_FILE_NAME: &str = "index.json";

static KEYWORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub document: Document,
}

/// Search knobs: `fetch_k` nearest neighbours are re-ranked down to `k` with MMR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub k: usize,
    pub fetch_k: usize,
    /// 1.0 = pure relevance, 0.0 = pure diversity.
    pub lambda: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { k: 50, fetch_k: 70, lambda: 0.5 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub position: usize,
    pub document: &'a Document,
    /// Cosine similarity between the query and the stored vector.
    pub relevance: f32,
}

/// Keyword narrowing for a search. Every keyword must appear as a whole word
/// (case-insensitive) in the content or a metadata value.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    patterns: Vec<Regex>,
}

impl KeywordFilter {
    /// Returns `None` when the input holds no keywords.
    pub fn parse(input: &str) -> Option<Self> {
        let patterns: Vec<Regex> = KEYWORD_TOKEN
            .find_iter(input)
            .filter_map(|m| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(m.as_str()))).ok())
            .collect();
        if patterns.is_empty() {
            None
        } else {
            Some(Self { patterns })
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.patterns.iter().all(|re| {
            re.is_match(&document.content)
                || document.metadata.entries().iter().any(|(_, v)| re.is_match(v))
        })
    }
}

/// Document vectors plus their documents. Immutable once built or loaded.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// Fingerprint of the embedding provider that produced the vectors.
    embedder: String,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    format: &'a str,
    version: u32,
    dimension: usize,
    embedder: &'a str,
    built_at: DateTime<Utc>,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct PersistedHeader {
    format: String,
    version: u32,
}

#[derive(Deserialize)]
struct PersistedIndex {
    dimension: usize,
    embedder: String,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every document and build an index. All-or-nothing: any provider
    /// failure or malformed vector aborts the build.
    pub async fn build(
        documents: Vec<Document>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        Self::build_with_progress(documents, embedder, batch_size, |_| {}).await
    }

    /// Like [`VectorIndex::build`], calling `on_batch` with the number of
    /// documents embedded after each batch.
    pub async fn build_with_progress<F>(
        documents: Vec<Document>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<Self>
    where
        F: FnMut(usize) + Send,
    {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        let mut dimension = 0usize;

        for batch in documents.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
            let embedded = embedder.embed_documents(&texts).await?;

            if embedded.len() != batch.len() {
                return Err(RagError::embedding(
                    embedder.name(),
                    format!("expected {} vectors, got {}", batch.len(), embedded.len()),
                ));
            }
            for vector in embedded {
                if vector.is_empty() {
                    return Err(RagError::embedding(embedder.name(), "provider returned an empty vector"));
                }
                if dimension == 0 {
                    dimension = vector.len();
                } else if vector.len() != dimension {
                    return Err(RagError::embedding(
                        embedder.name(),
                        format!("inconsistent vector dimension: {} vs {}", vector.len(), dimension),
                    ));
                }
                vectors.push(vector);
            }
            on_batch(batch.len());
        }

        let entries = vectors
            .into_iter()
            .zip(documents)
            .map(|(vector, document)| IndexEntry { vector, document })
            .collect::<Vec<_>>();

        let embedder = embedder.fingerprint();
        tracing::info!(entries = entries.len(), dimension, embedder = %embedder, "vector index built");
        Ok(Self { dimension, embedder, built_at: Utc::now(), entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Cosine top-`fetch_k`, then MMR down to `k`.
    ///
    /// Ties in relevance keep index-build order. If `filter` matches nothing,
    /// the search runs over the whole index.
    pub fn search(
        &self,
        query: &[f32],
        params: SearchParams,
        filter: Option<&KeywordFilter>,
    ) -> Result<Vec<SearchHit<'_>>> {
        if self.entries.is_empty() || params.k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }

        let mut pool: Vec<usize> = match filter {
            Some(filter) => (0..self.entries.len())
                .filter(|&i| filter.matches(&self.entries[i].document))
                .collect(),
            None => Vec::new(),
        };
        if pool.is_empty() {
            if filter.is_some() {
                tracing::warn!("keyword filter matched no documents, falling back to vector search");
            }
            pool = (0..self.entries.len()).collect();
        }

        let mut scored: Vec<(usize, f32)> = pool
            .into_iter()
            .map(|i| (i, cosine_similarity(query, &self.entries[i].vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.fetch_k.max(params.k));

        let candidates: Vec<MmrCandidate<'_>> = scored
            .iter()
            .map(|&(position, relevance)| MmrCandidate {
                position,
                relevance,
                vector: &self.entries[position].vector,
            })
            .collect();

        let hits = mmr_select(&candidates, params.k, params.lambda)
            .into_iter()
            .map(|position| {
                let relevance = scored
                    .iter()
                    .find(|(p, _)| *p == position)
                    .map(|(_, r)| *r)
                    .unwrap_or_default();
                SearchHit { position, document: &self.entries[position].document, relevance }
            })
            .collect();
        Ok(hits)
    }

    /// Persist atomically: write a sibling temp file, sync it, rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let persisted = PersistedIndexRef {
            format: INDEX_FORMAT,
            version: INDEX_VERSION,
            dimension: self.dimension,
            embedder: &self.embedder,
            built_at: self.built_at,
            entries: &self.entries,
        };
        atomic_write_json(path, &persisted, false)?;

        tracing::info!(path = %path.display(), entries = self.entries.len(), "vector index saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |message: String| RagError::CorruptIndex { path: path.to_path_buf(), message };

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(RagError::NotFound(path.to_path_buf())),
            Err(e) => return Err(corrupt(format!("unreadable: {e}"))),
        };

        let header: PersistedHeader =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("invalid header: {e}")))?;
        if header.format != INDEX_FORMAT {
            return Err(corrupt(format!("unknown format '{}'", header.format)));
        }
        if header.version != INDEX_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (expected {INDEX_VERSION})",
                header.version
            )));
        }

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("invalid body: {e}")))?;
        if let Some(bad) = persisted.entries.iter().position(|e| e.vector.len() != persisted.dimension) {
            return Err(corrupt(format!(
                "entry {bad} has {} dimensions, expected {}",
                persisted.entries[bad].vector.len(),
                persisted.dimension
            )));
        }

        tracing::info!(path = %path.display(), entries = persisted.entries.len(), "vector index loaded");
        Ok(Self {
            dimension: persisted.dimension,
            embedder: persisted.embedder,
            built_at: persisted.built_at,
            entries: persisted.entries,
        })
    }
}
