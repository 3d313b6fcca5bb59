use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::embeddings::EmbeddingProvider;
use super::vector_store::VectorIndex;
use crate::config::Settings;
use crate::error::{RagError, Result};
use crate::indexer::catalog::{load_catalog, IngestReport, SourceSpec};
use crate::indexer::chunker::ChunkConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatus {
    pub is_indexing: bool,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub total_entries: usize,
    pub dimension: usize,
    /// Sources ingested by the last build run in this process.
    pub loaded_sources: usize,
    pub missing_sources: Vec<String>,
    pub failed_sources: Vec<String>,
    pub last_error: Option<String>,
}

/// Owns the live index. Readers take a cheap `Arc` snapshot; a rebuild
/// constructs and saves a new index before swapping the pointer.
pub struct IndexManager {
    status: Mutex<IndexStatus>,
    index: RwLock<Arc<VectorIndex>>,
    index_path: PathBuf,
    sources: Vec<SourceSpec>,
    chunking: ChunkConfig,
    batch_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexManager {
    /// Load the persisted index, or build it from the configured sources and
    /// persist it when none exists yet. A persisted index built by a different
    /// embedding model is rejected as [`RagError::CorruptIndex`].
    pub async fn open(settings: &Settings, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index_path = settings.index_path();
        let sources = settings.source_specs();
        let chunking = settings.chunking;
        let batch_size = settings.index.batch_size;

        let persisted = match VectorIndex::load(&index_path) {
            Ok(index) if index.is_empty() => {
                tracing::warn!(path = %index_path.display(), "persisted index is empty, rebuilding from sources");
                None
            }
            Ok(index) => {
                check_embedder(&index, &index_path, embedder.as_ref())?;
                Some(index)
            }
            Err(RagError::NotFound(_)) => {
                tracing::info!(path = %index_path.display(), "no persisted index, building from sources");
                None
            }
            Err(e) => return Err(e),
        };

        let mut status = IndexStatus::default();
        let index = match persisted {
            Some(index) => index,
            None => {
                let (index, report) = build_from_sources(&sources, chunking, embedder.as_ref(), batch_size).await?;
                if index.is_empty() {
                    tracing::warn!("no documents loaded from the configured sources, serving an empty index without persisting it");
                } else {
                    index.save(&index_path)?;
                }
                record_ingest(&mut status, &report);
                index
            }
        };

        status.last_indexed_at = Some(index.built_at());
        status.total_entries = index.len();
        status.dimension = index.dimension();

        Ok(Self {
            status: Mutex::new(status),
            index: RwLock::new(Arc::new(index)),
            index_path,
            sources,
            chunking,
            batch_size,
            embedder,
        })
    }

    /// Snapshot of the index currently being served.
    pub async fn current(&self) -> Arc<VectorIndex> {
        self.index.read().await.clone()
    }

    pub async fn get_status(&self) -> IndexStatus {
        self.status.lock().await.clone()
    }

    pub async fn is_indexing(&self) -> bool {
        self.status.lock().await.is_indexing
    }

    /// Rebuild from raw sources, persist, then swap. Fails with
    /// [`RagError::IndexBusy`] while another rebuild runs; queries keep using
    /// the previous index until the swap.
    pub async fn rebuild(&self) -> Result<IndexStatus> {
        {
            let mut status = self.status.lock().await;
            if status.is_indexing {
                return Err(RagError::IndexBusy);
            }
            status.is_indexing = true;
            status.last_error = None;
        }

        let result = self.do_rebuild().await;

        let mut status = self.status.lock().await;
        status.is_indexing = false;
        match result {
            Ok((index, report)) => {
                record_ingest(&mut status, &report);
                status.last_indexed_at = Some(index.built_at());
                status.total_entries = index.len();
                status.dimension = index.dimension();
                *self.index.write().await = index;
                Ok(status.clone())
            }
            Err(e) => {
                tracing::error!("Index rebuild failed: {}", e);
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn do_rebuild(&self) -> Result<(Arc<VectorIndex>, IngestReport)> {
        let (index, report) =
            build_from_sources(&self.sources, self.chunking, self.embedder.as_ref(), self.batch_size).await?;
        if index.is_empty() {
            return Err(RagError::Config(
                "no documents loaded from the configured sources; keeping the current index".to_string(),
            ));
        }
        index.save(&self.index_path)?;
        Ok((Arc::new(index), report))
    }
}

/// Ingest every source and embed the resulting documents into a fresh index.
pub async fn build_from_sources(
    sources: &[SourceSpec],
    chunking: ChunkConfig,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<(VectorIndex, IngestReport)> {
    let mut report = ingest(sources.to_vec(), chunking).await?;
    let documents = std::mem::take(&mut report.documents);
    let index = VectorIndex::build(documents, embedder, batch_size).await?;
    Ok((index, report))
}

/// Run catalog loading off the async runtime; PDF extraction is CPU-bound.
pub async fn ingest(sources: Vec<SourceSpec>, chunking: ChunkConfig) -> Result<IngestReport> {
    tokio::task::spawn_blocking(move || load_catalog(&sources, chunking))
        .await
        .map_err(|e| RagError::Io(std::io::Error::other(format!("ingestion task failed: {e}"))))
}

fn check_embedder(index: &VectorIndex, path: &Path, embedder: &dyn EmbeddingProvider) -> Result<()> {
    let configured = embedder.fingerprint();
    if index.embedder() != configured {
        return Err(RagError::CorruptIndex {
            path: path.to_path_buf(),
            message: format!(
                "built with embedder '{}' but '{}' is configured; rebuild the index",
                index.embedder(),
                configured
            ),
        });
    }
    Ok(())
}

fn record_ingest(status: &mut IndexStatus, report: &IngestReport) {
    status.loaded_sources = report.loaded_sources;
    status.missing_sources = report.missing_sources.iter().map(|p| p.display().to_string()).collect();
    status.failed_sources = report.failed_sources.iter().map(|(p, _)| p.display().to_string()).collect();
}
