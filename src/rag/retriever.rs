use std::sync::Arc;

use super::embeddings::EmbeddingProvider;
use super::mmr::cosine_similarity;
use super::vector_store::{KeywordFilter, SearchParams, VectorIndex};
use crate::error::{RagError, Result};
use crate::indexer::document::ScoredDocument;

/// Embeds a query, runs the diversity-aware search and scores each result.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Retrieve up to `params.k` documents for `query`, in MMR selection order.
    ///
    /// `keyword_filter` is advisory: it narrows the candidate pool when it
    /// matches something and is otherwise ignored. Each result is scored by
    /// re-embedding its content and taking the cosine similarity to the query.
    pub async fn retrieve(
        &self,
        query: &str,
        params: SearchParams,
        keyword_filter: Option<&str>,
    ) -> Result<Vec<ScoredDocument>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let index_dimension = (!self.index.is_empty()).then(|| self.index.dimension());
        self.check_vector(&query_embedding, index_dimension, "query")?;
        let filter = keyword_filter.and_then(KeywordFilter::parse);

        let hits = self.index.search(&query_embedding, params, filter.as_ref())?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let contents: Vec<&str> = hits.iter().map(|h| h.document.content.as_str()).collect();
        let doc_embeddings = self.embedder.embed_documents(&contents).await?;
        if doc_embeddings.len() != hits.len() {
            return Err(RagError::embedding(
                self.embedder.name(),
                format!("expected {} vectors, got {}", hits.len(), doc_embeddings.len()),
            ));
        }

        for embedding in &doc_embeddings {
            self.check_vector(embedding, Some(query_embedding.len()), "document")?;
        }

        let scored: Vec<ScoredDocument> = hits
            .iter()
            .zip(doc_embeddings.iter())
            .map(|(hit, embedding)| ScoredDocument {
                document: hit.document.clone(),
                score: cosine_similarity(&query_embedding, embedding),
            })
            .collect();

        for doc in &scored {
            tracing::info!(
                source = %doc.document.metadata.source,
                page = ?doc.document.metadata.page,
                code = doc.document.metadata.identifier().unwrap_or("N/A"),
                score = doc.score,
                "retrieved document"
            );
        }

        Ok(scored)
    }

    /// Provider output must be non-empty and, when `expected` is known, of
    /// that dimension. Anything else is a provider fault, not a query fault.
    fn check_vector(&self, vector: &[f32], expected: Option<usize>, kind: &str) -> Result<()> {
        if vector.is_empty() {
            return Err(RagError::embedding(self.embedder.name(), format!("empty {kind} vector")));
        }
        match expected {
            Some(dimension) if vector.len() != dimension => Err(RagError::embedding(
                self.embedder.name(),
                format!("{kind} vector has {} dimensions, expected {dimension}", vector.len()),
            )),
            _ => Ok(()),
        }
    }
}
