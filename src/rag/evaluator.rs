//! Retrieval quality evaluation against a labeled query set.
//!
//! Each labeled item names the course codes a good retrieval should return.
//! Precision and recall are computed over sets of non-empty course codes.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::retriever::Retriever;
use super::vector_store::SearchParams;
use crate::error::{RagError, Result};
use crate::persist::atomic_write_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    pub relevant_codes: Vec<String>,
}

/// Read a JSON array of `{query, relevant_codes}`. One malformed item rejects
/// the whole file.
pub fn load_labeled_set(path: &Path) -> Result<Vec<LabeledQuery>> {
    let invalid = |message: String| RagError::LabeledSet { path: path.to_path_buf(), message };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RagError::MissingLabeledSet(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let items: Vec<serde_json::Value> =
        serde_json::from_str(&contents).map_err(|e| invalid(format!("expected a JSON array: {e}")))?;

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| serde_json::from_value(item).map_err(|e| invalid(format!("item {i}: {e}"))))
        .collect()
}

/// `(precision, recall)` of a retrieved code set against the expected one.
/// Both are 0.0 when their denominator set is empty.
pub fn score_retrieval(retrieved: &BTreeSet<String>, expected: &BTreeSet<String>) -> (f64, f64) {
    let hits = retrieved.intersection(expected).count() as f64;
    let precision = if retrieved.is_empty() { 0.0 } else { hits / retrieved.len() as f64 };
    let recall = if expected.is_empty() { 0.0 } else { hits / expected.len() as f64 };
    (precision, recall)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub expected_relevant_codes: BTreeSet<String>,
    pub retrieved_codes: BTreeSet<String>,
    pub precision: f64,
    pub recall: f64,
    /// Wall time of the retrieval call alone.
    pub latency_secs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub records: Vec<EvaluationRecord>,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_latency_secs: f64,
}

impl EvaluationReport {
    pub fn from_records(records: Vec<EvaluationRecord>) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let n = records.len() as f64;
        let mean = |f: fn(&EvaluationRecord) -> f64| records.iter().map(f).sum::<f64>() / n;
        Self {
            mean_precision: mean(|r| r.precision),
            mean_recall: mean(|r| r.recall),
            mean_latency_secs: mean(|r| r.latency_secs),
            records,
        }
    }

    /// Write pretty JSON atomically via a sibling temp file.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self, true)?;
        tracing::info!(path = %path.display(), queries = self.records.len(), "evaluation results saved");
        Ok(())
    }
}

pub struct Evaluator {
    params: SearchParams,
}

impl Evaluator {
    pub fn new(params: SearchParams) -> Self {
        Self { params }
    }

    pub async fn evaluate(&self, retriever: &Retriever, labeled: &[LabeledQuery]) -> Result<EvaluationReport> {
        let mut records = Vec::with_capacity(labeled.len());

        for item in labeled {
            let started = Instant::now();
            let documents = retriever.retrieve(&item.query, self.params, None).await?;
            let latency_secs = started.elapsed().as_secs_f64();

            let retrieved_codes: BTreeSet<String> = documents
                .iter()
                .filter_map(|d| d.document.metadata.identifier())
                .map(str::to_string)
                .collect();
            let expected_relevant_codes: BTreeSet<String> = item.relevant_codes.iter().cloned().collect();
            let (precision, recall) = score_retrieval(&retrieved_codes, &expected_relevant_codes);

            tracing::info!(
                query = %item.query,
                latency_secs,
                retrieved = documents.len(),
                precision,
                recall,
                "evaluation query"
            );

            records.push(EvaluationRecord {
                query: item.query.clone(),
                expected_relevant_codes,
                retrieved_codes,
                precision,
                recall,
                latency_secs,
            });
        }

        let report = EvaluationReport::from_records(records);
        tracing::info!(
            queries = report.records.len(),
            mean_precision = report.mean_precision,
            mean_recall = report.mean_recall,
            mean_latency_secs = report.mean_latency_secs,
            "evaluation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::document::{CourseFields, Document, Metadata, SourceFamily};
    use crate::rag::embeddings::{EmbeddingProvider, HashingEmbedder};
    use crate::rag::vector_store::VectorIndex;
    use std::sync::Arc;

    fn codes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn course(code: &str, content: &str) -> Document {
        let mut meta = Metadata::new("courses.json", SourceFamily::StructuredCourseJson);
        meta.course = Some(CourseFields { code: code.into(), ..Default::default() });
        Document::new(content, meta)
    }

    #[test]
    fn test_score_retrieval_half_precision_full_recall() {
        let (precision, recall) = score_retrieval(&codes(&["CSCI0220", "CSCI0160"]), &codes(&["CSCI0220"]));
        assert_eq!(precision, 0.5);
        assert_eq!(recall, 1.0);
    }

    #[test]
    fn test_score_retrieval_empty_sets() {
        assert_eq!(score_retrieval(&codes(&[]), &codes(&["CSCI0220"])), (0.0, 0.0));
        assert_eq!(score_retrieval(&codes(&["CSCI0220"]), &codes(&[])), (0.0, 0.0));
    }

    #[test]
    fn test_load_labeled_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labeled.json");
        fs::write(&path, r#"[{"query": "algorithms", "relevant_codes": ["CSCI0220"]}]"#).unwrap();

        let items = load_labeled_set(&path).unwrap();
        assert_eq!(items, vec![LabeledQuery { query: "algorithms".into(), relevant_codes: vec!["CSCI0220".into()] }]);
    }

    #[test]
    fn test_load_labeled_set_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_labeled_set(&missing), Err(RagError::MissingLabeledSet(_))));

        let bad_item = dir.path().join("bad.json");
        fs::write(&bad_item, r#"[{"query": "ok", "relevant_codes": []}, {"query": 3}]"#).unwrap();
        match load_labeled_set(&bad_item) {
            Err(RagError::LabeledSet { message, .. }) => assert!(message.starts_with("item 1")),
            other => panic!("expected LabeledSet error, got {other:?}"),
        }

        let not_array = dir.path().join("object.json");
        fs::write(&not_array, r#"{"query": "x"}"#).unwrap();
        assert!(matches!(load_labeled_set(&not_array), Err(RagError::LabeledSet { .. })));
    }

    #[tokio::test]
    async fn test_evaluate_and_save() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(128));
        let docs = vec![
            course("CSCI0220", "Algorithms"),
            course("CSCI0160", "Algorithms and Data Structures"),
            Document::new("Bulletin page", Metadata::new("bulletin.pdf", SourceFamily::CatalogPdf)),
        ];
        let index = VectorIndex::build(docs, embedder.as_ref(), 8).await.unwrap();
        let retriever = Retriever::new(Arc::new(index), embedder);

        let labeled = vec![LabeledQuery { query: "algorithms".into(), relevant_codes: vec!["CSCI0220".into()] }];
        let params = SearchParams { k: 3, fetch_k: 3, lambda: 0.5 };
        let report = Evaluator::new(params).evaluate(&retriever, &labeled).await.unwrap();

        let record = &report.records[0];
        assert_eq!(record.retrieved_codes, codes(&["CSCI0160", "CSCI0220"]));
        assert_eq!(record.precision, 0.5);
        assert_eq!(record.recall, 1.0);
        assert!(record.latency_secs >= 0.0);
        assert_eq!(report.mean_precision, 0.5);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluation_results.json");
        report.save(&path).unwrap();
        let reloaded: EvaluationReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.records.len(), 1);
        assert_eq!(reloaded.records[0].retrieved_codes, record.retrieved_codes);
        assert_eq!(reloaded.mean_recall, 1.0);
    }
}
