use std::path::PathBuf;

use super::chunker::{chunk_document, ChunkConfig};
use super::document::{Document, SourceFamily};
use super::normalizer::load_source;

/// A configured source file and the family it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub family: SourceFamily,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, family: SourceFamily) -> Self {
        Self { path: path.into(), family }
    }
}

/// Outcome of loading the whole catalog. Failures are collected, not dropped.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,
    pub loaded_sources: usize,
    pub missing_sources: Vec<PathBuf>,
    pub failed_sources: Vec<(PathBuf, String)>,
    pub dropped_records: usize,
}

impl IngestReport {
    /// Share of existing source files that could not be read, in `[0, 1]`.
    pub fn source_failure_ratio(&self) -> f64 {
        let attempted = self.loaded_sources + self.failed_sources.len();
        if attempted == 0 {
            return 0.0;
        }
        self.failed_sources.len() as f64 / attempted as f64
    }
}

/// Load, normalize and chunk every configured source.
///
/// Missing files are skipped. Files that fail to parse are logged and skipped.
/// PDF pages are chunked; course records are kept whole.
pub fn load_catalog(sources: &[SourceSpec], chunking: ChunkConfig) -> IngestReport {
    let mut report = IngestReport::default();

    for spec in sources {
        if !spec.path.exists() {
            tracing::warn!(path = %spec.path.display(), "source file not found, skipping");
            report.missing_sources.push(spec.path.clone());
            continue;
        }

        match load_source(&spec.path, spec.family) {
            Ok(load) => {
                let before = report.documents.len();
                report.dropped_records += load.dropped_records.len();
                match spec.family {
                    SourceFamily::CatalogPdf => {
                        for page in &load.documents {
                            report.documents.extend(chunk_document(page, chunking));
                        }
                    }
                    _ => report.documents.extend(load.documents),
                }
                report.loaded_sources += 1;
                tracing::info!(
                    path = %spec.path.display(),
                    family = %spec.family,
                    documents = report.documents.len() - before,
                    "loaded source"
                );
            }
            Err(e) => {
                tracing::warn!(path = %spec.path.display(), error = %e, "failed to load source");
                report.failed_sources.push((spec.path.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        documents = report.documents.len(),
        sources = report.loaded_sources,
        failed_sources = report.failed_sources.len(),
        dropped_records = report.dropped_records,
        failure_ratio = report.source_failure_ratio(),
        "catalog loaded"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_catalog_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("fall_2025_courses.json");
        let bad = dir.path().join("spring_2026_courses.json");
        let lsu = dir.path().join("LSU_courses.json");
        fs::write(&good, r#"[{"code": "CSCI0320", "title": "Software Engineering"}, 7]"#).unwrap();
        fs::write(&bad, "not json").unwrap();
        fs::write(&lsu, r#"[{"Dept": "MATH", "Num": "1550"}]"#).unwrap();

        let sources = vec![
            SourceSpec::new(&good, SourceFamily::StructuredCourseJson),
            SourceSpec::new(&bad, SourceFamily::StructuredCourseJson),
            SourceSpec::new(dir.path().join("absent.json"), SourceFamily::StructuredCourseJson),
            SourceSpec::new(&lsu, SourceFamily::LsuVariantJson),
        ];
        let report = load_catalog(&sources, ChunkConfig::default());

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.loaded_sources, 2);
        assert_eq!(report.missing_sources.len(), 1);
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.dropped_records, 1);
        assert!((report.source_failure_ratio() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.documents[1].metadata.identifier(), Some("MATH 1550"));
    }

    #[test]
    fn test_empty_catalog() {
        let report = load_catalog(&[], ChunkConfig::default());
        assert!(report.documents.is_empty());
        assert_eq!(report.source_failure_ratio(), 0.0);
    }
}
