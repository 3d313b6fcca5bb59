use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::indexer::catalog::SourceSpec;
use crate::indexer::chunker::ChunkConfig;
use crate::indexer::document::SourceFamily;
use crate::llm::LlmSettings;
use crate::rag::embeddings::EmbeddingSettings;
use crate::rag::vector_store::{SearchParams, INDEX_FILE_NAME};

pub const DEFAULT_CONFIG_FILE: &str = "course-advisor.toml";
pub const CONFIG_FILE_ENV: &str = "ADVISOR_CONFIG";
const ENV_PREFIX: &str = "ADVISOR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sources: SourceSettings,
    pub index: IndexSettings,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub server: ServerSettings,
    pub evaluation: EvaluationSettings,
}

/// Raw dataset files, grouped by source family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub json_files: Vec<PathBuf>,
    pub lsu_files: Vec<PathBuf>,
    pub pdf_files: Vec<PathBuf>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            json_files: vec![
                PathBuf::from("primary_data/winter2026/winter_2026_courses.json"),
                PathBuf::from("primary_data/spring2026/spring_2026_courses.json"),
                PathBuf::from("primary_data/fall2025/fall_2025_courses.json"),
                PathBuf::from("primary_data/spring2025/spring_2025_courses.json"),
            ],
            lsu_files: vec![PathBuf::from("secondary_data/LSU_courses.json")],
            pdf_files: vec![
                PathBuf::from("secondary_data/2025-26-bulletin.pdf"),
                PathBuf::from("secondary_data/universitycourses.pdf"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding the persisted index.
    pub database_path: PathBuf,
    /// Documents per embedding request during a build.
    pub batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database"),
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub fetch_k: usize,
    pub mmr_lambda: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let params = SearchParams::default();
        Self {
            k: params.k,
            fetch_k: params.fetch_k,
            mmr_lambda: params.lambda,
        }
    }
}

impl RetrievalSettings {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            k: self.k,
            fetch_k: self.fetch_k,
            lambda: self.mmr_lambda,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub results_file: PathBuf,
    /// The only directory `/api/evaluate` may read labeled sets from.
    pub labeled_set_dir: PathBuf,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            results_file: PathBuf::from("evaluation_results.json"),
            labeled_set_dir: PathBuf::from("labeled_sets"),
        }
    }
}

impl Settings {
    /// Layered load: built-in defaults, then the optional config file
    /// (`$ADVISOR_CONFIG` or `course-advisor.toml`), then `ADVISOR_*` env vars,
    /// e.g. `ADVISOR_RETRIEVAL__K=10` or `ADVISOR_LLM__MODEL=gpt-4o-mini`.
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_error)?;

        let settings: Settings = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sources.json_files")
                    .with_list_parse_key("sources.lsu_files")
                    .with_list_parse_key("sources.pdf_files"),
            )
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let ChunkConfig { chunk_size, overlap } = self.chunking;
        if chunk_size == 0 {
            return Err(RagError::Config("chunking.chunk_size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunking.overlap ({overlap}) must be smaller than chunking.chunk_size ({chunk_size})"
            )));
        }

        let RetrievalSettings { k, fetch_k, mmr_lambda } = self.retrieval;
        if k == 0 {
            return Err(RagError::Config("retrieval.k must be positive".into()));
        }
        if fetch_k < k {
            return Err(RagError::Config(format!(
                "retrieval.fetch_k ({fetch_k}) must be at least retrieval.k ({k})"
            )));
        }
        if !(0.0..=1.0).contains(&mmr_lambda) {
            return Err(RagError::Config(format!(
                "retrieval.mmr_lambda ({mmr_lambda}) must be within [0, 1]"
            )));
        }

        if self.index.batch_size == 0 {
            return Err(RagError::Config("index.batch_size must be positive".into()));
        }
        Ok(())
    }

    /// All configured sources in ingestion order: course JSON, PDFs, LSU JSON.
    pub fn source_specs(&self) -> Vec<SourceSpec> {
        let families = [
            (&self.sources.json_files, SourceFamily::StructuredCourseJson),
            (&self.sources.pdf_files, SourceFamily::CatalogPdf),
            (&self.sources.lsu_files, SourceFamily::LsuVariantJson),
        ];
        families
            .into_iter()
            .flat_map(|(paths, family)| paths.iter().map(move |p| SourceSpec::new(p.clone(), family)))
            .collect()
    }

    pub fn index_path(&self) -> PathBuf {
        self.index.database_path.join(INDEX_FILE_NAME)
    }

    /// Resolve a client-supplied labeled set name inside
    /// `evaluation.labeled_set_dir`. Anything that lands outside it after
    /// symlinks and `..` are resolved is rejected.
    pub fn resolve_labeled_set(&self, requested: &str) -> Result<PathBuf> {
        let base_dir = &self.evaluation.labeled_set_dir;
        let joined = base_dir.join(requested);

        let canonical = canonicalize_existing(&joined, &joined)?;
        let base = canonicalize_existing(base_dir, &joined)?;
        if !canonical.starts_with(&base) {
            tracing::warn!(requested, "labeled set outside the configured directory");
            return Err(RagError::PathNotAllowed(requested.to_string()));
        }
        Ok(canonical)
    }
}

fn canonicalize_existing(path: &Path, requested: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| match e.kind() {
        ErrorKind::NotFound => RagError::MissingLabeledSet(requested.to_path_buf()),
        _ => e.into(),
    })
}

fn config_error(e: config::ConfigError) -> RagError {
    RagError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.retrieval.params(), SearchParams { k: 50, fetch_k: 70, lambda: 0.5 });
        assert_eq!(settings.chunking, ChunkConfig { chunk_size: 1000, overlap: 100 });
        assert_eq!(settings.index_path(), PathBuf::from("database").join("index.json"));
    }

    #[test]
    fn test_source_order() {
        let specs = Settings::default().source_specs();
        assert_eq!(specs.len(), 7);
        assert_eq!(specs[0].family, SourceFamily::StructuredCourseJson);
        assert_eq!(specs[4].family, SourceFamily::CatalogPdf);
        assert_eq!(specs[6].family, SourceFamily::LsuVariantJson);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.chunking.overlap = 1000;
        assert!(matches!(settings.validate(), Err(RagError::Config(_))));

        let mut settings = Settings::default();
        settings.retrieval.fetch_k = 10;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.mmr_lambda = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.index.batch_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[retrieval]
k = 5
fetch_k = 8

[embedding]
provider = "hashing"
dimensions = 64

[llm]
model = "gpt-4o-mini"
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.retrieval.k, 5);
        assert_eq!(settings.retrieval.fetch_k, 8);
        assert_eq!(settings.retrieval.mmr_lambda, 0.5);
        assert_eq!(settings.embedding, EmbeddingSettings::Hashing { dimensions: 64 });
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.llm.base_url, "http://localhost:4000");
    }

    #[test]
    fn test_labeled_sets_resolve_inside_configured_dir() {
        let root = tempfile::tempdir().unwrap();
        let sets = root.path().join("labeled_sets");
        std::fs::create_dir_all(sets.join("fall")).unwrap();
        std::fs::write(sets.join("fall").join("queries.json"), "[]").unwrap();
        std::fs::write(root.path().join("secret.json"), "[]").unwrap();

        let mut settings = Settings::default();
        settings.evaluation.labeled_set_dir = sets.clone();

        let resolved = settings.resolve_labeled_set("fall/queries.json").unwrap();
        assert!(resolved.ends_with("fall/queries.json"));

        for escape in ["../secret.json", "fall/../../secret.json"] {
            assert!(matches!(settings.resolve_labeled_set(escape), Err(RagError::PathNotAllowed(_))));
        }
        let absolute = root.path().join("secret.json");
        assert!(matches!(
            settings.resolve_labeled_set(absolute.to_str().unwrap()),
            Err(RagError::PathNotAllowed(_))
        ));

        assert!(matches!(
            settings.resolve_labeled_set("missing.json"),
            Err(RagError::MissingLabeledSet(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load_from("/nonexistent/course-advisor").unwrap();
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
    }
}
