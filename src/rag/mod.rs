pub mod embeddings;
pub mod evaluator;
pub mod index_manager;
pub mod mmr;
pub mod retriever;
pub mod synthesizer;
pub mod vector_store;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::error::Result;
use crate::llm::{ChatCompletionsClient, LanguageModel};
use crate::models::RetrievedCourse;
use self::embeddings::EmbeddingProvider;
use self::evaluator::{load_labeled_set, EvaluationReport, Evaluator};
use self::index_manager::{IndexManager, IndexStatus};
use self::retriever::Retriever;
use self::synthesizer::AnswerSynthesizer;

#[derive(Debug, Clone)]
pub struct AdvisorAnswer {
    pub answer: String,
    /// Retrieved documents that carry a course code, in retrieval order.
    pub retrieved_courses: Vec<RetrievedCourse>,
    pub elapsed_secs: f64,
}

/// The course advisor backend: built once at startup and shared by handlers.
pub struct CourseAdvisor {
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: AnswerSynthesizer,
    index: IndexManager,
}

impl CourseAdvisor {
    /// Wire up the configured embedding provider and language model.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(settings.embedding.build()?);
        let model: Arc<dyn LanguageModel> = Arc::new(ChatCompletionsClient::new(settings.llm.clone()));
        Self::new(settings, embedder, model).await
    }

    pub async fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        settings.validate()?;
        let index = IndexManager::open(&settings, embedder.clone()).await?;
        tracing::info!(entries = index.current().await.len(), "course advisor ready");

        Ok(Self {
            settings,
            embedder,
            synthesizer: AnswerSynthesizer::new(model),
            index,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A retriever over the index snapshot currently being served.
    pub async fn retriever(&self) -> Retriever {
        Retriever::new(self.index.current().await, self.embedder.clone())
    }

    /// Answer a student question from retrieved course data. `body_search`
    /// narrows the candidate pool by keyword when it matches anything.
    pub async fn answer_query(&self, question: &str, body_search: Option<&str>) -> Result<AdvisorAnswer> {
        let started = Instant::now();
        tracing::info!(question, body_search, "Query received");

        let documents = self
            .retriever()
            .await
            .retrieve(question, self.settings.retrieval.params(), body_search)
            .await?;

        let retrieved_courses: Vec<RetrievedCourse> =
            documents.iter().filter_map(RetrievedCourse::from_scored).collect();
        let answer = self.synthesizer.synthesize(question, documents).await?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!("Response time: {:.2}s", elapsed_secs);

        Ok(AdvisorAnswer {
            answer: answer.answer,
            retrieved_courses,
            elapsed_secs,
        })
    }

    /// Evaluate retrieval against a labeled set and save the report to the
    /// configured results file.
    pub async fn evaluate_file(&self, labeled_set_file: &Path) -> Result<EvaluationReport> {
        let labeled = load_labeled_set(labeled_set_file)?;
        let retriever = self.retriever().await;
        let report = Evaluator::new(self.settings.retrieval.params())
            .evaluate(&retriever, &labeled)
            .await?;
        report.save(&self.settings.evaluation.results_file)?;
        Ok(report)
    }

    /// Evaluate a labeled set named by a remote caller. The name is resolved
    /// inside `evaluation.labeled_set_dir`; anything outside it is refused.
    pub async fn evaluate_labeled_set(&self, requested: &str) -> Result<EvaluationReport> {
        let path = self.settings.resolve_labeled_set(requested)?;
        self.evaluate_file(&path).await
    }

    pub async fn rebuild_index(&self) -> Result<IndexStatus> {
        self.index.rebuild().await
    }

    pub async fn index_status(&self) -> IndexStatus {
        self.index.get_status().await
    }
}
