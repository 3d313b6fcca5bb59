use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use course_advisor::config::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE};
use course_advisor::rag::embeddings::EmbeddingProvider;
use course_advisor::rag::index_manager::ingest;
use course_advisor::rag::vector_store::VectorIndex;
use course_advisor::{init_tracing, CourseAdvisor, Settings};

#[derive(Parser, Debug)]
#[command(name = "course-indexer")]
#[command(about = "Build the course index, ask questions and evaluate retrieval")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = CONFIG_FILE_ENV, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the configured sources and persist a fresh index
    Build {
        /// Rebuild even if a persisted index already exists
        #[arg(long)]
        force: bool,
    },
    /// Answer a question from the indexed course data
    Ask {
        question: String,

        /// Keywords that must appear in the retrieved documents, when any match
        #[arg(long)]
        body_search: Option<String>,
    },
    /// Measure retrieval precision and recall against a labeled query set
    Evaluate {
        labeled_set: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let settings = Settings::load_from(&args.config).context("failed to load settings")?;

    match args.command {
        Command::Build { force } => build(settings, force).await,
        Command::Ask { question, body_search } => ask(settings, &question, body_search.as_deref()).await,
        Command::Evaluate { labeled_set } => evaluate(settings, labeled_set).await,
    }
}

async fn build(settings: Settings, force: bool) -> Result<()> {
    let index_path = settings.index_path();
    if !force {
        if let Ok(existing) = VectorIndex::load(&index_path) {
            if !existing.is_empty() {
                println!("Index already exists at {} (use --force to rebuild)", index_path.display());
                return Ok(());
            }
        }
    }

    println!("Initializing embedding model...");
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(settings.embedding.build()?);

    let sources = settings.source_specs();
    println!("Loading {} sources...", sources.len());
    let mut report = ingest(sources.clone(), settings.chunking).await?;
    let documents = std::mem::take(&mut report.documents);
    println!("Loaded {} documents", documents.len());
    if documents.is_empty() {
        anyhow::bail!(
            "no documents loaded from {} configured sources ({} missing, {} failed); nothing to index",
            sources.len(),
            report.missing_sources.len(),
            report.failed_sources.len()
        );
    }

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("embedding");

    let index = VectorIndex::build_with_progress(documents, embedder.as_ref(), settings.index.batch_size, |n| {
        pb.inc(n as u64)
    })
    .await?;
    pb.finish_with_message("done");

    index
        .save(&index_path)
        .with_context(|| format!("failed to save index to {}", index_path.display()))?;

    println!("\nIndexing complete!");
    println!("  Sources loaded:  {}/{}", report.loaded_sources, sources.len());
    println!("  Sources missing: {}", report.missing_sources.len());
    println!("  Sources failed:  {}", report.failed_sources.len());
    println!("  Records dropped: {}", report.dropped_records);
    println!("  Index entries:   {}", index.len());
    println!("  Dimension:       {}", index.dimension());
    println!("  Index path:      {}", index_path.display());

    if !report.missing_sources.is_empty() {
        println!("\nMissing sources:");
        for path in &report.missing_sources {
            println!("  {}", path.display());
        }
    }
    if !report.failed_sources.is_empty() {
        println!("\nFailed sources:");
        for (path, err) in &report.failed_sources {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}

async fn ask(settings: Settings, question: &str, body_search: Option<&str>) -> Result<()> {
    let advisor = CourseAdvisor::from_settings(settings).await?;
    let answer = advisor.answer_query(question, body_search).await?;

    println!("{}\n", answer.answer);
    if !answer.retrieved_courses.is_empty() {
        println!("Retrieved courses:");
        for course in &answer.retrieved_courses {
            println!(
                "  {:>6.3}  {:<12} {:<40} {} | {}",
                course.score, course.code, course.title, course.professor, course.time
            );
        }
    }
    println!("\nResponse time: {:.2}s", answer.elapsed_secs);
    Ok(())
}

async fn evaluate(settings: Settings, labeled_set: PathBuf) -> Result<()> {
    let results_file = settings.evaluation.results_file.clone();
    let advisor = CourseAdvisor::from_settings(settings).await?;
    let report = advisor.evaluate_file(&labeled_set).await?;

    for record in &report.records {
        println!(
            "{:<50} precision {:.2}  recall {:.2}  latency {:.2}s",
            record.query, record.precision, record.recall, record.latency_secs
        );
    }
    println!(
        "\nMean precision {:.3}, recall {:.3}, latency {:.2}s over {} queries",
        report.mean_precision,
        report.mean_recall,
        report.mean_latency_secs,
        report.records.len()
    );
    println!("Results saved to {}", results_file.display());
    Ok(())
}
