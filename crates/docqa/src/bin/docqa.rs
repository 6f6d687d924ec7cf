//! docqa command-line interface
//!
//! Run with: cargo run -p docqa -- ingest && cargo run -p docqa -- ask

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docqa::config::{EmbeddingBackend, RagConfig};
use docqa::providers::{embedder_from_config, LlmProvider, OllamaLlm};
use docqa::retrieval::IndexManifest;
use docqa::{Answer, IngestPipeline, QaSession, RetrievalQa, VectorIndex};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "Ask questions about a folder of documents", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the corpus folder
    Ingest {
        /// Corpus folder
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Where to write the index bundle
        #[arg(short, long)]
        index: Option<PathBuf>,
        /// Maximum chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Overlap between consecutive chunks in characters
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Answer questions from the index
    Ask {
        /// Index bundle to load
        #[arg(short, long)]
        index: Option<PathBuf>,
        /// Number of chunks used as context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Answer one question and exit instead of starting the prompt
        #[arg(short, long)]
        question: Option<String>,
    },
    /// Summarize an index bundle
    Inspect {
        /// Index bundle to load
        #[arg(short, long)]
        index: Option<PathBuf>,
        /// Print this many chunk previews
        #[arg(short, long, default_value = "0")]
        samples: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so answers on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = RagConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            data_dir,
            index,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(dir) = data_dir {
                config.corpus.data_dir = dir;
            }
            if let Some(path) = index {
                config.vector_db.storage_path = path;
            }
            if let Some(size) = chunk_size {
                config.chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.chunking.chunk_overlap = overlap;
            }
            config.validate()?;
            ingest(&config).await
        }
        Commands::Ask {
            index,
            top_k,
            question,
        } => {
            if let Some(path) = index {
                config.vector_db.storage_path = path;
            }
            if let Some(k) = top_k {
                config.retrieval.top_k = k;
            }
            config.validate()?;
            ask(&config, question).await
        }
        Commands::Inspect { index, samples } => {
            let path = index.unwrap_or_else(|| config.vector_db.storage_path.clone());
            inspect(&path, samples)
        }
    }
}

async fn ingest(config: &RagConfig) -> anyhow::Result<()> {
    let embedder = embedder_from_config(config)?;
    if config.embeddings.provider == EmbeddingBackend::Ollama {
        warn_if_ollama_down(embedder.health_check().await?, config);
    }

    let pipeline = IngestPipeline::from_config(config, Arc::clone(&embedder))?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} embedding [{bar:40}] {pos}/{len} chunks ({eta})")?
            .progress_chars("=>-"),
    );
    let summary = pipeline
        .run(
            &config.corpus.data_dir,
            config.corpus.recursive,
            &config.vector_db.storage_path,
            |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            },
        )
        .await
        .with_context(|| {
            format!(
                "Ingestion of '{}' failed",
                config.corpus.data_dir.display()
            )
        })?;
    bar.finish_and_clear();

    for skipped in &summary.skipped {
        println!(
            "{} {} ({})",
            style("skipped").yellow(),
            skipped.path.display(),
            skipped.reason
        );
    }
    println!(
        "{} {} files, {} documents, {} chunks -> {}",
        style("Indexed").green().bold(),
        summary.files_loaded,
        summary.documents,
        summary.chunks,
        config.vector_db.storage_path.display()
    );
    Ok(())
}

async fn ask(config: &RagConfig, question: Option<String>) -> anyhow::Result<()> {
    let index = VectorIndex::load(&config.vector_db.storage_path).with_context(|| {
        format!(
            "Could not load the index; run `docqa ingest` first (looked in '{}')",
            config.vector_db.storage_path.display()
        )
    })?;

    let embedder = embedder_from_config(config)?;
    if let Some(dims) = index.dimensions() {
        anyhow::ensure!(
            dims == embedder.dimensions(),
            "Index has {}-dimensional vectors but the {} embedder produces {}",
            dims,
            embedder.name(),
            embedder.dimensions()
        );
    }

    let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::new(&config.llm)?);
    warn_if_ollama_down(llm.health_check().await?, config);

    let qa = RetrievalQa::new(Arc::new(index), embedder, llm, config.retrieval.top_k);

    if let Some(question) = question {
        let answer = qa.ask(&question).await?;
        println!("{}", styled_answer(&answer));
        return Ok(());
    }

    let stdin = std::io::stdin();
    let mut session = QaSession::new(qa, stdin.lock(), std::io::stdout())
        .with_prompt(format!("{} ", style("Question:").cyan().bold()))
        .with_formatter(styled_answer);
    let stats = session.run().await?;
    tracing::info!(
        answered = stats.answered,
        failed = stats.failed,
        "Session finished"
    );
    Ok(())
}

fn inspect(path: &Path, samples: usize) -> anyhow::Result<()> {
    let manifest = IndexManifest::read(path)?;
    let index = VectorIndex::load(path)?;

    println!("{}", style(path.display()).bold());
    println!("  created:    {}", manifest.created_at.to_rfc3339());
    println!("  metric:     {}", index.metric());
    println!(
        "  dimensions: {}",
        index
            .dimensions()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  records:    {}", index.len());

    let counts = index.source_counts();
    if !counts.is_empty() {
        println!("\n{}", style("Chunks per source").bold());
        for (source, count) in &counts {
            println!("  {:>6}  {}", count, source);
        }
    }

    if samples > 0 {
        println!("\n{}", style("Samples").bold());
        for record in index.records().iter().take(samples) {
            let preview: String = record.text.chars().take(80).collect();
            println!(
                "  #{:<5} {}",
                record.id,
                preview.replace('\n', " ")
            );
        }
    }
    Ok(())
}

fn styled_answer(answer: &Answer) -> String {
    let mut out = format!("\n{} {}\n", style("Answer:").green().bold(), answer.answer);
    if !answer.sources.is_empty() {
        out.push_str(&format!("\n{}\n", style("Sources:").dim()));
        for (i, source) in answer.sources.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} {}\n",
                i + 1,
                source.format_inline(),
                style(format!("({:.3})", source.score)).dim()
            ));
        }
    }
    out
}

fn warn_if_ollama_down(healthy: bool, config: &RagConfig) {
    if healthy {
        tracing::info!("Ollama is running at {}", config.llm.base_url);
        return;
    }
    tracing::warn!("Ollama not available at {}", config.llm.base_url);
    tracing::warn!("Please start Ollama:");
    tracing::warn!("  1. Install: https://ollama.com/download");
    tracing::warn!("  2. Start: ollama serve");
    tracing::warn!(
        "  3. Pull models: ollama pull {} && ollama pull {}",
        config.embeddings.model,
        config.llm.generate_model
    );
}
