use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};
use wikiqa_core::config::EngineConfig;
use wikiqa_core::corpus::read_corpus;
use wikiqa_core::engine::QueryEngine;
use wikiqa_core::eval::evaluate;
use wikiqa_core::index::{self, CancelToken, Index};
use wikiqa_core::persist::{clear_index, index_exists, load_index, save_index, IndexPaths};
use wikiqa_core::questions::load_questions;
use wikiqa_core::similarity::TfIdfSimilarity;

#[derive(Parser)]
#[command(name = "wikiqa-indexer")]
#[command(about = "Build a wiki index and answer quiz questions against it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of corpus shards
    Build {
        /// Corpus directory
        #[arg(long)]
        corpus: PathBuf,
        /// Output index directory, replaced if present
        #[arg(long)]
        output: PathBuf,
        /// Index builder threads (default 2)
        #[arg(long)]
        workers: Option<usize>,
        /// JSON engine configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Answer a questions file and report accuracy, top-k hits and MRR
    Answer {
        /// Questions file: category, question, answer, separator
        #[arg(long)]
        questions: PathBuf,
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Corpus directory, needed when the index is missing or --rebuild is set
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Rebuild the index even if it already exists
        #[arg(long, default_value_t = false)]
        rebuild: bool,
        /// Choose the final answer by matching the question against candidate leads
        #[arg(long, default_value_t = false)]
        summary_rerank: bool,
        /// First-pass candidates to retrieve
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, workers, config } => {
            let cfg = load_config(config.as_deref(), workers, None)?;
            build_index(&corpus, &output, &cfg).map(|_| ())
        }
        Commands::Answer { questions, index, corpus, rebuild, summary_rerank, k, workers, config } => {
            let mut cfg = load_config(config.as_deref(), workers, k)?;
            cfg.summary_rerank |= summary_rerank;
            answer_questions(&questions, &index, corpus.as_deref(), rebuild, cfg)
        }
    }
}

fn load_config(path: Option<&Path>, workers: Option<usize>, k: Option<usize>) -> Result<EngineConfig> {
    let mut cfg = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    if let Some(w) = workers { cfg.workers = w; }
    if let Some(k) = k { cfg.first_pass_k = k; }
    cfg.validate()
}

fn build_index(corpus: &Path, output: &Path, cfg: &EngineConfig) -> Result<Index> {
    let out_paths = IndexPaths::new(output);
    let docs = read_corpus(corpus)?;
    let built = index::build(docs, Arc::new(TfIdfSimilarity), cfg.workers, &CancelToken::new())?;
    clear_index(&out_paths)?;
    save_index(&out_paths, &built, cfg.workers)?;
    tracing::info!(output = %output.display(), "index build complete");
    Ok(built)
}

fn answer_questions(questions: &Path, index_dir: &Path, corpus: Option<&Path>, rebuild: bool, cfg: EngineConfig) -> Result<()> {
    let paths = IndexPaths::new(index_dir);
    let index = if rebuild || !index_exists(&paths) {
        let Some(corpus) = corpus else {
            bail!("index {} needs building but no --corpus was given", index_dir.display());
        };
        build_index(corpus, index_dir, &cfg)?
    } else {
        load_index(&paths)?
    };
    let questions = load_questions(questions)?;

    let engine = QueryEngine::new(Arc::new(index), cfg);
    let predictions = engine.answer_all(&questions);
    for (q, p) in questions.iter().zip(&predictions) {
        println!("{}", p.answer);
        println!("{}", q.answer);
    }
    let evaluation = evaluate(&questions, &predictions);
    println!("{evaluation}");
    tracing::info!(
        correct = evaluation.correct,
        total = evaluation.total,
        mrr = evaluation.mrr,
        "evaluation complete"
    );
    Ok(())
}
