mod server;

use anyhow::Context;
use chrono::Utc;
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use ic_rag_core::{
    CharacterNgramEmbedder, CompletionModel, Embedder, FileVectorStore, IngestionOptions,
    OpenAiChatConfig, OpenAiChatModel, OpenAiEmbedder, OpenAiEmbedderConfig, RagPipeline,
    UnconfiguredModel, VectorIndex, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ic-rag", version, about = "Question answering over IC technical manuals")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder holding the PDF manuals to ingest
    #[arg(long, env = "IC_RAG_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Folder holding the persisted vector index
    #[arg(long, env = "IC_RAG_INDEX_DIR", default_value = "./vector_index")]
    index_dir: PathBuf,

    /// Also ingest PDFs in subfolders of the data folder
    #[arg(long, default_value_t = false)]
    recursive: bool,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, default_value_t = 50)]
    chunk_overlap: usize,

    /// Chunks retrieved to ground each answer
    #[arg(long, default_value_t = DEFAULT_TOP_K, value_parser = at_least_one())]
    top_k: usize,

    /// Embedding backend
    #[arg(long, env = "IC_RAG_EMBEDDER", value_enum, default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// Embedding model for the remote backend
    #[arg(long, env = "IC_RAG_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding vector length (sent to the remote backend only when set)
    #[arg(long, env = "IC_RAG_EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Inputs per remote embedding request
    #[arg(long, default_value_t = 32)]
    embedding_batch_size: usize,

    /// Chat completion model
    #[arg(long, env = "IC_RAG_LLM_MODEL", default_value = "deepseek-r1-0528")]
    llm_model: String,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = ic_rag_core::DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Seconds before a completion request is abandoned (no limit when unset)
    #[arg(long, env = "IC_RAG_LLM_TIMEOUT_SECS")]
    llm_timeout_secs: Option<u64>,

    /// API key for the OpenAI-compatible endpoints
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL for the OpenAI-compatible endpoints
    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Local character-trigram hashing
    Ngram,
    /// OpenAI-compatible embeddings endpoint
    Openai,
}

#[derive(Subcommand)]
enum Command {
    /// Delete the vector index and rebuild it from every PDF in the data folder.
    Ingest,
    /// Print the chunks nearest to a query without calling the LLM.
    Search {
        #[arg(long)]
        query: String,
        /// Number of chunks to return (defaults to --top-k)
        #[arg(long, value_parser = at_least_one())]
        top_k: Option<usize>,
    },
    /// Answer one question from the indexed manuals.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Serve the chat API over HTTP.
    Serve {
        #[arg(long, env = "IC_RAG_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        /// Rebuild the index before accepting requests
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
}

fn at_least_one() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    // The remote embedder wraps a blocking HTTP client, which must be built
    // and dropped outside the async runtime.
    let embedder = build_embedder(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(run(cli, Arc::clone(&embedder)));
    drop(runtime);
    drop(embedder);
    result
}

async fn run(cli: Cli, embedder: Arc<dyn Embedder>) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        embedder = %embedder.name(),
        "ic-rag boot"
    );

    let completion = build_completion(&cli)?;
    let index = FileVectorStore::open(&cli.index_dir)
        .await
        .with_context(|| format!("failed to open index at {}", cli.index_dir.display()))?;
    let options = IngestionOptions {
        chunk_max_chars: cli.chunk_size,
        chunk_overlap_chars: cli.chunk_overlap,
        recursive: cli.recursive,
    };
    let pipeline = RagPipeline::new(embedder, completion, index)
        .with_options(options)
        .with_top_k(cli.top_k);

    match cli.command {
        Command::Ingest => {
            let report = pipeline.rebuild(&cli.data_dir).await?;
            println!(
                "{} pages, {} chunks indexed into {} at {}",
                report.documents,
                report.chunks,
                cli.index_dir.display(),
                report.index.built_at.to_rfc3339()
            );
            for skipped in &report.skipped_files {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
        }
        Command::Search { query, top_k } => {
            let k = top_k.unwrap_or(pipeline.top_k());
            let hits = pipeline.search(&query, k).await?;
            println!("query: {query}");
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "[{}] score={:.4} source={} page={}",
                    rank + 1,
                    hit.score,
                    hit.chunk.source,
                    hit.chunk.page_number
                );
                println!("{}", hit.chunk.text);
            }
        }
        Command::Ask { question } => {
            let answer = pipeline.answer(&question).await?;
            println!("question: {question}");
            println!("{}", "-".repeat(50));
            println!("{}", answer.text);
            println!("{}", "-".repeat(50));
            println!("sources:");
            for hit in &answer.sources {
                println!(
                    " - {} p.{}: {}...",
                    hit.chunk.source,
                    hit.chunk.page_number,
                    hit.chunk.text.chars().take(40).collect::<String>()
                );
            }
        }
        Command::Serve { bind, rebuild } => {
            if rebuild {
                let report = pipeline.rebuild(&cli.data_dir).await?;
                info!(chunks = report.chunks, "index rebuilt before serving");
            } else if pipeline.index().describe().await.is_none() {
                warn!(
                    index_dir = %cli.index_dir.display(),
                    "no vector index found; /chat will fail until `ic-rag ingest` runs"
                );
            }
            server::serve(&bind, Arc::new(pipeline)).await?;
        }
    }

    Ok(())
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    match cli.embedder {
        EmbedderKind::Ngram => Ok(Arc::new(CharacterNgramEmbedder {
            dimensions: cli
                .embedding_dimensions
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        })),
        EmbedderKind::Openai => {
            let api_key = cli
                .api_key
                .clone()
                .context("OPENAI_API_KEY is required for the openai embedder")?;
            let embedder = OpenAiEmbedder::new(OpenAiEmbedderConfig {
                api_key,
                base_url: cli.api_base.clone(),
                model: cli.embedding_model.clone(),
                dimensions: cli.embedding_dimensions,
                batch_size: cli.embedding_batch_size,
                timeout: None,
            })?;
            Ok(Arc::new(embedder))
        }
    }
}

fn build_completion(cli: &Cli) -> anyhow::Result<Arc<dyn CompletionModel>> {
    let Some(api_key) = cli.api_key.clone() else {
        return Ok(Arc::new(UnconfiguredModel::new(
            "OPENAI_API_KEY is not set; answers are unavailable",
        )));
    };

    let model = OpenAiChatModel::new(OpenAiChatConfig {
        api_key,
        base_url: cli.api_base.clone(),
        model: cli.llm_model.clone(),
        temperature: cli.temperature,
        max_tokens: None,
        timeout: cli.llm_timeout_secs.map(Duration::from_secs),
    })?;
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(Cli::try_parse_from(["ic-rag", "--top-k", "0", "ingest"]).is_err());
        assert!(Cli::try_parse_from(["ic-rag", "search", "--query", "q", "--top-k", "0"]).is_err());

        let cli = Cli::try_parse_from(["ic-rag", "search", "--query", "q", "--top-k", "2"])
            .expect("top-k of 2 should parse");
        assert!(matches!(cli.command, Command::Search { top_k: Some(2), .. }));
    }
}
