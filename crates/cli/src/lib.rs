use anyhow::{bail, Context as AnyhowContext, Result};
use ashguard_knowledge::{BuildOptions, BuildStatus, HttpFetcher, KnowledgeBaseBuilder, SourceList};
use ashguard_retrieval::{InitStrategy, RetrievalService, RetrievedChunk};
use ashguard_vector_store::{EmbeddingMode, EmbeddingModel, VectorIndex};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod answer;
mod config;
mod http;
mod limiter;
mod providers;

pub use answer::{build_prompt, cited_sources, compose_answer, Answer, AnswerEngine, AskError};
pub use config::{AppConfig, LlmConfig, ServerConfig};
pub use http::{router, AppState};
pub use limiter::RollingWindowLimiter;
pub use providers::{AnthropicProvider, LlmProvider, ProviderRequest};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "ashguard")]
#[command(about = "Wildfire health Q&A grounded on a local knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (overrides ASHGUARD_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory (overrides ASHGUARD_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Model directory (overrides ASHGUARD_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sources, chunk them and populate the index
    Build(BuildArgs),

    /// Answer one question from the command line
    Ask(AskArgs),

    /// Serve the ask API over HTTP
    Serve(ServeArgs),

    /// Show what is on disk in the data directory
    Status,
}

#[derive(Args)]
struct BuildArgs {
    /// Re-embed even if the index is already populated
    #[arg(long)]
    force: bool,

    /// TOML file with `urls = [...]` (defaults to the configured sources)
    #[arg(long)]
    sources: Option<PathBuf>,
}

#[derive(Args)]
struct AskArgs {
    /// Question to answer
    question: String,

    /// Number of passages to retrieve
    #[arg(short)]
    k: Option<usize>,

    /// Print retrieved passages without calling the LLM
    #[arg(long)]
    retrieve_only: bool,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ServeArgs {
    /// Listen host (default 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, value_enum)]
    init_strategy: Option<InitStrategyFlag>,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Onnx,
    Stub,
}

impl EmbedMode {
    const fn as_domain(self) -> EmbeddingMode {
        match self {
            Self::Onnx => EmbeddingMode::Onnx,
            Self::Stub => EmbeddingMode::Stub,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum InitStrategyFlag {
    Eager,
    Lazy,
    Background,
}

impl InitStrategyFlag {
    const fn as_domain(self) -> InitStrategy {
        match self {
            Self::Eager => InitStrategy::Eager,
            Self::Lazy => InitStrategy::Lazy,
            Self::Background => InitStrategy::Background,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT logs every session option at info
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.service.data_dir = dir;
    }
    if let Some(mode) = cli.embed_mode {
        config.service.embedding.mode = mode.as_domain();
    }
    if let Some(dir) = cli.model_dir {
        config.service.embedding.model_dir = dir;
    }

    match cli.command {
        Commands::Build(args) => run_build(args, config).await,
        Commands::Ask(args) => run_ask(args, config).await,
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::Status => run_status(config).await,
    }
}

fn load_embedder(config: &AppConfig) -> Result<Arc<EmbeddingModel>> {
    let embedder = EmbeddingModel::from_config(&config.service.embedding)
        .context("Failed to initialize embedding model")?;
    Ok(Arc::new(embedder))
}

fn load_service(config: &AppConfig) -> Result<RetrievalService> {
    let fetcher = HttpFetcher::new().context("Failed to build HTTP fetcher")?;
    RetrievalService::new(
        config.service.clone(),
        load_embedder(config)?,
        Arc::new(fetcher),
    )
    .context("Invalid retrieval configuration")
}

fn load_llm(config: &AppConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    let Some(api_key) = config.llm.api_key.clone() else {
        return Ok(None);
    };
    let provider = AnthropicProvider::new(
        api_key,
        config.llm.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    Ok(Some(Arc::new(provider)))
}

async fn run_build(args: BuildArgs, config: AppConfig) -> Result<()> {
    let urls = match &args.sources {
        Some(path) => {
            SourceList::load(path)
                .await
                .with_context(|| format!("Failed to load sources {}", path.display()))?
                .urls
        }
        None => config.service.sources.clone(),
    };
    if urls.is_empty() {
        bail!("No source URLs configured");
    }

    let embedder = load_embedder(&config)?;
    let builder =
        KnowledgeBaseBuilder::new(config.service.artifact_paths(), config.service.build.clone())
            .context("Invalid build configuration")?;
    let fetcher = HttpFetcher::new().context("Failed to build HTTP fetcher")?;

    let outcome = builder
        .build(
            &urls,
            Arc::new(fetcher),
            embedder.as_ref(),
            BuildOptions {
                force_reindex: args.force,
            },
        )
        .await
        .context("Knowledge base build failed")?;

    print_stdout(&serde_json::to_string_pretty(&outcome.report)?)?;
    if outcome.report.status == BuildStatus::Empty {
        bail!(
            "No documents fetched from {} source(s); knowledge base unchanged",
            urls.len()
        );
    }
    Ok(())
}

async fn run_ask(args: AskArgs, mut config: AppConfig) -> Result<()> {
    let question = args.question.trim().to_string();
    if question.is_empty() {
        bail!("Question is empty");
    }
    let k = args.k.unwrap_or(config.service.default_k);

    config.service.init_strategy = InitStrategy::Eager;
    let service = load_service(&config)?;
    service
        .start()
        .await
        .context("Knowledge base is not available")?;

    let llm = if args.retrieve_only {
        None
    } else {
        let llm = load_llm(&config)?;
        if llm.is_none() {
            log::warn!("ANTHROPIC_API_KEY is not set; showing retrieved passages only");
        }
        llm
    };

    let Some(llm) = llm else {
        let chunks = service.retrieve(&question, k).await?;
        return print_passages(&chunks, args.json);
    };

    let engine = AnswerEngine::new(service, llm, k, config.llm.max_tokens);
    let answer = engine.ask(&question).await?;
    if args.json {
        print_stdout(&serde_json::to_string_pretty(&answer)?)
    } else {
        print_stdout(&answer.answer)
    }
}

fn print_passages(chunks: &[RetrievedChunk], as_json: bool) -> Result<()> {
    if as_json {
        return print_stdout(&serde_json::to_string_pretty(chunks)?);
    }
    if chunks.is_empty() {
        return print_stdout("No relevant passages found.");
    }
    for (rank, chunk) in chunks.iter().enumerate() {
        print_stdout(&format!(
            "[{}] {:.3} {}\n{}\n",
            rank + 1,
            chunk.score,
            chunk.url,
            chunk.text
        ))?;
    }
    Ok(())
}

async fn run_serve(args: ServeArgs, mut config: AppConfig) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(strategy) = args.init_strategy {
        config.service.init_strategy = strategy.as_domain();
    }

    let Some(llm) = load_llm(&config)? else {
        bail!("ANTHROPIC_API_KEY is required to serve answers");
    };

    let service = load_service(&config)?;
    if let Err(err) = service.start().await {
        // Failed stays observable through /health and 503s
        log::error!("Knowledge base initialization failed: {err}");
    }

    let state = Arc::new(AppState {
        engine: AnswerEngine::new(
            service,
            llm,
            config.service.default_k,
            config.llm.max_tokens,
        ),
        limiter: RollingWindowLimiter::new(
            config.server.rate_limit_requests,
            config.server.rate_limit_window(),
        ),
        retry_after_secs: config.server.retry_after_secs,
    });
    http::serve(&config.server.bind_addr(), state).await
}

async fn run_status(config: AppConfig) -> Result<()> {
    let paths = config.service.artifact_paths();
    let builder = KnowledgeBaseBuilder::new(paths.clone(), config.service.build.clone())
        .context("Invalid build configuration")?;

    let manifest = builder.load_manifest().await?;
    let index = VectorIndex::load_if_present(&paths.index)
        .await
        .with_context(|| format!("Failed to read index {}", paths.index.display()))?;

    let status = json!({
        "data_dir": paths.data_dir,
        "manifest_chunks": manifest.as_ref().map_or(0, |m| m.chunk_count()),
        "manifest_sources": manifest.as_ref().map_or(0, |m| m.urls().len()),
        "index_records": index.as_ref().map_or(0, VectorIndex::count),
        "index_model": index.as_ref().map(|i| i.model_id().to_string()),
        "configured_sources": config.service.sources.len(),
    });
    print_stdout(&serde_json::to_string_pretty(&status)?)
}
