use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ai_changelog::config::normalize_endpoint;
use ai_changelog::git::CommitOrder;
use ai_changelog::{
    ChangelogPipeline, Config, Error, GitCommitSource, OllamaProvider, OutputFormat,
    PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(name = "ai-changelog")]
#[command(version)]
#[command(about = "Generates changelogs from git history using a local LLM via Ollama")]
struct Args {
    /// Older revision; its history is excluded (defaults to the full history)
    from: Option<String>,

    /// Newer revision to summarize up to
    #[arg(default_value = "HEAD")]
    to: String,

    /// Repository path
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// Ollama model name [default: llama3.2]
    #[arg(short, long, env = "AI_CHANGELOG_MODEL")]
    model: Option<String>,

    /// Ollama endpoint [default: http://localhost:11434]
    #[arg(short, long, env = "OLLAMA_HOST")]
    endpoint: Option<String>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (markdown, plain)
    #[arg(short, long, default_value = "markdown")]
    format: OutputFormat,

    /// Release label shown in the changelog title
    #[arg(long)]
    release: Option<String>,

    /// Token budget per model call [default: 6000]
    #[arg(long)]
    max_batch_tokens: Option<usize>,

    /// Context window of the model in tokens [default: 8192]
    #[arg(long)]
    context_tokens: Option<usize>,

    /// Number of batches sent to the model at once [default: 1]
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds [default: 60]
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries after a timeout or connection failure
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Sampling temperature
    #[arg(long, default_value = "0.2")]
    temperature: f32,

    /// Maximum tokens the model may generate per batch
    #[arg(long, default_value = "1024")]
    max_response_tokens: u32,

    /// List newest commits first
    #[arg(long)]
    newest_first: bool,

    /// Skip the model and group commits by conventional-commit prefix
    #[arg(long)]
    offline: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    if let Err(e) = init_logging(&args) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("ai_changelog={}", level).parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    // Load configuration
    let config = Config::from_env()?;
    let pipeline_config = build_pipeline_config(&args, &config);

    // Initialize clients
    let source = GitCommitSource::new(&pipeline_config.repo_path);
    let context_tokens = args.context_tokens.unwrap_or(config.context_tokens);
    let llm = OllamaProvider::new(pipeline_config.endpoint.clone(), pipeline_config.retry.timeout)?
        .with_context_limit(context_tokens);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            signal_token.cancel();
        }
    });

    let mut pipeline = ChangelogPipeline::new(Arc::new(source), Arc::new(llm), pipeline_config)
        .with_cancellation(cancel);

    let outcome = pipeline.run().await?;

    if !outcome.is_complete() {
        tracing::error!(
            "{} of {} batches failed; the changelog is incomplete",
            outcome.failures().len(),
            outcome.batch_count
        );
        for failure in outcome.failures() {
            tracing::error!("  {}", failure);
        }
        return Ok(ExitCode::from(1));
    }

    Ok(ExitCode::SUCCESS)
}

fn build_pipeline_config(args: &Args, config: &Config) -> PipelineConfig {
    let mut pipeline_config = PipelineConfig::from(config);

    pipeline_config.repo_path = args.repo.clone();
    pipeline_config.from = args.from.clone();
    pipeline_config.to = args.to.clone();
    if args.newest_first {
        pipeline_config.order = CommitOrder::NewestFirst;
    }
    if let Some(ref model) = args.model {
        pipeline_config.model = model.clone();
    }
    if let Some(ref endpoint) = args.endpoint {
        pipeline_config.endpoint = normalize_endpoint(endpoint);
    }
    if let Some(max_batch_tokens) = args.max_batch_tokens {
        pipeline_config.max_batch_tokens = max_batch_tokens;
    }
    if let Some(concurrency) = args.concurrency {
        pipeline_config.concurrency_limit = concurrency;
    }
    if let Some(timeout) = args.timeout {
        pipeline_config.retry.timeout = Duration::from_secs(timeout);
    }
    pipeline_config.retry.max_retries = args.retries;
    pipeline_config.temperature = args.temperature;
    pipeline_config.max_response_tokens = args.max_response_tokens;
    pipeline_config.format = args.format;
    pipeline_config.release = args.release.clone();
    pipeline_config.output = args.output.clone();
    pipeline_config.offline = args.offline;
    pipeline_config.show_progress = !args.quiet && std::io::stderr().is_terminal();

    pipeline_config
}
