mod config;
mod errors;
mod extraction;
mod fields;
mod llm_client;
mod loader;
mod pipeline;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::fields::FieldSet;
use crate::llm_client::{OllamaClient, TextGenerator};
use crate::pipeline::{RunRequest, RunSummary};

/// Extract structured fields from a folder of resumes with a local LLM.
#[derive(Debug, Parser)]
#[command(name = "extractor", version, about)]
struct Cli {
    /// Folder containing .pdf, .docx and .txt resumes
    #[arg(short, long)]
    input: PathBuf,

    /// Results CSV; existing rows are kept and their files skipped
    #[arg(short, long, default_value = "results.csv")]
    output: PathBuf,

    /// Field specification file (TOML); built-in fields when omitted
    #[arg(short, long)]
    fields: Option<PathBuf>,

    /// Job description file (.pdf, .docx or .txt) for fitment fields
    #[arg(short, long)]
    job_description: Option<PathBuf>,

    /// Skills to assess, comma separated; adds one column per skill
    #[arg(short, long, value_delimiter = ',')]
    skills: Vec<String>,

    /// Model name; overrides the field file and OLLAMA_MODEL
    #[arg(short, long)]
    model: Option<String>,

    /// Documents processed in parallel; overrides MAX_CONCURRENCY
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Per-call LLM timeout in seconds; overrides LLM_TIMEOUT_SECS
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting resume extractor v{}", env!("CARGO_PKG_VERSION"));

    let fields = match &cli.fields {
        Some(path) => FieldSet::load(path)?,
        None => FieldSet::builtin(cli.job_description.is_some()),
    }
    .with_skills(&cli.skills)?;
    info!(
        "Extracting {} fields: {}",
        fields.len(),
        fields.names().collect::<Vec<_>>().join(", ")
    );

    let model = cli
        .model
        .clone()
        .or_else(|| fields.model().map(str::to_string))
        .unwrap_or_else(|| config.model.clone());
    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or(config.llm_timeout_secs));
    let max_concurrency = cli.concurrency.unwrap_or(config.max_concurrency).max(1);

    // Initialize LLM client
    let client = OllamaClient::new(&config.ollama_base_url, timeout)
        .context("Failed to build the Ollama HTTP client")?;
    info!(
        "LLM client initialized (model: {}, endpoint: {})",
        model,
        client.base_url()
    );
    let generator: Arc<dyn TextGenerator> = Arc::new(client);

    let request = RunRequest {
        input_dir: cli.input.clone(),
        sink_path: cli.output.clone(),
        job_description_path: cli.job_description.clone(),
        model,
        call_timeout: timeout,
        max_concurrency,
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight documents");
        } else {
            std::future::pending::<()>().await;
        }
    };

    let summary = pipeline::run_until(&request, &fields, generator, shutdown).await?;
    report(&summary, cli.json)?;
    Ok(())
}

fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    info!(
        "Documents: {} discovered, {} already processed, {} processed, {} failed, {} ignored",
        summary.discovered,
        summary.already_processed,
        summary.processed,
        summary.failed,
        summary.ignored
    );
    info!(
        "Fields: {} extracted, {} absent, {} unparseable, {} failed ({} LLM calls)",
        summary.fields.extracted,
        summary.fields.absent,
        summary.fields.unparseable,
        summary.fields.failed,
        summary.fields.llm_calls
    );
    if summary.interrupted {
        warn!(
            "Run interrupted; {} documents not started, rerun to resume",
            summary.not_started
        );
    }
    Ok(())
}
