//! Batch Orchestrator: one run over an input folder.
//!
//! Flow: discover → validate fields against the job description → read the
//! prior sink → load + extract every unprocessed document (bounded
//! concurrency) → write the merged sink once.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::discovery::{discover, Discovery};
use crate::errors::AppError;
use crate::extraction::{ExtractionResult, Extractor, FieldStats};
use crate::fields::FieldSet;
use crate::llm_client::TextGenerator;
use crate::loader::{self, document_id};
use crate::sink::CsvSink;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_dir: PathBuf,
    pub sink_path: PathBuf,
    pub job_description_path: Option<PathBuf>,
    /// Model used by fields without their own override.
    pub model: String,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub input_dir: PathBuf,
    pub sink_path: PathBuf,
    pub discovered: usize,
    pub already_processed: usize,
    pub processed: usize,
    pub failed: usize,
    pub ignored: usize,
    /// Documents never started because of shutdown.
    pub not_started: usize,
    pub fields: FieldStats,
    pub rows_written: usize,
    pub elapsed_ms: u64,
    pub interrupted: bool,
}

enum DocumentOutcome {
    Extracted(ExtractionResult),
    Failed,
}

/// Runs the batch to completion.
#[cfg(test)]
pub async fn run(
    request: &RunRequest,
    fields: &FieldSet,
    generator: Arc<dyn TextGenerator>,
) -> Result<RunSummary, AppError> {
    run_until(request, fields, generator, std::future::pending()).await
}

/// Runs the batch until done or until `shutdown` resolves. After shutdown no
/// new documents are started; in-flight ones finish and the sink is written.
pub async fn run_until<F>(
    request: &RunRequest,
    fields: &FieldSet,
    generator: Arc<dyn TextGenerator>,
    shutdown: F,
) -> Result<RunSummary, AppError>
where
    F: Future<Output = ()>,
{
    let discovery = discover(&request.input_dir)?;
    run_discovered(request, fields, generator, discovery, shutdown).await
}

async fn run_discovered<F>(
    request: &RunRequest,
    fields: &FieldSet,
    generator: Arc<dyn TextGenerator>,
    discovery: Discovery,
    shutdown: F,
) -> Result<RunSummary, AppError>
where
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let started_at = Utc::now();

    fields.ensure_job_description(request.job_description_path.is_some())?;
    let job_description = match &request.job_description_path {
        Some(path) => Some(load_job_description(path).await?),
        None => None,
    };

    let sink = CsvSink::new(&request.sink_path);
    let prior = sink.read_prior()?;
    let processed_set = prior.processed_set();
    info!("{} rows already in {}", prior.len(), sink.path().display());

    let discovered = discovery.documents.len();
    let pending: Vec<PathBuf> = discovery
        .documents
        .into_iter()
        .filter(|path| !processed_set.contains(&document_id(path)))
        .collect();
    let already_processed = discovered - pending.len();
    info!(
        "Discovered {} documents in {} ({} already processed, {} ignored)",
        discovered,
        request.input_dir.display(),
        already_processed,
        discovery.ignored
    );

    let extractor = Extractor::new(generator, request.model.clone(), request.call_timeout)
        .with_job_description(job_description);
    let fields_shared = Arc::new(fields.clone());
    let semaphore = Arc::new(Semaphore::new(request.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    let total_pending = pending.len();
    let mut started_count = 0usize;
    let mut interrupted = false;
    tokio::pin!(shutdown);

    for path in pending {
        let permit = tokio::select! {
            biased;
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => permit
                .map_err(|e| AppError::Internal(anyhow::anyhow!("semaphore closed: {e}")))?,
        };

        let extractor = extractor.clone();
        let fields = fields_shared.clone();
        tasks.spawn(async move {
            let _permit = permit;
            process_document(path, &extractor, &fields).await
        });
        started_count += 1;
    }

    if interrupted {
        warn!(
            "Shutdown requested; waiting for {} in-flight documents, {} not started",
            tasks.len(),
            total_pending - started_count
        );
    }

    let mut results = Vec::with_capacity(started_count);
    let mut failed = 0usize;
    let mut field_stats = FieldStats::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(DocumentOutcome::Extracted(result)) => {
                field_stats.merge(&result.stats);
                results.push(result);
            }
            Ok(DocumentOutcome::Failed) => failed += 1,
            Err(e) => {
                error!("Document task panicked: {e}");
                failed += 1;
            }
        }
    }

    let names: Vec<&str> = fields.names().collect();
    let rows_written = sink.write(&names, prior, &results)?;

    let summary = RunSummary {
        started_at,
        input_dir: request.input_dir.clone(),
        sink_path: request.sink_path.clone(),
        discovered,
        already_processed,
        processed: results.len(),
        failed,
        ignored: discovery.ignored,
        not_started: total_pending - started_count,
        fields: field_stats,
        rows_written,
        elapsed_ms: started.elapsed().as_millis() as u64,
        interrupted,
    };
    info!(
        "Run finished in {}ms: {} processed, {} failed, {} rows in {}",
        summary.elapsed_ms,
        summary.processed,
        summary.failed,
        summary.rows_written,
        sink.path().display()
    );
    Ok(summary)
}

async fn load_job_description(path: &Path) -> Result<String, AppError> {
    let owned = path.to_path_buf();
    let document = tokio::task::spawn_blocking(move || loader::load(&owned))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("job description load task failed: {e}")))??;
    info!(
        "Loaded job description {} ({} chars)",
        document.id,
        document.raw_text.len()
    );
    Ok(document.raw_text)
}

async fn process_document(path: PathBuf, extractor: &Extractor, fields: &FieldSet) -> DocumentOutcome {
    let id = document_id(&path);
    let loaded = tokio::task::spawn_blocking(move || loader::load(&path)).await;

    let document = match loaded {
        Ok(Ok(document)) => document,
        Ok(Err(e)) => {
            warn!("Skipping {}: {e}", id);
            return DocumentOutcome::Failed;
        }
        Err(e) => {
            error!("Loading {} panicked: {e}", id);
            return DocumentOutcome::Failed;
        }
    };

    info!(
        "Extracting {} fields from {} ({:?}, {} chars)",
        fields.len(),
        id,
        document.source_format,
        document.raw_text.len()
    );
    let result = extractor.extract_all(&document, fields).await;
    info!(
        "Finished {}: {} extracted, {} sentinel, {} LLM calls",
        id,
        result.stats.extracted,
        result.stats.absent + result.stats.unparseable + result.stats.failed,
        result.stats.llm_calls
    );
    DocumentOutcome::Extracted(result)
}
