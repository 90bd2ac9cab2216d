//! Retrieval-augmented answering pipeline.
//!
//! Pipeline flow, one record at a time:
//! Question → passage lookup (first topic entity) → prompt → completion → JSONL

use crate::client::{Completer, MultiEndpointClient, SamplingParams};
use crate::models::{
    FailurePolicy, QuestionRecord, Result, ResultRecord, RunStats, WikiragError,
};
use crate::pipeline::{PromptBuilder, ResultLog};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Driver knobs that are not part of the remote clients.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub failure_policy: FailurePolicy,
    pub record_retries: u32,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Skip,
            record_retries: 0,
            show_progress: false,
        }
    }
}

/// Sequential RAG pipeline over a dataset.
pub struct RagPipeline {
    lookup: Arc<MultiEndpointClient>,
    completer: Arc<dyn Completer>,
    prompt: PromptBuilder,
    sampling: SamplingParams,
    options: RunOptions,
    shutdown: Arc<AtomicBool>,
}

impl RagPipeline {
    pub fn new(
        lookup: Arc<MultiEndpointClient>,
        completer: Arc<dyn Completer>,
        prompt: PromptBuilder,
        sampling: SamplingParams,
        options: RunOptions,
    ) -> Self {
        Self {
            lookup,
            completer,
            prompt,
            sampling,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the run before the next record once set.
    ///
    /// The record in flight, including its log append, always completes.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Answer one record: lookup, prompt, completion.
    pub async fn process_record(&self, record: &QuestionRecord) -> Result<ResultRecord> {
        let entity = record.primary_entity().ok_or_else(|| {
            WikiragError::InvalidInput(format!("record {} has no topic entity", record.index))
        })?;

        let passage = self.lookup.fetch_passage(entity).await?;
        debug!(
            record = record.index,
            entity,
            passage_len = passage.len(),
            "Retrieved passage"
        );

        let prompt = self.prompt.build(&record.question, &passage);
        let completion = self.completer.complete(&prompt, &self.sampling).await?;

        Ok(ResultRecord::new(record, completion))
    }

    /// Process one record, re-running it on recoverable failures.
    async fn process_with_retries(
        &self,
        record: &QuestionRecord,
        stats: &mut RunStats,
    ) -> Result<ResultRecord> {
        let mut attempt = 0;
        loop {
            match self.process_record(record).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_recoverable() && attempt < self.options.record_retries => {
                    attempt += 1;
                    stats.retries += 1;
                    warn!(
                        record = record.index,
                        attempt,
                        max = self.options.record_retries,
                        error = %e,
                        "Retrying record"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run every record in order, appending successes to `log`.
    pub async fn run(&self, records: Vec<QuestionRecord>, log: &mut ResultLog) -> Result<RunStats> {
        let start = Instant::now();
        let total = records.len();

        info!(
            total_records = total,
            endpoints = self.lookup.pool().size(),
            attempt_timeout_secs = self.lookup.attempt_timeout().as_secs(),
            model = %self.sampling.model,
            policy = ?self.options.failure_policy,
            output = %log.path().display(),
            "Starting RAG pipeline"
        );

        let pb = if self.options.show_progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                    .map_err(|e| WikiragError::Internal(format!("Invalid progress template: {e}")))?
                    .progress_chars("##-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut stats = RunStats {
            total_records: total,
            ..Default::default()
        };

        for record in records {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!(
                    remaining = total - stats.written - stats.skipped,
                    "Interrupted, stopping before next record"
                );
                stats.interrupted = true;
                break;
            }

            match self.process_with_retries(&record, &mut stats).await {
                Ok(result) => {
                    log.append(&result)?;
                    stats.written += 1;
                }
                Err(e) if e.is_fatal() => {
                    error!(record = record.index, error = %e, "Fatal error, aborting run");
                    pb.abandon_with_message("aborted");
                    return Err(e);
                }
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::Skip => {
                        warn!(record = record.index, error = %e, "Skipping record");
                        stats.skipped += 1;
                    }
                    FailurePolicy::Abort => {
                        error!(record = record.index, error = %e, "Record failed, aborting run");
                        pb.abandon_with_message("aborted");
                        return Err(e);
                    }
                },
            }

            pb.inc(1);
            pb.set_message(format!("written: {}, skipped: {}", stats.written, stats.skipped));
        }

        pb.finish_with_message(format!(
            "Done! {} written, {} skipped",
            stats.written, stats.skipped
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        info!(
            written = stats.written,
            skipped = stats.skipped,
            retries = stats.retries,
            interrupted = stats.interrupted,
            throughput = format!("{:.0}/hr", stats.throughput_per_hour),
            "RAG pipeline complete"
        );

        Ok(stats)
    }
}
