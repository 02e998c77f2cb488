//! cvdecode core library
//!
//! Batch-transcribes a directory of audio clips through a remote inference service
//! and merges the transcriptions back into the reference manifest.

pub mod client;
pub mod config;
pub mod corpus;
pub mod error;
pub mod health;
pub mod merger;
pub mod outcome;
pub mod scheduler;

pub use client::InferenceClient;
pub use config::BatchConfig;
pub use corpus::{CorpusItem, CorpusValidator, Manifest, ReferenceRow, ValidatedCorpus};
pub use error::{DecodeError, OutcomeError, Result};
pub use health::{probe_health, HealthStatus};
pub use merger::{merge_rows, MergeSummary, MergedRow, ResultMerger, SENTINEL};
pub use outcome::{BatchOutcomes, BatchProgress, Transcription, TranscriptionOutcome};
pub use scheduler::TranscriptionScheduler;

use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

/// Inputs of a batch run besides the configuration
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory holding the audio files
    pub audio_dir: PathBuf,
    /// Reference manifest
    pub manifest_path: PathBuf,
    /// Where to write the merged dataset; defaults to the manifest itself
    pub output_path: Option<PathBuf>,
}

impl RunOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(audio_dir: P, manifest_path: Q) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            manifest_path: manifest_path.into(),
            output_path: None,
        }
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Summary of a completed batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub health: HealthStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub merge: MergeSummary,
    pub elapsed: Duration,
}

/// Run a complete batch: validate, probe, transcribe, merge.
///
/// Precondition and persistence failures are returned as errors. Per-item failures
/// are not; they end up as marker values in the merged dataset.
pub async fn run_batch(
    config: &BatchConfig,
    options: &RunOptions,
    progress: Option<mpsc::UnboundedSender<BatchProgress>>,
) -> Result<BatchReport> {
    let start = Instant::now();
    config.validate()?;

    let corpus = CorpusValidator::new(&options.audio_dir, &options.manifest_path)
        .with_media_extension(config.media_extension.clone())
        .validate()?;

    let client = InferenceClient::new(config)?;
    let health = probe_health(&client).await;

    let scheduler = TranscriptionScheduler::new(client, config.concurrency_limit);
    let outcomes = scheduler.run(corpus.items, progress).await;

    let mut merger = ResultMerger::new(&options.manifest_path);
    if let Some(output) = &options.output_path {
        merger = merger.with_output(output);
    }
    let merge = merger.merge(&outcomes)?;

    let elapsed = start.elapsed();
    info!("Program duration: {:.2} seconds", elapsed.as_secs_f64());

    Ok(BatchReport {
        health,
        total: outcomes.len(),
        succeeded: outcomes.succeeded(),
        failed: outcomes.failed(),
        merge,
        elapsed,
    })
}
