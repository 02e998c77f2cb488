//! Bounded transcription scheduler

use crate::client::InferenceClient;
use crate::corpus::CorpusItem;
use crate::error::OutcomeError;
use crate::outcome::{BatchOutcomes, BatchProgress, Transcription, TranscriptionOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

/// Dispatches one inference request per corpus item.
///
/// Two ceilings hold at once: the scheduler's own admission gate caps how many items
/// are active, and the client's connection gate caps open connections. All items are
/// queued up front; waiters are admitted in FIFO order.
pub struct TranscriptionScheduler {
    client: InferenceClient,
    concurrency_limit: usize,
}

impl TranscriptionScheduler {
    pub fn new(client: InferenceClient, concurrency_limit: usize) -> Self {
        Self {
            client,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Upper bound on requests actually on the wire at once
    pub fn effective_parallelism(&self) -> usize {
        self.concurrency_limit.min(self.client.connection_limit())
    }

    /// Transcribe every item and wait for all of them.
    ///
    /// Returns exactly one outcome per item. Failures never escape as errors; they are
    /// recorded as error outcomes. When `progress` is given, one event is sent per
    /// finished item.
    pub async fn run(
        &self,
        items: Vec<CorpusItem>,
        progress: Option<mpsc::UnboundedSender<BatchProgress>>,
    ) -> BatchOutcomes {
        let total = items.len();
        let gate = Semaphore::new(self.concurrency_limit);

        debug!(
            "Scheduling {} items (concurrency {}, connections {}, at most {} on the wire)",
            total,
            self.concurrency_limit(),
            self.client.connection_limit(),
            self.effective_parallelism()
        );

        let mut pending: FuturesUnordered<_> = items
            .iter()
            .map(|item| self.transcribe_gated(&gate, item))
            .collect();

        let mut outcomes = BatchOutcomes::new();
        let mut completed = 0;
        while let Some(outcome) = pending.next().await {
            completed += 1;
            if let Some(sender) = &progress {
                // The receiver may be gone; progress is best-effort
                let _ = sender.send(BatchProgress {
                    completed,
                    total,
                    filename: outcome.filename.clone(),
                    succeeded: outcome.is_success(),
                });
            }
            outcomes.insert(outcome);
        }

        info!("Completed {} transcription tasks", completed);
        outcomes
    }

    async fn transcribe_gated(&self, gate: &Semaphore, item: &CorpusItem) -> TranscriptionOutcome {
        // Held until this function returns, whatever the result
        let _permit = match gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return TranscriptionOutcome {
                    filename: item.filename.clone(),
                    result: Err(OutcomeError::Transport(e.to_string())),
                }
            }
        };

        let result = self.transcribe_one(item).await;
        if let Err(err) = &result {
            error!("Failed to transcribe {} : {}", item.filename, err);
        }

        TranscriptionOutcome {
            filename: item.filename.clone(),
            result,
        }
    }

    async fn transcribe_one(&self, item: &CorpusItem) -> Result<Transcription, OutcomeError> {
        let audio = tokio::fs::read(&item.path)
            .await
            .map_err(|e| OutcomeError::Read(e.to_string()))?;
        self.client.transcribe(&item.filename, audio).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use rstest::rstest;

    #[rstest]
    #[case(10, 2, 2)]
    #[case(3, 10, 3)]
    #[case(0, 4, 1)]
    fn test_effective_parallelism(
        #[case] concurrency: usize,
        #[case] connections: usize,
        #[case] expected: usize,
    ) {
        let config = BatchConfig::new().with_connection_limit(connections);
        let client = InferenceClient::new(&config).unwrap();
        let scheduler = TranscriptionScheduler::new(client, concurrency);

        assert_eq!(scheduler.concurrency_limit(), concurrency.max(1));
        assert_eq!(scheduler.effective_parallelism(), expected);
    }
}
