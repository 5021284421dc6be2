//! In-process outbox that delivers finished-match records to the history sink
//! at least once, retrying with bounded exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::{with_timeout, HistorySink, MatchRecord};
use crate::config::EngineConfig;
use crate::tokio_tools::spawn_named_task;
use crate::types::GameId;

const LOG_TARGET: &str = "guerra::outbox";
const IDLE_POLL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
struct PendingRecord {
    record: MatchRecord,
    attempts: u32,
    next_attempt: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    /// Records the sink refused permanently; they are not retried.
    pub dropped: usize,
}

pub struct HistoryOutbox {
    sink: Arc<dyn HistorySink>,
    pending: DashMap<GameId, PendingRecord>,
    wake: Notify,
    call_timeout: Duration,
    retry_base: Duration,
    retry_max: Duration,
}

impl HistoryOutbox {
    pub fn new(sink: Arc<dyn HistorySink>, config: &EngineConfig) -> Self {
        Self {
            sink,
            pending: DashMap::new(),
            wake: Notify::new(),
            call_timeout: config.collaborator_timeout,
            retry_base: config.history_retry_base,
            retry_max: config.history_retry_max,
        }
    }

    /// Queues a record for delivery. A record already pending for the same game is kept.
    pub fn enqueue(&self, record: MatchRecord) -> bool {
        let game_id = record.game_id;
        let mut inserted = false;
        self.pending.entry(game_id).or_insert_with(|| {
            inserted = true;
            PendingRecord {
                record,
                attempts: 0,
                next_attempt: Instant::now(),
            }
        });
        if inserted {
            debug!(target: LOG_TARGET, %game_id, "match record queued");
            self.wake.notify_one();
        }
        inserted
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, game_id: &GameId) -> bool {
        self.pending.contains_key(game_id)
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.retry_base
            .saturating_mul(1u32 << exponent)
            .min(self.retry_max)
    }

    /// Attempts every record whose retry time has come.
    pub async fn flush_due(&self) -> FlushReport {
        let now = Instant::now();
        let due: Vec<MatchRecord> = self
            .pending
            .iter()
            .filter(|entry| entry.next_attempt <= now)
            .map(|entry| entry.record.clone())
            .collect();

        let attempts = due.into_iter().map(|record| async move {
            let result = with_timeout(self.call_timeout, self.sink.append(&record)).await;
            (record, result)
        });
        let results = join_all(attempts).await;

        let mut report = FlushReport::default();
        for (record, result) in results {
            let game_id = record.game_id;
            match result {
                Ok(()) => {
                    self.pending.remove(&game_id);
                    report.delivered += 1;
                    info!(
                        target: LOG_TARGET,
                        %game_id,
                        winner = ?record.winner_code,
                        "match record delivered"
                    );
                }
                Err(err) if !err.is_retryable() => {
                    self.pending.remove(&game_id);
                    report.dropped += 1;
                    error!(
                        target: LOG_TARGET,
                        %game_id,
                        error = %err,
                        record = %serde_json::to_string(&record).unwrap_or_default(),
                        "match record refused by history sink, dropped"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    if let Some(mut entry) = self.pending.get_mut(&game_id) {
                        entry.attempts += 1;
                        let delay = self.backoff(entry.attempts);
                        entry.next_attempt = Instant::now() + delay;
                        warn!(
                            target: LOG_TARGET,
                            %game_id,
                            attempts = entry.attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %err,
                            "match record delivery failed"
                        );
                    }
                }
            }
        }
        report
    }

    fn next_wakeup(&self) -> Duration {
        let now = Instant::now();
        self.pending
            .iter()
            .map(|entry| entry.next_attempt.saturating_duration_since(now))
            .min()
            .unwrap_or(IDLE_POLL)
    }

    /// Runs delivery in the background until `cancel` fires, then makes one last attempt.
    pub fn spawn_worker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let outbox = Arc::clone(self);
        spawn_named_task("history-outbox", async move {
            loop {
                let wait = outbox.next_wakeup();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = outbox.wake.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
                outbox.flush_due().await;
            }
            let report = outbox.flush_due().await;
            info!(
                target: LOG_TARGET,
                delivered = report.delivered,
                dropped = report.dropped,
                still_pending = outbox.pending(),
                "history outbox stopped"
            );
        })
    }
}
