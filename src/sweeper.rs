use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::TurnEngine;
use crate::tokio_tools::spawn_named_task;

const LOG_TARGET: &str = "guerra::sweeper";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub abandoned: usize,
    pub purged: usize,
}

/// Periodically abandons idle games and drops expired finished-game tombstones.
pub struct IdleSweeper {
    engine: Arc<TurnEngine>,
    idle_timeout: Duration,
    finished_retention: Duration,
    interval: Duration,
}

impl IdleSweeper {
    pub fn new(engine: Arc<TurnEngine>, config: &EngineConfig) -> Self {
        Self {
            engine,
            idle_timeout: config.idle_timeout,
            finished_retention: config.finished_retention,
            interval: config.sweep_interval,
        }
    }

    pub fn sweep_once(&self) -> SweepReport {
        let abandoned = self.engine.abandon_idle(self.idle_timeout);
        let purged = self
            .engine
            .registry()
            .purge_finished(self.finished_retention);
        let report = SweepReport {
            abandoned: abandoned.len(),
            purged,
        };
        if report != SweepReport::default() {
            info!(
                target: LOG_TARGET,
                abandoned = report.abandoned,
                purged = report.purged,
                active = self.engine.registry().active_count(),
                "sweep finished"
            );
        }
        report
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        info!(
            target: LOG_TARGET,
            idle_timeout_secs = self.idle_timeout.as_secs(),
            retention_secs = self.finished_retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "idle sweeper started"
        );
        spawn_named_task("idle-sweeper", async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep_once();
                    }
                }
            }
            debug!(target: LOG_TARGET, "idle sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryHistorySink;
    use crate::engine::rules::MatchRules;
    use crate::outbox::HistoryOutbox;
    use crate::registry::MatchRegistry;
    use crate::test_utils::fixtures::{ordered_game, FACES_DECK, OPENER_DECK};

    fn sweeper(config: &EngineConfig) -> (IdleSweeper, Arc<MatchRegistry>, Arc<HistoryOutbox>) {
        let registry = Arc::new(MatchRegistry::new(config));
        let outbox = Arc::new(HistoryOutbox::new(
            Arc::new(InMemoryHistorySink::new()),
            config,
        ));
        let engine = Arc::new(TurnEngine::new(Arc::clone(&registry), Arc::clone(&outbox)));
        (IdleSweeper::new(engine, config), registry, outbox)
    }

    #[test]
    fn idle_games_are_abandoned_then_purged() {
        let config = EngineConfig {
            idle_timeout: Duration::from_secs(30),
            finished_retention: Duration::ZERO,
            ..EngineConfig::default()
        };
        let (sweeper, registry, outbox) = sweeper(&config);
        let mut game = ordered_game(&OPENER_DECK, &FACES_DECK, MatchRules::default());
        game.backdate_activity(Duration::from_secs(60));
        let game_id = registry.install(game);

        let report = sweeper.sweep_once();
        assert_eq!(report.abandoned, 1);
        // Zero retention: the tombstone goes in the same pass.
        assert_eq!(report.purged, 1);
        assert!(registry.lookup_any(&game_id).is_none());
        assert!(outbox.is_pending(&game_id));

        assert_eq!(sweeper.sweep_once(), SweepReport::default());
    }

    #[test]
    fn fresh_games_survive_a_sweep() {
        let (sweeper, registry, outbox) = sweeper(&EngineConfig::default());
        let game_id = registry.install(ordered_game(&OPENER_DECK, &FACES_DECK, MatchRules::default()));

        assert_eq!(sweeper.sweep_once(), SweepReport::default());
        assert!(registry.lookup(&game_id).is_some());
        assert_eq!(outbox.pending(), 0);
    }

    #[tokio::test]
    async fn background_task_stops_on_cancel() {
        let config = EngineConfig {
            sweep_interval: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        let (sweeper, _, _) = sweeper(&config);
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
