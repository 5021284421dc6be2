use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cards::Card;
use crate::outbox::HistoryOutbox;
use crate::registry::MatchRegistry;
use crate::types::GameId;

use super::errors::{InvariantCheck, PlayRejection, ViewError};
use super::state::SubmitOutcome;
use super::view::GameStateView;

const LOG_TARGET: &str = "guerra::engine";

/// Applies card submissions to registered games and answers state queries.
///
/// The engine holds no game state of its own. Each call looks the game up in
/// the registry and works under that game's lock; a game that reaches its end
/// is retired and its record handed to the outbox by the same call that ended
/// it, so the record is produced exactly once.
pub struct TurnEngine {
    registry: Arc<MatchRegistry>,
    outbox: Arc<HistoryOutbox>,
}

impl TurnEngine {
    pub fn new(registry: Arc<MatchRegistry>, outbox: Arc<HistoryOutbox>) -> Self {
        Self { registry, outbox }
    }

    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    pub fn submit(
        &self,
        game_id: GameId,
        user_id: &str,
        card: Card,
    ) -> Result<SubmitOutcome, PlayRejection> {
        let handle = self
            .registry
            .lookup_any(&game_id)
            .ok_or(PlayRejection::GameNotFound(game_id))?;

        let (outcome, record) = {
            let mut game = handle.write();
            let outcome = game.submit(user_id, card).map_err(|rejection| {
                debug!(
                    target: LOG_TARGET,
                    %game_id,
                    user_id,
                    card = %card,
                    code = rejection.code(),
                    "submission rejected"
                );
                rejection
            })?;
            if let Err(err) = game.validate_invariants() {
                warn!(target: LOG_TARGET, %game_id, ?err, "game invariant broken");
            }
            let record = match &outcome {
                SubmitOutcome::Finished { .. } => game.match_record(),
                _ => None,
            };
            (outcome, record)
        };

        match &outcome {
            SubmitOutcome::Waiting => {
                debug!(target: LOG_TARGET, %game_id, user_id, "card accepted, waiting for opponent");
            }
            SubmitOutcome::Resolved(round) => {
                debug!(
                    target: LOG_TARGET,
                    %game_id,
                    turn = round.turn,
                    winner = %round.winner,
                    p1_score = round.p1_score,
                    p2_score = round.p2_score,
                    "round resolved"
                );
            }
            SubmitOutcome::Finished { summary, .. } => {
                info!(
                    target: LOG_TARGET,
                    %game_id,
                    winner = %summary.winner,
                    reason = summary.reason.as_str(),
                    turns = summary.turns,
                    "game finished"
                );
            }
        }

        if let Some(record) = record {
            self.registry.retire(&game_id);
            self.outbox.enqueue(record);
        }
        Ok(outcome)
    }

    /// State snapshot for a participant. Finished games stay readable while retained.
    pub fn get_state(&self, game_id: GameId, user_id: &str) -> Result<GameStateView, ViewError> {
        let handle = self
            .registry
            .lookup_any(&game_id)
            .ok_or(ViewError::GameNotFound(game_id))?;
        let game = handle.read();
        let seat = game.seat_of(user_id).ok_or(ViewError::NotAParticipant)?;
        Ok(GameStateView::of(&game, seat))
    }

    /// The requester's own hand.
    pub fn get_hand(&self, game_id: GameId, user_id: &str) -> Result<Vec<Card>, ViewError> {
        let handle = self
            .registry
            .lookup_any(&game_id)
            .ok_or(ViewError::GameNotFound(game_id))?;
        let game = handle.read();
        let seat = game.seat_of(user_id).ok_or(ViewError::NotAParticipant)?;
        Ok(game.player(seat).hand().to_vec())
    }

    /// Ends every active game with no submissions for `idle_timeout` as an
    /// abandoned draw, and queues its record. Returns the abandoned game ids.
    pub fn abandon_idle(&self, idle_timeout: Duration) -> Vec<GameId> {
        let now = Instant::now();
        let mut abandoned = Vec::new();
        for handle in self.registry.active_games() {
            let record = {
                let mut game = handle.write();
                if game.idle_for(now) < idle_timeout || !game.abandon() {
                    continue;
                }
                game.match_record()
            };
            let game_id = handle.id();
            self.registry.retire(&game_id);
            if let Some(record) = record {
                info!(
                    target: LOG_TARGET,
                    %game_id,
                    p1 = %record.p1_user_id,
                    p2 = %record.p2_user_id,
                    idle_secs = idle_timeout.as_secs(),
                    "idle game abandoned"
                );
                self.outbox.enqueue(record);
            }
            abandoned.push(game_id);
        }
        abandoned
    }

    /// Match records still waiting for the history sink.
    pub fn pending_records(&self) -> usize {
        self.outbox.pending()
    }
}
