use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collaborators::history::WinnerCode;
use crate::types::{GameId, UserId};

use super::rules::EndReason;
use super::state::{Game, Seat, TurnLogEntry};

/// What one side of the table looks like to either participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub seat: Seat,
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
    pub hand_size: usize,
    pub deck_remaining: usize,
    /// Whether this player already played a card in the open round.
    pub submitted: bool,
}

/// Snapshot of a game as seen by one of its players. Hands are never revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameStateView {
    pub game_id: GameId,
    pub you: Seat,
    pub turn_number: u32,
    pub players: [PlayerView; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_code: Option<WinnerCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    pub turn_log: Vec<TurnLogEntry>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameStateView {
    pub(crate) fn of(game: &Game, you: Seat) -> Self {
        let player = |seat: Seat| {
            let p = game.player(seat);
            PlayerView {
                seat,
                user_id: p.identity.user_id.clone(),
                display_name: game.label(seat),
                score: p.score,
                hand_size: p.hand().len(),
                deck_remaining: p.deck_remaining(),
                submitted: game.has_submitted(seat),
            }
        };
        let finish = game.finish();
        Self {
            game_id: game.id(),
            you,
            turn_number: game.turn_number(),
            players: [player(Seat::P1), player(Seat::P2)],
            winner: game.winner_label(),
            winner_code: finish.map(|f| WinnerCode::from(f.result)),
            end_reason: finish.map(|f| f.reason),
            turn_log: game.turn_log().to_vec(),
            started_at: game.started_at(),
            ended_at: finish.map(|f| f.ended_at),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}
