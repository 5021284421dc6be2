use serde::{Deserialize, Serialize};

use crate::cards::{Card, CardRef, Rank, Suit};
use crate::engine::state::{MatchSummary, RoundSummary, SubmitOutcome};
use crate::types::{DeckSlot, GameId};

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(alias = "deck_slot")]
    pub slot: DeckSlot,
}

/// Either `{"card": ...}` or the card fields at the top level.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PlayRequest {
    Wrapped { card: CardRef },
    Flat(CardRef),
}

impl PlayRequest {
    pub fn card(&self) -> &CardRef {
        match self {
            PlayRequest::Wrapped { card } | PlayRequest::Flat(card) => card,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardDto {
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
    pub points: u8,
}

impl From<&Card> for CardDto {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id(),
            suit: card.suit,
            rank: card.rank,
            points: card.points(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HandResponse {
    pub game_id: GameId,
    pub cards: Vec<CardDto>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlayResponse {
    Waiting,
    Resolved {
        round: RoundSummary,
    },
    Finished {
        round: RoundSummary,
        summary: MatchSummary,
    },
}

impl From<SubmitOutcome> for PlayResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Waiting => PlayResponse::Waiting,
            SubmitOutcome::Resolved(round) => PlayResponse::Resolved { round },
            SubmitOutcome::Finished { round, summary } => PlayResponse::Finished { round, summary },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

impl AckResponse {
    pub const OK: AckResponse = AckResponse { status: "ok" };
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_games: usize,
    pub pending_records: usize,
}
