use crate::types::GameId;

/// Reasons a card submission is refused. Checked in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlayRejection {
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("game {0} is already finished")]
    GameAlreadyFinished(GameId),
    #[error("requester is not a participant of this game")]
    NotAParticipant,
    #[error("card is not in hand")]
    CardNotInHand,
    #[error("a card was already submitted this round")]
    DoubleSubmission,
}

impl PlayRejection {
    pub fn code(&self) -> &'static str {
        match self {
            PlayRejection::GameNotFound(_) => "game-not-found",
            PlayRejection::GameAlreadyFinished(_) => "game-already-finished",
            PlayRejection::NotAParticipant => "not-a-participant",
            PlayRejection::DoubleSubmission => "double-submission",
            PlayRejection::CardNotInHand => "card-not-in-hand",
        }
    }
}

/// Reasons a state or hand query is refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("requester is not a participant of this game")]
    NotAParticipant,
}

impl ViewError {
    pub fn code(&self) -> &'static str {
        match self {
            ViewError::GameNotFound(_) => "game-not-found",
            ViewError::NotAParticipant => "not-a-participant",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StateError {
    InvariantViolation(&'static str),
}

pub trait InvariantCheck {
    fn validate_invariants(&self) -> Result<(), StateError>;
}
