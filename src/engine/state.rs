use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::collaborators::history::{MatchRecord, WinnerCode};
use crate::deck::{Deck, DECK_SIZE};
use crate::types::{GameId, Identity};

use super::compare::{compare, RoundOutcome};
use super::errors::{InvariantCheck, PlayRejection, StateError};
use super::rules::{evaluate_termination, EndReason, GameResult, MatchRules, RoundEnd};

pub const DRAW_LABEL: &str = "draw";
pub const DOUBLE_WIN_LABEL: &str = "both";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    P1,
    P2,
}

impl Seat {
    pub const BOTH: [Seat; 2] = [Seat::P1, Seat::P2];

    pub fn index(self) -> usize {
        match self {
            Seat::P1 => 0,
            Seat::P2 => 1,
        }
    }

    pub fn other(self) -> Seat {
        match self {
            Seat::P1 => Seat::P2,
            Seat::P2 => Seat::P1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlayerInGame {
    pub identity: Identity,
    pub score: u32,
    deck: Deck,
    hand: Vec<Card>,
    played: Vec<Card>,
}

impl PlayerInGame {
    fn new(identity: Identity, deck: Deck) -> Self {
        Self {
            identity,
            score: 0,
            deck,
            hand: Vec::new(),
            played: Vec::new(),
        }
    }

    fn draw(&mut self) -> bool {
        match self.deck.draw() {
            Some(card) => {
                self.hand.push(card);
                true
            }
            None => false,
        }
    }

    fn take_from_hand(&mut self, card: &Card) -> bool {
        match self.hand.iter().position(|held| held == card) {
            Some(index) => {
                let card = self.hand.remove(index);
                self.played.push(card);
                true
            }
            None => false,
        }
    }

    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    pub fn played(&self) -> &[Card] {
        &self.played
    }

    pub fn deck_remaining(&self) -> usize {
        self.deck.remaining()
    }

    pub fn out_of_cards(&self) -> bool {
        self.hand.is_empty() && self.deck.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLogEntry {
    pub turn: u32,
    pub p1_card: Card,
    pub p2_card: Card,
    pub outcome: RoundOutcome,
    /// Display name of the round winner, `both` or `draw`.
    pub winner: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finish {
    pub result: GameResult,
    pub reason: EndReason,
    pub ended_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub turn: u32,
    pub p1_card: Card,
    pub p2_card: Card,
    pub outcome: RoundOutcome,
    pub winner: String,
    pub p1_score: u32,
    pub p2_score: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub winner: String,
    pub winner_code: WinnerCode,
    pub reason: EndReason,
    pub p1_score: u32,
    pub p2_score: u32,
    pub turns: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The opponent has not played yet this round.
    Waiting,
    Resolved(RoundSummary),
    Finished {
        round: RoundSummary,
        summary: MatchSummary,
    },
}

/// One match between two players. Owned by the registry and mutated only
/// under its per-game lock.
#[derive(Clone, Debug)]
pub struct Game {
    id: GameId,
    players: [PlayerInGame; 2],
    rules: MatchRules,
    turn_number: u32,
    current_round: [Option<Card>; 2],
    turn_log: Vec<TurnLogEntry>,
    finish: Option<Finish>,
    started_at: DateTime<Utc>,
    last_activity: Instant,
}

impl Game {
    /// Creates the game and deals the opening hands from the top of each deck.
    pub fn new(
        id: GameId,
        p1: (Identity, Deck),
        p2: (Identity, Deck),
        rules: MatchRules,
    ) -> Self {
        let mut game = Self {
            id,
            players: [PlayerInGame::new(p1.0, p1.1), PlayerInGame::new(p2.0, p2.1)],
            rules,
            turn_number: 0,
            current_round: [None, None],
            turn_log: Vec::new(),
            finish: None,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        };
        for player in game.players.iter_mut() {
            for _ in 0..game.rules.hand_size {
                if !player.draw() {
                    break;
                }
            }
        }
        game
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub fn player(&self, seat: Seat) -> &PlayerInGame {
        &self.players[seat.index()]
    }

    pub fn seat_of(&self, user_id: &str) -> Option<Seat> {
        Seat::BOTH
            .into_iter()
            .find(|seat| self.player(*seat).identity.user_id == user_id)
    }

    pub fn opponent_of(&self, user_id: &str) -> Option<&Identity> {
        self.seat_of(user_id)
            .map(|seat| &self.player(seat.other()).identity)
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn turn_log(&self) -> &[TurnLogEntry] {
        &self.turn_log
    }

    pub fn has_submitted(&self, seat: Seat) -> bool {
        self.current_round[seat.index()].is_some()
    }

    pub fn finish(&self) -> Option<&Finish> {
        self.finish.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finish.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Outward label for a seat. Identical display names are disambiguated by user id.
    pub fn label(&self, seat: Seat) -> String {
        let me = &self.player(seat).identity;
        let other = &self.player(seat.other()).identity;
        if me.display_name == other.display_name {
            format!("{} ({})", me.display_name, me.user_id)
        } else {
            me.display_name.clone()
        }
    }

    pub fn result_label(&self, result: GameResult) -> String {
        match result {
            GameResult::Winner(seat) => self.label(seat),
            GameResult::Draw => DRAW_LABEL.to_string(),
        }
    }

    pub fn winner_label(&self) -> Option<String> {
        self.finish.map(|finish| self.result_label(finish.result))
    }

    fn round_label(&self, outcome: RoundOutcome) -> String {
        match outcome {
            RoundOutcome::P1Wins => self.label(Seat::P1),
            RoundOutcome::P2Wins => self.label(Seat::P2),
            RoundOutcome::DoubleWin => DOUBLE_WIN_LABEL.to_string(),
            RoundOutcome::Draw => DRAW_LABEL.to_string(),
        }
    }

    /// Accepts one card from `user_id` and resolves the round once both sides played.
    pub fn submit(&mut self, user_id: &str, card: Card) -> Result<SubmitOutcome, PlayRejection> {
        if self.is_finished() {
            return Err(PlayRejection::GameAlreadyFinished(self.id));
        }
        let seat = self.seat_of(user_id).ok_or(PlayRejection::NotAParticipant)?;
        // Replaying the card already on the table reports the missing card.
        if !self.players[seat.index()].hand.contains(&card) {
            return Err(PlayRejection::CardNotInHand);
        }
        if self.has_submitted(seat) {
            return Err(PlayRejection::DoubleSubmission);
        }
        self.players[seat.index()].take_from_hand(&card);

        self.current_round[seat.index()] = Some(card);
        self.last_activity = Instant::now();

        match self.current_round {
            [Some(p1_card), Some(p2_card)] => Ok(self.resolve_round(p1_card, p2_card)),
            _ => Ok(SubmitOutcome::Waiting),
        }
    }

    fn resolve_round(&mut self, p1_card: Card, p2_card: Card) -> SubmitOutcome {
        let outcome = compare(&p1_card, &p2_card);
        let (p1_points, p2_points) = outcome.points();
        self.players[0].score += p1_points;
        self.players[1].score += p2_points;

        self.turn_number += 1;
        let winner = self.round_label(outcome);
        self.turn_log.push(TurnLogEntry {
            turn: self.turn_number,
            p1_card,
            p2_card,
            outcome,
            winner: winner.clone(),
        });
        self.current_round = [None, None];

        let round = RoundSummary {
            turn: self.turn_number,
            p1_card,
            p2_card,
            outcome,
            winner,
            p1_score: self.players[0].score,
            p2_score: self.players[1].score,
        };

        let end = RoundEnd {
            p1_score: self.players[0].score,
            p2_score: self.players[1].score,
            p1_out_of_cards: self.players[0].out_of_cards(),
            p2_out_of_cards: self.players[1].out_of_cards(),
            turn_number: self.turn_number,
        };
        if let Some((result, reason)) = evaluate_termination(&end, &self.rules) {
            let finish = self.conclude(result, reason);
            let summary = self.summary_for(finish);
            return SubmitOutcome::Finished { round, summary };
        }

        for player in self.players.iter_mut() {
            player.draw();
        }
        SubmitOutcome::Resolved(round)
    }

    fn conclude(&mut self, result: GameResult, reason: EndReason) -> Finish {
        let finish = Finish {
            result,
            reason,
            ended_at: Utc::now(),
        };
        self.finish = Some(finish);
        finish
    }

    /// Ends an idle game as a draw. Returns false when it had already finished.
    pub fn abandon(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.current_round = [None, None];
        self.conclude(GameResult::Draw, EndReason::Abandoned);
        true
    }

    pub fn summary(&self) -> Option<MatchSummary> {
        self.finish.map(|finish| self.summary_for(finish))
    }

    fn summary_for(&self, finish: Finish) -> MatchSummary {
        MatchSummary {
            winner: self.result_label(finish.result),
            winner_code: WinnerCode::from(finish.result),
            reason: finish.reason,
            p1_score: self.players[0].score,
            p2_score: self.players[1].score,
            turns: self.turn_number,
        }
    }

    /// Completed-match record for the history sink; `None` while the game is live.
    pub fn match_record(&self) -> Option<MatchRecord> {
        let finish = self.finish?;
        Some(MatchRecord {
            game_id: self.id,
            p1_user_id: self.players[0].identity.user_id.clone(),
            p2_user_id: self.players[1].identity.user_id.clone(),
            winner_code: WinnerCode::from(finish.result),
            turn_log: self.turn_log.clone(),
            p1_score: self.players[0].score,
            p2_score: self.players[1].score,
            started_at: self.started_at,
            ended_at: finish.ended_at,
            reason: finish.reason,
        })
    }
}

impl InvariantCheck for Game {
    fn validate_invariants(&self) -> Result<(), StateError> {
        for player in &self.players {
            let accounted = player.hand.len() + player.deck.remaining() + player.played.len();
            if accounted != DECK_SIZE {
                return Err(StateError::InvariantViolation(
                    "hand + deck + played must equal the admitted deck",
                ));
            }
        }
        if self.turn_number as usize != self.turn_log.len() {
            return Err(StateError::InvariantViolation(
                "turn number must equal the turn log length",
            ));
        }
        if self.is_finished() && self.current_round.iter().any(Option::is_some) {
            return Err(StateError::InvariantViolation(
                "finished games cannot hold an open round",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Game {
    pub(crate) fn set_scores(&mut self, p1: u32, p2: u32) {
        self.players[0].score = p1;
        self.players[1].score = p2;
    }

    pub(crate) fn backdate_activity(&mut self, by: Duration) {
        if let Some(earlier) = self.last_activity.checked_sub(by) {
            self.last_activity = earlier;
        }
    }
}
