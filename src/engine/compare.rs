use serde::{Deserialize, Serialize};

use crate::cards::Card;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    P1Wins,
    P2Wins,
    /// Joker against joker: both sides score.
    DoubleWin,
    /// Same rank and same suit.
    Draw,
}

impl RoundOutcome {
    /// Outcome seen from the other side of the table.
    pub fn mirrored(self) -> Self {
        match self {
            RoundOutcome::P1Wins => RoundOutcome::P2Wins,
            RoundOutcome::P2Wins => RoundOutcome::P1Wins,
            other => other,
        }
    }

    /// Points awarded to (p1, p2).
    pub fn points(self) -> (u32, u32) {
        match self {
            RoundOutcome::P1Wins => (1, 0),
            RoundOutcome::P2Wins => (0, 1),
            RoundOutcome::DoubleWin => (1, 1),
            RoundOutcome::Draw => (0, 0),
        }
    }
}

/// Compares the card played by p1 against the card played by p2.
///
/// Rules apply in order: jokers, ace specials (an ace beats J/Q/K but loses
/// to any numeral), point value with A=7, suit priority, then a full draw.
pub fn compare(c1: &Card, c2: &Card) -> RoundOutcome {
    match (c1.is_joker(), c2.is_joker()) {
        (true, true) => return RoundOutcome::DoubleWin,
        (true, false) => return RoundOutcome::P1Wins,
        (false, true) => return RoundOutcome::P2Wins,
        (false, false) => {}
    }

    if let Some(outcome) = ace_special(c1, c2) {
        return outcome;
    }
    if let Some(outcome) = ace_special(c2, c1) {
        return outcome.mirrored();
    }

    let (p1, p2) = (c1.points(), c2.points());
    if p1 != p2 {
        return if p1 > p2 {
            RoundOutcome::P1Wins
        } else {
            RoundOutcome::P2Wins
        };
    }

    let (s1, s2) = (c1.suit.priority(), c2.suit.priority());
    if s1 != s2 {
        return if s1 > s2 {
            RoundOutcome::P1Wins
        } else {
            RoundOutcome::P2Wins
        };
    }

    RoundOutcome::Draw
}

/// Applies when `ace` is the only ace on the table.
fn ace_special(ace: &Card, other: &Card) -> Option<RoundOutcome> {
    if !ace.is_ace() || other.is_ace() {
        return None;
    }
    if other.rank.is_face() {
        Some(RoundOutcome::P1Wins)
    } else if other.rank.is_numeric() {
        Some(RoundOutcome::P2Wins)
    } else {
        None
    }
}
