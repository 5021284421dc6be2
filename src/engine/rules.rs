use serde::{Deserialize, Serialize};

use super::state::Seat;

pub const DEFAULT_SCORE_TARGET: u32 = 5;
pub const DEFAULT_HAND_SIZE: usize = 3;

/// Per-match rule knobs, fixed when the game is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRules {
    pub score_target: u32,
    /// Optional hard cap on rounds; the higher score wins when it is reached.
    pub max_turns: Option<u32>,
    pub hand_size: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            score_target: DEFAULT_SCORE_TARGET,
            max_turns: None,
            hand_size: DEFAULT_HAND_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Winner(Seat),
    Draw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ScoreTarget,
    Exhausted,
    TurnLimit,
    Abandoned,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::ScoreTarget => "score_target",
            EndReason::Exhausted => "exhausted",
            EndReason::TurnLimit => "turn_limit",
            EndReason::Abandoned => "abandoned",
        }
    }
}

/// Facts the termination check needs after a round has been scored.
#[derive(Clone, Copy, Debug)]
pub struct RoundEnd {
    pub p1_score: u32,
    pub p2_score: u32,
    pub p1_out_of_cards: bool,
    pub p2_out_of_cards: bool,
    pub turn_number: u32,
}

/// Threshold first, then exhaustion of both players, then the optional turn cap.
pub fn evaluate_termination(end: &RoundEnd, rules: &MatchRules) -> Option<(GameResult, EndReason)> {
    let target = rules.score_target;
    match (end.p1_score >= target, end.p2_score >= target) {
        (true, true) => return Some((GameResult::Draw, EndReason::ScoreTarget)),
        (true, false) => return Some((GameResult::Winner(Seat::P1), EndReason::ScoreTarget)),
        (false, true) => return Some((GameResult::Winner(Seat::P2), EndReason::ScoreTarget)),
        (false, false) => {}
    }

    if end.p1_out_of_cards && end.p2_out_of_cards {
        return Some((by_score(end), EndReason::Exhausted));
    }

    if let Some(max_turns) = rules.max_turns {
        if end.turn_number >= max_turns {
            return Some((by_score(end), EndReason::TurnLimit));
        }
    }

    None
}

fn by_score(end: &RoundEnd) -> GameResult {
    match end.p1_score.cmp(&end.p2_score) {
        std::cmp::Ordering::Greater => GameResult::Winner(Seat::P1),
        std::cmp::Ordering::Less => GameResult::Winner(Seat::P2),
        std::cmp::Ordering::Equal => GameResult::Draw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(p1: u32, p2: u32, p1_out: bool, p2_out: bool, turn: u32) -> RoundEnd {
        RoundEnd {
            p1_score: p1,
            p2_score: p2,
            p1_out_of_cards: p1_out,
            p2_out_of_cards: p2_out,
            turn_number: turn,
        }
    }

    #[test]
    fn threshold_fires_exactly_at_target() {
        let rules = MatchRules::default();
        assert_eq!(evaluate_termination(&end(4, 3, false, false, 7), &rules), None);
        assert_eq!(
            evaluate_termination(&end(5, 3, false, false, 8), &rules),
            Some((GameResult::Winner(Seat::P1), EndReason::ScoreTarget))
        );
        assert_eq!(
            evaluate_termination(&end(5, 5, false, false, 9), &rules),
            Some((GameResult::Draw, EndReason::ScoreTarget))
        );
    }

    #[test]
    fn exhaustion_needs_both_players_out_of_cards() {
        let rules = MatchRules::default();
        assert_eq!(evaluate_termination(&end(3, 2, true, false, 9), &rules), None);
        assert_eq!(
            evaluate_termination(&end(3, 4, true, true, 9), &rules),
            Some((GameResult::Winner(Seat::P2), EndReason::Exhausted))
        );
        assert_eq!(
            evaluate_termination(&end(4, 4, true, true, 9), &rules),
            Some((GameResult::Draw, EndReason::Exhausted))
        );
    }

    #[test]
    fn threshold_wins_over_exhaustion() {
        let rules = MatchRules::default();
        assert_eq!(
            evaluate_termination(&end(2, 5, true, true, 9), &rules),
            Some((GameResult::Winner(Seat::P2), EndReason::ScoreTarget))
        );
    }

    #[test]
    fn optional_turn_cap_ends_by_score() {
        let rules = MatchRules {
            max_turns: Some(8),
            ..MatchRules::default()
        };
        assert_eq!(evaluate_termination(&end(3, 1, false, false, 7), &rules), None);
        assert_eq!(
            evaluate_termination(&end(3, 1, false, false, 8), &rules),
            Some((GameResult::Winner(Seat::P1), EndReason::TurnLimit))
        );
    }
}
