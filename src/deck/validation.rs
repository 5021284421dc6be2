use serde::Serialize;

use crate::cards::{Card, Suit};

pub const DECK_SIZE: usize = 9;
pub const SUIT_CARD_COUNT: usize = 2;
pub const SUIT_POINT_CAP: u32 = 15;

/// First failing deck rule. Checks run in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum DeckRejection {
    #[error("deck must contain exactly {} cards, found {found}", DECK_SIZE)]
    WrongCount { found: usize },
    #[error("deck has no joker")]
    MissingJoker,
    #[error("deck has {found} jokers, exactly one is allowed")]
    ExtraJoker { found: usize },
    #[error("deck has {found} {suit} cards, exactly {} are required", SUIT_CARD_COUNT)]
    SuitCountNotTwo { suit: Suit, found: usize },
    #[error("deck has no {suit} cards")]
    MissingSuit { suit: Suit },
    #[error("{suit} cards sum to {points} points, the cap is {}", SUIT_POINT_CAP)]
    SuitPointCapExceeded { suit: Suit, points: u32 },
}

impl DeckRejection {
    pub fn code(&self) -> &'static str {
        match self {
            DeckRejection::WrongCount { .. } => "wrong-count",
            DeckRejection::MissingJoker => "missing-joker",
            DeckRejection::ExtraJoker { .. } => "extra-joker",
            DeckRejection::SuitCountNotTwo { .. } => "suit-count-not-two",
            DeckRejection::MissingSuit { .. } => "missing-suit",
            DeckRejection::SuitPointCapExceeded { .. } => "suit-point-cap-exceeded",
        }
    }
}

/// Checks deck legality: nine cards, one joker, two cards per suit, and at
/// most 15 points per suit (aces count 7).
pub fn validate(cards: &[Card]) -> Result<(), DeckRejection> {
    if cards.len() != DECK_SIZE {
        return Err(DeckRejection::WrongCount { found: cards.len() });
    }

    let jokers = cards.iter().filter(|card| card.is_joker()).count();
    match jokers {
        0 => return Err(DeckRejection::MissingJoker),
        1 => {}
        found => return Err(DeckRejection::ExtraJoker { found }),
    }

    let suit_count = |suit: Suit| cards.iter().filter(|card| card.suit == suit).count();

    for suit in Suit::PLAYABLE {
        let found = suit_count(suit);
        if found != 0 && found != SUIT_CARD_COUNT {
            return Err(DeckRejection::SuitCountNotTwo { suit, found });
        }
    }

    for suit in Suit::PLAYABLE {
        if suit_count(suit) == 0 {
            return Err(DeckRejection::MissingSuit { suit });
        }
    }

    for suit in Suit::PLAYABLE {
        let points: u32 = cards
            .iter()
            .filter(|card| card.suit == suit)
            .map(|card| u32::from(card.points()))
            .sum();
        if points > SUIT_POINT_CAP {
            return Err(DeckRejection::SuitPointCapExceeded { suit, points });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Card, Rank};
    use crate::test_utils::fixtures::{card, legal_deck};

    #[test]
    fn legal_deck_passes() {
        assert_eq!(validate(&legal_deck()), Ok(()));
    }

    #[test]
    fn count_is_checked_first() {
        let cards = vec![card("hearts_9"), card("hearts_8")];
        assert_eq!(
            validate(&cards),
            Err(DeckRejection::WrongCount { found: 2 })
        );
    }

    #[test]
    fn joker_presence_and_uniqueness() {
        let mut cards = legal_deck();
        let joker_at = cards.iter().position(Card::is_joker).unwrap();
        cards[joker_at] = card("hearts_4");
        assert_eq!(validate(&cards), Err(DeckRejection::MissingJoker));

        let mut cards = legal_deck();
        cards[0] = Card::JOKER;
        assert_eq!(
            validate(&cards),
            Err(DeckRejection::ExtraJoker { found: 2 })
        );
    }

    #[test]
    fn each_suit_needs_exactly_two_cards() {
        let mut cards = legal_deck();
        let spade = cards.iter().position(|c| c.suit == Suit::Spades).unwrap();
        cards[spade] = card("hearts_2");
        assert_eq!(
            validate(&cards),
            Err(DeckRejection::SuitCountNotTwo {
                suit: Suit::Hearts,
                found: 3
            })
        );
    }

    #[test]
    fn suit_point_cap_counts_ace_as_seven() {
        let mut cards = legal_deck();
        let hearts: Vec<usize> = cards
            .iter()
            .enumerate()
            .filter(|(_, c)| c.suit == Suit::Hearts)
            .map(|(i, _)| i)
            .collect();
        cards[hearts[0]] = card("hearts_9");
        cards[hearts[1]] = card("hearts_8");
        let rejection = validate(&cards).unwrap_err();
        assert_eq!(
            rejection,
            DeckRejection::SuitPointCapExceeded {
                suit: Suit::Hearts,
                points: 17
            }
        );
        assert_eq!(rejection.code(), "suit-point-cap-exceeded");

        cards[hearts[0]] = Card::new(Suit::Hearts, Rank::Ace);
        cards[hearts[1]] = card("hearts_8");
        assert_eq!(validate(&cards), Ok(()));
    }

    #[test]
    fn rejection_serializes_with_rule_tag() {
        let json = serde_json::to_value(DeckRejection::MissingSuit { suit: Suit::Clubs }).unwrap();
        assert_eq!(json, serde_json::json!({"rule": "missing-suit", "suit": "clubs"}));
    }
}
