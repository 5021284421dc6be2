pub mod validation;

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::cards::Card;

pub use validation::{validate, DeckRejection, DECK_SIZE, SUIT_CARD_COUNT, SUIT_POINT_CAP};

/// A legal deck used as a draw stack: the front of the queue is the top.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Deck {
    cards: VecDeque<Card>,
}

impl Deck {
    /// Validates `cards` and, only if the whole deck is legal, shuffles it once.
    pub fn admit<R: Rng + ?Sized>(cards: Vec<Card>, rng: &mut R) -> Result<Self, DeckRejection> {
        validate(&cards)?;
        let mut cards = cards;
        cards.shuffle(rng);
        Ok(Self {
            cards: cards.into(),
        })
    }

    /// Validates `cards` and keeps their order; the first card is the top of the stack.
    pub fn admit_ordered(cards: Vec<Card>) -> Result<Self, DeckRejection> {
        validate(&cards)?;
        Ok(Self {
            cards: cards.into(),
        })
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::test_utils::fixtures::legal_deck;

    #[test]
    fn admit_shuffles_without_losing_cards() {
        let cards = legal_deck();
        let mut rng = StdRng::seed_from_u64(7);
        let mut deck = Deck::admit(cards.clone(), &mut rng).unwrap();
        assert_eq!(deck.remaining(), DECK_SIZE);

        let mut drawn = Vec::new();
        while let Some(card) = deck.draw() {
            drawn.push(card);
        }
        let mut expected = cards.iter().map(Card::id).collect::<Vec<_>>();
        let mut actual = drawn.iter().map(Card::id).collect::<Vec<_>>();
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn admit_ordered_draws_from_the_top() {
        let cards = legal_deck();
        let mut deck = Deck::admit_ordered(cards.clone()).unwrap();
        assert_eq!(deck.draw(), Some(cards[0]));
        assert_eq!(deck.draw(), Some(cards[1]));
        assert_eq!(deck.remaining(), DECK_SIZE - 2);
    }

    #[test]
    fn illegal_decks_are_not_admitted() {
        let mut cards = legal_deck();
        cards.pop();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            Deck::admit(cards, &mut rng),
            Err(DeckRejection::WrongCount { found: 8 })
        );
    }
}
