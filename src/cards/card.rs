//! Card, suit and rank types shared by every component.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical id of the single joker card.
pub const JOKER_ID: &str = "joker";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
    #[default]
    None,
}

impl Suit {
    /// Suits a non-joker card can carry, in tie-break priority order.
    pub const PLAYABLE: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    /// Tie-break priority: hearts > diamonds > clubs > spades.
    pub fn priority(self) -> u8 {
        match self {
            Suit::Hearts => 4,
            Suit::Diamonds => 3,
            Suit::Clubs => 2,
            Suit::Spades => 1,
            Suit::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
            Suit::None => "none",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
            Suit::Spades => "♠",
            Suit::None => "",
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suit {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hearts" | "heart" | "♥" => Ok(Suit::Hearts),
            "diamonds" | "diamond" | "♦" => Ok(Suit::Diamonds),
            "clubs" | "club" | "♣" => Ok(Suit::Clubs),
            "spades" | "spade" | "♠" => Ok(Suit::Spades),
            "none" | "" => Ok(Suit::None),
            _ => Err(CardParseError::Suit(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
    Joker,
}

impl Rank {
    pub const ALL: [Rank; 14] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
        Rank::Joker,
    ];

    /// Point table: numerals count face value, J=11, Q=12, K=13, A=7.
    /// The joker has no point value; its strength is handled by the comparison rules.
    pub fn points(self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Ace => 7,
            Rank::Joker => 0,
        }
    }

    pub fn is_face(self) -> bool {
        matches!(self, Rank::Jack | Rank::Queen | Rank::King)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Rank::Two
                | Rank::Three
                | Rank::Four
                | Rank::Five
                | Rank::Six
                | Rank::Seven
                | Rank::Eight
                | Rank::Nine
                | Rank::Ten
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
            Rank::Joker => "JOKER",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Rank::ALL
            .into_iter()
            .find(|rank| rank.as_str() == normalized)
            .ok_or_else(|| CardParseError::Rank(s.to_string()))
    }
}

impl TryFrom<String> for Rank {
    type Error = CardParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rank> for String {
    fn from(rank: Rank) -> Self {
        rank.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CardParseError {
    #[error("unknown suit `{0}`")]
    Suit(String),
    #[error("unknown rank `{0}`")]
    Rank(String),
    #[error("malformed card id `{0}`")]
    Id(String),
}

/// Immutable playing card. Equality is by suit and rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub const JOKER: Card = Card {
        suit: Suit::None,
        rank: Rank::Joker,
    };

    pub fn new(suit: Suit, rank: Rank) -> Self {
        Self { suit, rank }
    }

    pub fn points(&self) -> u8 {
        self.rank.points()
    }

    pub fn is_joker(&self) -> bool {
        self.rank == Rank::Joker
    }

    pub fn is_ace(&self) -> bool {
        self.rank == Rank::Ace
    }

    /// Canonical id, `<suit>_<rank>` or `joker`.
    pub fn id(&self) -> String {
        if self.is_joker() {
            JOKER_ID.to_string()
        } else {
            format!("{}_{}", self.suit.as_str(), self.rank.as_str())
        }
    }

    /// Parses a card id leniently: case-insensitive suit names and ranks.
    pub fn parse_id(id: &str) -> Result<Self, CardParseError> {
        let trimmed = id.trim();
        if trimmed.eq_ignore_ascii_case(JOKER_ID) {
            return Ok(Card::JOKER);
        }
        let (suit, rank) = trimmed
            .split_once('_')
            .ok_or_else(|| CardParseError::Id(id.to_string()))?;
        let suit: Suit = suit.parse()?;
        let rank: Rank = rank.parse()?;
        if suit == Suit::None || rank == Rank::Joker {
            return Err(CardParseError::Id(id.to_string()));
        }
        Ok(Card { suit, rank })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_joker() {
            f.write_str("JOKER")
        } else {
            write!(f, "{}{}", self.rank.as_str(), self.suit.symbol())
        }
    }
}
