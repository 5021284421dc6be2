use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::card::{Card, CardParseError, Rank, Suit};

const LOG_TARGET: &str = "guerra::cards::catalog";

/// Catalog shipped with the crate: the 52 standard cards plus one joker.
pub const BUILTIN_CATALOG: &str = include_str!("catalog.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog is empty")]
    Empty,
    #[error("catalog entry `{id}` does not match its suit and rank (expected `{expected}`)")]
    IdMismatch { id: String, expected: String },
    #[error("catalog entry `{id}` declares {found} points, rule table says {expected}")]
    PointsMismatch { id: String, expected: u8, found: u8 },
    #[error("duplicate catalog entry `{0}`")]
    Duplicate(String),
    #[error("catalog has no joker")]
    MissingJoker,
    #[error("card `{0}` is not in the catalog")]
    UnknownCard(String),
    #[error(transparent)]
    Malformed(#[from] CardParseError),
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    suit: Suit,
    rank: Rank,
    #[serde(default)]
    points: Option<u8>,
}

/// Card reference as it arrives from collaborators: either a catalog id or a
/// `{suit, rank}` object. Older payloads name the rank field `value`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CardRef {
    Id(String),
    Fields {
        #[serde(default)]
        suit: Suit,
        #[serde(alias = "value")]
        rank: Rank,
    },
}

impl From<&str> for CardRef {
    fn from(id: &str) -> Self {
        CardRef::Id(id.to_string())
    }
}

impl From<Card> for CardRef {
    fn from(card: Card) -> Self {
        CardRef::Fields {
            suit: card.suit,
            rank: card.rank,
        }
    }
}

/// Read-only card table, loaded once at startup and shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct Catalog {
    cards: Vec<Card>,
    by_id: HashMap<String, Card>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&raw)?;
        info!(
            target: LOG_TARGET,
            path = %path.display(),
            cards = catalog.len(),
            "card catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut cards = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            if (entry.suit == Suit::None) != (entry.rank == Rank::Joker) {
                return Err(CatalogError::Malformed(CardParseError::Id(entry.id)));
            }
            let card = Card::new(entry.suit, entry.rank);
            let expected_id = card.id();
            if entry.id != expected_id {
                return Err(CatalogError::IdMismatch {
                    id: entry.id,
                    expected: expected_id,
                });
            }
            if let Some(found) = entry.points {
                if found != card.points() {
                    return Err(CatalogError::PointsMismatch {
                        id: entry.id,
                        expected: card.points(),
                        found,
                    });
                }
            }
            if !seen.insert(card) {
                return Err(CatalogError::Duplicate(entry.id));
            }
            by_id.insert(entry.id, card);
            cards.push(card);
        }

        if !cards.iter().any(Card::is_joker) {
            return Err(CatalogError::MissingJoker);
        }

        Ok(Self { cards, by_id })
    }

    /// Looks a card up by id; ids are normalised before matching.
    pub fn lookup(&self, id: &str) -> Result<Card, CatalogError> {
        if let Some(card) = self.by_id.get(id) {
            return Ok(*card);
        }
        let card = Card::parse_id(id).map_err(|_| CatalogError::UnknownCard(id.to_string()))?;
        self.by_id
            .get(&card.id())
            .copied()
            .ok_or_else(|| CatalogError::UnknownCard(id.to_string()))
    }

    /// Normalises a collaborator card reference into a catalog card.
    pub fn resolve(&self, card: &CardRef) -> Result<Card, CatalogError> {
        match card {
            CardRef::Id(id) => self.lookup(id),
            CardRef::Fields { suit, rank } => {
                let card = if *rank == Rank::Joker {
                    Card::JOKER
                } else {
                    Card::new(*suit, *rank)
                };
                if self.contains(&card) {
                    Ok(card)
                } else {
                    Err(CatalogError::UnknownCard(card.id()))
                }
            }
        }
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.by_id.contains_key(&card.id())
    }

    pub fn all(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_52_cards_and_a_joker() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.len(), 53);
        assert_eq!(catalog.all().iter().filter(|c| c.is_joker()).count(), 1);
        for suit in Suit::PLAYABLE {
            assert_eq!(catalog.all().iter().filter(|c| c.suit == suit).count(), 13);
        }
    }

    #[test]
    fn lookup_normalises_ids() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(
            catalog.lookup("HEARTS_k").unwrap(),
            Card::new(Suit::Hearts, Rank::King)
        );
        assert!(matches!(
            catalog.lookup("hearts_11"),
            Err(CatalogError::UnknownCard(_))
        ));
    }

    #[test]
    fn resolve_accepts_legacy_value_field() {
        let catalog = Catalog::builtin().unwrap();
        let legacy: CardRef = serde_json::from_str(r#"{"suit":"clubs","value":"7"}"#).unwrap();
        assert_eq!(
            catalog.resolve(&legacy).unwrap(),
            Card::new(Suit::Clubs, Rank::Seven)
        );
        let joker: CardRef = serde_json::from_str(r#"{"rank":"JOKER"}"#).unwrap();
        assert!(catalog.resolve(&joker).unwrap().is_joker());
        let by_id: CardRef = serde_json::from_str(r#""spades_Q""#).unwrap();
        assert_eq!(
            catalog.resolve(&by_id).unwrap(),
            Card::new(Suit::Spades, Rank::Queen)
        );
    }

    #[test]
    fn wrong_points_is_a_load_failure() {
        let raw = r#"[
            {"id": "hearts_A", "suit": "hearts", "rank": "A", "points": 14},
            {"id": "joker", "suit": "none", "rank": "JOKER"}
        ]"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::PointsMismatch { expected: 7, found: 14, .. })
        ));
    }

    #[test]
    fn duplicates_and_missing_joker_are_rejected() {
        let dup = r#"[
            {"id": "hearts_2", "suit": "hearts", "rank": "2"},
            {"id": "hearts_2", "suit": "hearts", "rank": "2"},
            {"id": "joker", "suit": "none", "rank": "JOKER"}
        ]"#;
        assert!(matches!(Catalog::from_json(dup), Err(CatalogError::Duplicate(_))));

        let no_joker = r#"[{"id": "hearts_2", "suit": "hearts", "rank": "2"}]"#;
        assert!(matches!(
            Catalog::from_json(no_joker),
            Err(CatalogError::MissingJoker)
        ));
        assert!(matches!(Catalog::from_json("[]"), Err(CatalogError::Empty)));
        assert!(matches!(Catalog::from_json("{"), Err(CatalogError::Parse(_))));
    }
}
