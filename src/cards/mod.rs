pub mod card;
pub mod catalog;

pub use card::{Card, CardParseError, Rank, Suit, JOKER_ID};
pub use catalog::{Catalog, CatalogError, CardRef, BUILTIN_CATALOG};
