use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque game identifier allocated by the match registry.
pub type GameId = Uuid;

/// Stable user identifier handed out by the identity service.
pub type UserId = String;

/// Deck slot a player saved their deck under (1..=5).
pub type DeckSlot = u8;

pub const MIN_DECK_SLOT: DeckSlot = 1;
pub const MAX_DECK_SLOT: DeckSlot = 5;

/// Resolved caller identity. The display name is advisory; the user id is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}
