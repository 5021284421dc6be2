use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::cards::CardRef;
use crate::types::{DeckSlot, UserId};

use super::CollaboratorError;

/// Source of the decks players saved in the deck editor.
#[async_trait]
pub trait DeckProvider: Send + Sync {
    /// Returns the raw card references saved under `(user_id, slot)`.
    async fn fetch_deck(
        &self,
        user_id: &str,
        slot: DeckSlot,
    ) -> Result<Vec<CardRef>, CollaboratorError>;
}

#[derive(Default)]
pub struct InMemoryDeckProvider {
    decks: DashMap<(UserId, DeckSlot), Vec<CardRef>>,
    failures: DashMap<UserId, CollaboratorError>,
}

impl InMemoryDeckProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, user_id: impl Into<UserId>, slot: DeckSlot, cards: Vec<CardRef>) {
        self.decks.insert((user_id.into(), slot), cards);
    }

    /// Makes every fetch for `user_id` fail until cleared.
    pub fn fail_for(&self, user_id: impl Into<UserId>, error: CollaboratorError) {
        self.failures.insert(user_id.into(), error);
    }

    pub fn clear_failure(&self, user_id: &str) {
        self.failures.remove(user_id);
    }
}

#[async_trait]
impl DeckProvider for InMemoryDeckProvider {
    async fn fetch_deck(
        &self,
        user_id: &str,
        slot: DeckSlot,
    ) -> Result<Vec<CardRef>, CollaboratorError> {
        if let Some(error) = self.failures.get(user_id) {
            return Err(error.value().clone());
        }
        self.decks
            .get(&(user_id.to_string(), slot))
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::NotFound("deck"))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeckPayload {
    Bare(Vec<CardRef>),
    Wrapped { cards: Vec<CardRef> },
}

/// Reads saved decks from the deck service via `GET {base}/decks/{user_id}/{slot}`.
pub struct HttpDeckProvider {
    client: reqwest::Client,
    base: Url,
}

impl HttpDeckProvider {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn deck_url(&self, user_id: &str, slot: DeckSlot) -> Result<Url, CollaboratorError> {
        let slot = slot.to_string();
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::Malformed("deck service url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["decks", user_id, slot.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl DeckProvider for HttpDeckProvider {
    async fn fetch_deck(
        &self,
        user_id: &str,
        slot: DeckSlot,
    ) -> Result<Vec<CardRef>, CollaboratorError> {
        let response = self.client.get(self.deck_url(user_id, slot)?).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(CollaboratorError::NotFound("deck")),
            status if !status.is_success() => {
                return Err(CollaboratorError::transient(format!(
                    "deck service answered {status}"
                )))
            }
            _ => {}
        }
        let payload: DeckPayload = response.json().await?;
        Ok(match payload {
            DeckPayload::Bare(cards) | DeckPayload::Wrapped { cards } => cards,
        })
    }
}
