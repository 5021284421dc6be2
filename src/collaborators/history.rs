use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::engine::rules::{EndReason, GameResult};
use crate::engine::state::{Seat, TurnLogEntry};
use crate::types::{GameId, UserId};

use super::CollaboratorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinnerCode {
    #[serde(rename = "1")]
    P1,
    #[serde(rename = "2")]
    P2,
    #[serde(rename = "draw")]
    Draw,
}

impl From<GameResult> for WinnerCode {
    fn from(result: GameResult) -> Self {
        match result {
            GameResult::Winner(Seat::P1) => WinnerCode::P1,
            GameResult::Winner(Seat::P2) => WinnerCode::P2,
            GameResult::Draw => WinnerCode::Draw,
        }
    }
}

/// Completed-match record. `game_id` is the deduplication key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub game_id: GameId,
    pub p1_user_id: UserId,
    pub p2_user_id: UserId,
    pub winner_code: WinnerCode,
    pub turn_log: Vec<TurnLogEntry>,
    pub p1_score: u32,
    pub p2_score: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: EndReason,
}

impl MatchRecord {
    pub fn is_abandoned(&self) -> bool {
        self.reason == EndReason::Abandoned
    }
}

/// Durable store for finished matches. Appending the same game twice must be harmless.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, record: &MatchRecord) -> Result<(), CollaboratorError>;
}

#[derive(Default)]
pub struct InMemoryHistorySink {
    records: DashMap<GameId, MatchRecord>,
    attempts: AtomicUsize,
    unavailable: AtomicBool,
    refusing: AtomicBool,
}

impl InMemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes appends fail permanently, as a store refusing the payload would.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn get(&self, game_id: &GameId) -> Option<MatchRecord> {
        self.records.get(game_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of append calls seen, including failed and duplicate ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
    async fn append(&self, record: &MatchRecord) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::transient("history store unavailable"));
        }
        if self.refusing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Malformed("history store refused record".into()));
        }
        self.records
            .entry(record.game_id)
            .or_insert_with(|| record.clone());
        Ok(())
    }
}

/// Posts records to the history service at `POST {base}/matches`.
pub struct HttpHistorySink {
    client: reqwest::Client,
    matches_url: Url,
}

impl HttpHistorySink {
    pub fn new(client: reqwest::Client, base: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            matches_url: base.join("matches")?,
        })
    }
}

#[async_trait]
impl HistorySink for HttpHistorySink {
    async fn append(&self, record: &MatchRecord) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(self.matches_url.clone())
            .json(record)
            .send()
            .await?;
        append_outcome(response.status())
    }
}

/// 409 means an earlier attempt already stored the record. Other client errors
/// except 429 will not improve on retry.
fn append_outcome(status: StatusCode) -> Result<(), CollaboratorError> {
    match status {
        StatusCode::CONFLICT => Ok(()),
        status if status.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(CollaboratorError::transient(
            "history service is throttling",
        )),
        status if status.is_client_error() => Err(CollaboratorError::Malformed(format!(
            "history service refused record with {status}"
        ))),
        status => Err(CollaboratorError::transient(format!(
            "history service answered {status}"
        ))),
    }
}
