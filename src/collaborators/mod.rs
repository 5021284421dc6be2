//! Contracts for the services this backend depends on but does not own:
//! identity resolution, saved decks, and match history.

pub mod deck_provider;
pub mod history;
pub mod identity;

use std::future::Future;
use std::time::Duration;

pub use deck_provider::{DeckProvider, HttpDeckProvider, InMemoryDeckProvider};
pub use history::{HistorySink, HttpHistorySink, InMemoryHistorySink, MatchRecord, WinnerCode};
pub use identity::{HttpIdentityResolver, IdentityResolver, InMemoryIdentityResolver};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("bearer token rejected")]
    InvalidToken,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transient collaborator failure: {0}")]
    Transient(String),
    #[error("malformed collaborator payload: {0}")]
    Malformed(String),
}

impl CollaboratorError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollaboratorError::Malformed(err.to_string())
        } else {
            CollaboratorError::Transient(err.to_string())
        }
    }
}

/// Bounds a collaborator call; an elapsed deadline is reported as a transient timeout.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(CollaboratorError::Timeout(limit)))
}
