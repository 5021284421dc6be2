//! Request facade: resolves the caller once per request and dispatches to the
//! matchmaker or the turn engine. Holds no game state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cards::{Card, CardRef, Catalog, CatalogError};
use crate::collaborators::{
    with_timeout, CollaboratorError, DeckProvider, HistorySink, IdentityResolver,
};
use crate::config::EngineConfig;
use crate::engine::errors::{PlayRejection, ViewError};
use crate::engine::state::SubmitOutcome;
use crate::engine::view::GameStateView;
use crate::engine::TurnEngine;
use crate::matchmaking::{JoinError, JoinOutcome, MatchStatus, Matchmaker};
use crate::outbox::HistoryOutbox;
use crate::registry::MatchRegistry;
use crate::types::{DeckSlot, GameId, Identity};

const LOG_TARGET: &str = "guerra::service";

/// Every way a request can be refused, each with a stable outcome code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("identity service unavailable: {0}")]
    IdentityUnavailable(CollaboratorError),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Play(#[from] PlayRejection),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("unknown card `{0}`")]
    UnknownCard(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidToken => "invalid-token",
            ServiceError::IdentityUnavailable(_) => "identity-unavailable",
            ServiceError::Join(err) => err.code(),
            ServiceError::Play(err) => err.code(),
            ServiceError::View(err) => err.code(),
            ServiceError::UnknownCard(_) => "unknown-card",
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ServiceError::Join(err) => err.reason(),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::IdentityUnavailable(err) => err.is_retryable(),
            ServiceError::Join(JoinError::DeckUnavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownCard(id) => ServiceError::UnknownCard(id),
            other => ServiceError::UnknownCard(other.to_string()),
        }
    }
}

pub struct GameService {
    identity: Arc<dyn IdentityResolver>,
    matchmaker: Arc<Matchmaker>,
    engine: Arc<TurnEngine>,
    catalog: Arc<Catalog>,
    identity_timeout: Duration,
}

impl GameService {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        matchmaker: Arc<Matchmaker>,
        engine: Arc<TurnEngine>,
        catalog: Arc<Catalog>,
        identity_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            matchmaker,
            engine,
            catalog,
            identity_timeout,
        }
    }

    pub fn engine(&self) -> &Arc<TurnEngine> {
        &self.engine
    }

    async fn authenticate(&self, bearer_token: &str) -> Result<Identity, ServiceError> {
        let token = bearer_token.trim();
        if token.is_empty() {
            return Err(ServiceError::InvalidToken);
        }
        match with_timeout(self.identity_timeout, self.identity.resolve(token)).await {
            Ok(identity) => Ok(identity),
            Err(CollaboratorError::InvalidToken | CollaboratorError::NotFound(_)) => {
                Err(ServiceError::InvalidToken)
            }
            Err(err) => {
                warn!(target: LOG_TARGET, error = %err, "identity resolution failed");
                Err(ServiceError::IdentityUnavailable(err))
            }
        }
    }

    pub async fn join(&self, token: &str, slot: DeckSlot) -> Result<JoinOutcome, ServiceError> {
        let identity = self.authenticate(token).await?;
        debug!(target: LOG_TARGET, user_id = %identity.user_id, slot, "match/join");
        Ok(self.matchmaker.join(identity, slot).await?)
    }

    pub async fn status(&self, token: &str) -> Result<MatchStatus, ServiceError> {
        let identity = self.authenticate(token).await?;
        Ok(self.matchmaker.status(&identity.user_id))
    }

    pub async fn leave(&self, token: &str) -> Result<(), ServiceError> {
        let identity = self.authenticate(token).await?;
        self.matchmaker.leave(&identity.user_id);
        Ok(())
    }

    pub async fn state(&self, token: &str, game_id: GameId) -> Result<GameStateView, ServiceError> {
        let identity = self.authenticate(token).await?;
        Ok(self.engine.get_state(game_id, &identity.user_id)?)
    }

    pub async fn hand(&self, token: &str, game_id: GameId) -> Result<Vec<Card>, ServiceError> {
        let identity = self.authenticate(token).await?;
        Ok(self.engine.get_hand(game_id, &identity.user_id)?)
    }

    pub async fn play(
        &self,
        token: &str,
        game_id: GameId,
        card: &CardRef,
    ) -> Result<SubmitOutcome, ServiceError> {
        let identity = self.authenticate(token).await?;
        // An unknown game outranks an unknown card.
        if self.engine.registry().lookup_any(&game_id).is_none() {
            return Err(PlayRejection::GameNotFound(game_id).into());
        }
        let card = self.catalog.resolve(card)?;
        Ok(self.engine.submit(game_id, &identity.user_id, card)?)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// The engine components wired together around one set of collaborators.
pub struct Backend {
    pub service: Arc<GameService>,
    pub engine: Arc<TurnEngine>,
    pub registry: Arc<MatchRegistry>,
    pub outbox: Arc<HistoryOutbox>,
}

impl Backend {
    pub fn assemble(
        config: &EngineConfig,
        catalog: Arc<Catalog>,
        identity: Arc<dyn IdentityResolver>,
        decks: Arc<dyn DeckProvider>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        let registry = Arc::new(MatchRegistry::new(config));
        let outbox = Arc::new(HistoryOutbox::new(history, config));
        let engine = Arc::new(TurnEngine::new(Arc::clone(&registry), Arc::clone(&outbox)));
        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&registry),
            decks,
            Arc::clone(&catalog),
            config.collaborator_timeout,
        ));
        let service = Arc::new(GameService::new(
            identity,
            matchmaker,
            Arc::clone(&engine),
            catalog,
            config.collaborator_timeout,
        ));
        Self {
            service,
            engine,
            registry,
            outbox,
        }
    }
}
