//! FIFO matchmaking queue.
//!
//! Deck fetches happen outside the queue lock: a candidate is staged under
//! the lock, its deck is fetched and validated without it, and the lock is
//! taken again to unstage it. A player who leaves or re-joins while staged is
//! marked cancelled and never registered. The queue lock is held across
//! `MatchRegistry::register`; the registry never calls back into the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cards::{Card, Catalog, CatalogError};
use crate::collaborators::{with_timeout, CollaboratorError, DeckProvider};
use crate::deck::{validate, DeckRejection};
use crate::engine::rules::EndReason;
use crate::engine::state::Seat;
use crate::registry::{MatchRegistry, RegistryError};
use crate::types::{DeckSlot, GameId, Identity, UserId, MAX_DECK_SLOT, MIN_DECK_SLOT};

const LOG_TARGET: &str = "guerra::matchmaking";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("deck slot {0} is outside {}..={}", MIN_DECK_SLOT, MAX_DECK_SLOT)]
    InvalidSlot(DeckSlot),
    #[error("player is already in game {0}")]
    PlayerAlreadyInGame(GameId),
    #[error("deck rejected: {0}")]
    DeckInvalid(DeckRejection),
    #[error("no deck saved in slot {0}")]
    DeckNotFound(DeckSlot),
    #[error("deck references unknown card `{0}`")]
    UnknownCard(String),
    #[error("deck service unavailable: {0}")]
    DeckUnavailable(CollaboratorError),
}

impl JoinError {
    pub fn code(&self) -> &'static str {
        match self {
            JoinError::InvalidSlot(_) => "invalid-slot",
            JoinError::PlayerAlreadyInGame(_) => "player-already-in-game",
            JoinError::DeckInvalid(_) | JoinError::DeckNotFound(_) => "deck-invalid",
            JoinError::UnknownCard(_) => "unknown-card",
            JoinError::DeckUnavailable(_) => "deck-unavailable",
        }
    }

    /// Finer-grained cause for deck problems: the failing rule, or what was missing.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            JoinError::DeckInvalid(rejection) => Some(rejection.code()),
            JoinError::DeckNotFound(_) => Some("deck-not-found"),
            JoinError::UnknownCard(_) => Some("unknown-card"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    Waiting,
    Matched {
        game_id: GameId,
        opponent_name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    Idle,
    Waiting {
        slot: DeckSlot,
        since: DateTime<Utc>,
    },
    Matched {
        game_id: GameId,
        opponent_name: String,
    },
    /// The queued entry was dropped because the saved deck failed at pairing time.
    Rejected { reason: String },
    /// The player's last game has finished and is still retained.
    Ended {
        game_id: GameId,
        winner: String,
        abandoned: bool,
    },
}

#[derive(Clone, Debug)]
struct QueueEntry {
    identity: Identity,
    slot: DeckSlot,
    seq: u64,
    enqueued_at: DateTime<Utc>,
}

/// A queue entry taken out for pairing while its deck is fetched.
#[derive(Clone, Debug)]
struct Staged {
    slot: DeckSlot,
    since: DateTime<Utc>,
    cancelled: bool,
}

#[derive(Default)]
struct WaitQueue {
    entries: VecDeque<QueueEntry>,
    staged: HashMap<UserId, Staged>,
    next_seq: u64,
}

impl WaitQueue {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn remove(&mut self, user_id: &str) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.identity.user_id == user_id)?;
        self.entries.remove(index)
    }

    /// Puts an entry back where its sequence number belongs.
    fn restore(&mut self, entry: QueueEntry) {
        let index = self
            .entries
            .iter()
            .position(|queued| queued.seq > entry.seq)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry);
    }

    fn find(&self, user_id: &str) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|entry| entry.identity.user_id == user_id)
    }

    /// Pops the head entry and records it as being paired.
    fn stage_front(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        self.staged.insert(
            entry.identity.user_id.clone(),
            Staged {
                slot: entry.slot,
                since: entry.enqueued_at,
                cancelled: false,
            },
        );
        Some(entry)
    }

    /// Ends pairing for `user_id`. Returns true if the player left or re-joined meanwhile.
    fn unstage(&mut self, user_id: &str) -> bool {
        self.staged
            .remove(user_id)
            .is_some_and(|staged| staged.cancelled)
    }

    fn cancel_staged(&mut self, user_id: &str) -> bool {
        match self.staged.get_mut(user_id) {
            Some(staged) if !staged.cancelled => {
                staged.cancelled = true;
                true
            }
            _ => false,
        }
    }

    fn staged(&self, user_id: &str) -> Option<&Staged> {
        self.staged.get(user_id).filter(|staged| !staged.cancelled)
    }
}

pub struct Matchmaker {
    queue: Mutex<WaitQueue>,
    rejections: DashMap<UserId, String>,
    registry: Arc<MatchRegistry>,
    decks: Arc<dyn DeckProvider>,
    catalog: Arc<Catalog>,
    fetch_timeout: Duration,
}

impl Matchmaker {
    pub fn new(
        registry: Arc<MatchRegistry>,
        decks: Arc<dyn DeckProvider>,
        catalog: Arc<Catalog>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            queue: Mutex::new(WaitQueue::default()),
            rejections: DashMap::new(),
            registry,
            decks,
            catalog,
            fetch_timeout,
        }
    }

    /// Pairs the caller with the oldest other waiting player, or queues them.
    pub async fn join(&self, identity: Identity, slot: DeckSlot) -> Result<JoinOutcome, JoinError> {
        if !(MIN_DECK_SLOT..=MAX_DECK_SLOT).contains(&slot) {
            return Err(JoinError::InvalidSlot(slot));
        }
        let user_id = identity.user_id.clone();
        if let Some(game_id) = self.registry.active_game_for(&user_id) {
            return Err(JoinError::PlayerAlreadyInGame(game_id));
        }
        self.rejections.remove(&user_id);
        self.registry.forget_last_finished(&user_id);

        let my_cards = match self.load_deck(&user_id, slot).await {
            Ok(cards) => cards,
            Err(err @ JoinError::DeckUnavailable(_)) => return Err(err),
            Err(err) => {
                // A bad deck leaves the player idle, dropping any earlier entry.
                self.queue.lock().remove(&user_id);
                warn!(
                    target: LOG_TARGET,
                    user_id = %user_id,
                    slot,
                    code = err.code(),
                    reason = err.reason(),
                    "join rejected"
                );
                return Err(err);
            }
        };

        let mut previous = None;
        // Seq of the first opponent dropped for a bad deck; the caller inherits
        // its place at the head of the queue.
        let mut inherited_seq = None;
        loop {
            let opponent = {
                let mut queue = self.queue.lock();
                if let Some(entry) = queue.remove(&user_id) {
                    previous.get_or_insert(entry);
                }
                // A re-join supersedes an entry another joiner is pairing.
                queue.cancel_staged(&user_id);
                match queue.stage_front() {
                    Some(opponent) => opponent,
                    None => {
                        let seq = inherited_seq.unwrap_or_else(|| queue.take_seq());
                        queue.restore(QueueEntry {
                            identity: identity.clone(),
                            slot,
                            seq,
                            enqueued_at: Utc::now(),
                        });
                        debug!(target: LOG_TARGET, user_id = %user_id, slot, seq, "player queued");
                        return Ok(JoinOutcome::Waiting);
                    }
                }
            };

            let opponent_id = opponent.identity.user_id.clone();
            let fetched = self.load_deck(&opponent_id, opponent.slot).await;

            let mut queue = self.queue.lock();
            if queue.unstage(&opponent_id) {
                debug!(target: LOG_TARGET, opponent = %opponent_id, "opponent left while being paired");
                continue;
            }
            let their_cards = match fetched {
                Ok(cards) => cards,
                Err(err @ JoinError::DeckUnavailable(_)) => {
                    queue.restore(opponent);
                    if let Some(entry) = previous {
                        queue.restore(entry);
                    }
                    warn!(
                        target: LOG_TARGET,
                        user_id = %user_id,
                        opponent = %opponent_id,
                        error = %err,
                        "opponent deck unavailable, queue left as it was"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let reason = err.reason().unwrap_or(err.code()).to_string();
                    warn!(
                        target: LOG_TARGET,
                        user_id = %opponent_id,
                        reason = %reason,
                        "queued deck failed at pairing, entry dropped"
                    );
                    self.rejections.insert(opponent_id, reason);
                    inherited_seq.get_or_insert(opponent.seq);
                    continue;
                }
            };

            let registered = self.registry.register(
                (opponent.identity.clone(), their_cards),
                (identity.clone(), my_cards.clone()),
            );
            match registered {
                Ok(game_id) => {
                    drop(queue);
                    let opponent_name = self
                        .registry
                        .lookup(&game_id)
                        .map(|handle| handle.read().label(Seat::P1))
                        .unwrap_or_else(|| opponent.identity.display_name.clone());
                    info!(
                        target: LOG_TARGET,
                        %game_id,
                        p1 = %opponent_id,
                        p2 = %user_id,
                        "players paired"
                    );
                    return Ok(JoinOutcome::Matched {
                        game_id,
                        opponent_name,
                    });
                }
                Err(RegistryError::PlayerAlreadyInGame(busy)) if busy == opponent_id => {
                    // Paired elsewhere meanwhile; try the next one.
                    debug!(target: LOG_TARGET, opponent = %opponent_id, "opponent already playing");
                }
                Err(RegistryError::PlayerAlreadyInGame(_)) => {
                    queue.restore(opponent);
                    drop(queue);
                    if let Some(game_id) = self.registry.active_game_for(&user_id) {
                        return Err(JoinError::PlayerAlreadyInGame(game_id));
                    }
                }
                Err(RegistryError::SamePlayer) => {}
                Err(RegistryError::InvalidDeck { rejection, .. }) => {
                    queue.restore(opponent);
                    return Err(JoinError::DeckInvalid(rejection));
                }
            }
        }
    }

    pub fn status(&self, user_id: &str) -> MatchStatus {
        if let Some(game_id) = self.registry.active_game_for(user_id) {
            if let Some(handle) = self.registry.lookup(&game_id) {
                let game = handle.read();
                if let Some(seat) = game.seat_of(user_id) {
                    return MatchStatus::Matched {
                        game_id,
                        opponent_name: game.label(seat.other()),
                    };
                }
            }
        }
        {
            let queue = self.queue.lock();
            if let Some(entry) = queue.find(user_id) {
                return MatchStatus::Waiting {
                    slot: entry.slot,
                    since: entry.enqueued_at,
                };
            }
            if let Some(staged) = queue.staged(user_id) {
                return MatchStatus::Waiting {
                    slot: staged.slot,
                    since: staged.since,
                };
            }
        }
        if let Some(reason) = self.rejections.get(user_id) {
            return MatchStatus::Rejected {
                reason: reason.value().clone(),
            };
        }
        if let Some(handle) = self.registry.last_finished_for(user_id) {
            let game = handle.read();
            if let (Some(finish), Some(winner)) = (game.finish(), game.winner_label()) {
                return MatchStatus::Ended {
                    game_id: handle.id(),
                    winner,
                    abandoned: finish.reason == EndReason::Abandoned,
                };
            }
        }
        MatchStatus::Idle
    }

    /// Drops the player's queue entry, or cancels it if it is being paired,
    /// along with any pending notices. Idempotent.
    pub fn leave(&self, user_id: &str) -> bool {
        let removed = {
            let mut queue = self.queue.lock();
            let queued = queue.remove(user_id).is_some();
            queued || queue.cancel_staged(user_id)
        };
        self.rejections.remove(user_id);
        self.registry.forget_last_finished(user_id);
        if removed {
            debug!(target: LOG_TARGET, user_id, "player left the queue");
        }
        removed
    }

    pub fn waiting(&self) -> usize {
        self.queue.lock().entries.len()
    }

    /// Fetches a saved deck, normalises it against the catalog, and validates it.
    async fn load_deck(&self, user_id: &str, slot: DeckSlot) -> Result<Vec<Card>, JoinError> {
        let refs = with_timeout(self.fetch_timeout, self.decks.fetch_deck(user_id, slot))
            .await
            .map_err(|err| match err {
                CollaboratorError::NotFound(_) => JoinError::DeckNotFound(slot),
                other => JoinError::DeckUnavailable(other),
            })?;
        let cards = refs
            .iter()
            .map(|card| self.catalog.resolve(card))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| match err {
                CatalogError::UnknownCard(id) => JoinError::UnknownCard(id),
                other => JoinError::UnknownCard(other.to_string()),
            })?;
        validate(&cards).map_err(JoinError::DeckInvalid)?;
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::cards::CardRef;
    use crate::collaborators::InMemoryDeckProvider;
    use crate::config::EngineConfig;
    use crate::deck::DeckRejection;
    use crate::test_utils::fixtures::{card_refs, LEGAL_DECK, OVER_CAP_DECK};

    struct Lobby {
        matchmaker: Arc<Matchmaker>,
        registry: Arc<MatchRegistry>,
        decks: Arc<InMemoryDeckProvider>,
    }

    /// Holds the next fetch of one player's deck until released.
    struct DeckGate {
        decks: Arc<InMemoryDeckProvider>,
        user_id: UserId,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    impl DeckGate {
        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DeckProvider for DeckGate {
        async fn fetch_deck(
            &self,
            user_id: &str,
            slot: DeckSlot,
        ) -> Result<Vec<CardRef>, CollaboratorError> {
            if user_id == self.user_id && self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.decks.fetch_deck(user_id, slot).await
        }
    }

    fn saved_decks() -> Arc<InMemoryDeckProvider> {
        let decks = Arc::new(InMemoryDeckProvider::new());
        for user in ["u-ana", "u-bo", "u-cy"] {
            decks.save(user, 1, card_refs(&LEGAL_DECK));
        }
        decks
    }

    fn lobby_with(decks: Arc<InMemoryDeckProvider>, provider: Arc<dyn DeckProvider>) -> Lobby {
        let registry = Arc::new(MatchRegistry::new(&EngineConfig {
            rng_seed: Some(3),
            ..EngineConfig::default()
        }));
        let catalog = Arc::new(Catalog::builtin().unwrap());
        Lobby {
            matchmaker: Arc::new(Matchmaker::new(
                Arc::clone(&registry),
                provider,
                catalog,
                Duration::from_secs(5),
            )),
            registry,
            decks,
        }
    }

    fn lobby() -> Lobby {
        let decks = saved_decks();
        lobby_with(decks.clone(), decks)
    }

    fn gated_lobby(user_id: &str) -> (Lobby, Arc<DeckGate>) {
        let decks = saved_decks();
        let gate = Arc::new(DeckGate {
            decks: decks.clone(),
            user_id: user_id.into(),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        });
        (lobby_with(decks, gate.clone()), gate)
    }

    fn who(user: &str) -> Identity {
        Identity::new(format!("u-{user}"), user)
    }

    #[tokio::test]
    async fn second_player_is_paired_with_the_first() -> anyhow::Result<()> {
        let l = lobby();
        assert_eq!(l.matchmaker.join(who("ana"), 1).await?, JoinOutcome::Waiting);
        assert!(matches!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Waiting { slot: 1, .. }
        ));

        let JoinOutcome::Matched { game_id, opponent_name } = l.matchmaker.join(who("bo"), 1).await?
        else {
            panic!("expected a match");
        };
        assert_eq!(opponent_name, "ana");
        assert_eq!(l.matchmaker.waiting(), 0);
        assert_eq!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Matched {
                game_id,
                opponent_name: "bo".into()
            }
        );
        assert_eq!(l.registry.active_game_for("u-bo"), Some(game_id));

        let err = l.matchmaker.join(who("ana"), 1).await.unwrap_err();
        assert_eq!(err, JoinError::PlayerAlreadyInGame(game_id));
        assert_eq!(err.code(), "player-already-in-game");
        Ok(())
    }

    #[tokio::test]
    async fn rejoining_replaces_the_earlier_entry() {
        let l = lobby();
        l.matchmaker.join(who("ana"), 1).await.unwrap();
        assert_eq!(
            l.matchmaker.join(who("ana"), 1).await.unwrap(),
            JoinOutcome::Waiting
        );
        assert_eq!(l.matchmaker.waiting(), 1);
    }

    #[tokio::test]
    async fn over_cap_deck_is_rejected_and_player_stays_idle() {
        let l = lobby();
        l.decks.save("u-ana", 2, card_refs(&OVER_CAP_DECK));

        let err = l.matchmaker.join(who("ana"), 2).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::DeckInvalid(DeckRejection::SuitPointCapExceeded { .. })
        ));
        assert_eq!(err.code(), "deck-invalid");
        assert_eq!(err.reason(), Some("suit-point-cap-exceeded"));
        assert_eq!(l.matchmaker.status("u-ana"), MatchStatus::Idle);
        assert_eq!(l.matchmaker.waiting(), 0);
    }

    #[tokio::test]
    async fn slots_and_missing_decks_are_checked() {
        let l = lobby();
        assert_eq!(
            l.matchmaker.join(who("ana"), 0).await,
            Err(JoinError::InvalidSlot(0))
        );
        assert_eq!(
            l.matchmaker.join(who("ana"), 6).await.unwrap_err().code(),
            "invalid-slot"
        );
        assert_eq!(
            l.matchmaker.join(who("ana"), 4).await,
            Err(JoinError::DeckNotFound(4))
        );

        l.decks.save("u-bo", 2, card_refs(&["hearts_2", "hearts_99"]));
        assert_eq!(
            l.matchmaker.join(who("bo"), 2).await,
            Err(JoinError::UnknownCard("hearts_99".into()))
        );
    }

    #[tokio::test]
    async fn broken_opponent_deck_drops_their_entry() {
        let l = lobby();
        l.matchmaker.join(who("ana"), 1).await.unwrap();
        // Saved deck changes after ana queued.
        l.decks.save("u-ana", 1, card_refs(&OVER_CAP_DECK));

        assert_eq!(
            l.matchmaker.join(who("bo"), 1).await.unwrap(),
            JoinOutcome::Waiting
        );
        assert_eq!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Rejected {
                reason: "suit-point-cap-exceeded".into()
            }
        );
        assert!(matches!(
            l.matchmaker.status("u-bo"),
            MatchStatus::Waiting { .. }
        ));

        let outcome = l.matchmaker.join(who("cy"), 1).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Matched { ref opponent_name, .. } if opponent_name == "bo"));

        // A fresh join clears the notice.
        l.decks.save("u-ana", 1, card_refs(&LEGAL_DECK));
        l.matchmaker.join(who("ana"), 1).await.unwrap();
        assert!(matches!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Waiting { .. }
        ));
    }

    #[tokio::test]
    async fn transient_fetch_failure_consumes_nothing() {
        let l = lobby();
        l.matchmaker.join(who("ana"), 1).await.unwrap();
        l.decks.fail_for("u-ana", CollaboratorError::transient("deck store down"));

        let err = l.matchmaker.join(who("bo"), 1).await.unwrap_err();
        assert_eq!(err.code(), "deck-unavailable");
        assert!(matches!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Waiting { .. }
        ));
        assert_eq!(l.matchmaker.status("u-bo"), MatchStatus::Idle);

        l.decks.clear_failure("u-ana");
        assert!(matches!(
            l.matchmaker.join(who("bo"), 1).await.unwrap(),
            JoinOutcome::Matched { .. }
        ));
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let l = lobby();
        l.matchmaker.join(who("ana"), 1).await.unwrap();
        assert!(l.matchmaker.leave("u-ana"));
        assert!(!l.matchmaker.leave("u-ana"));
        assert_eq!(l.matchmaker.status("u-ana"), MatchStatus::Idle);
        assert_eq!(l.matchmaker.waiting(), 0);
    }

    #[tokio::test]
    async fn leaving_during_pairing_keeps_the_player_out_of_a_game() -> anyhow::Result<()> {
        let (l, gate) = gated_lobby("u-ana");
        l.matchmaker.join(who("ana"), 1).await?;
        gate.arm();

        let pairing = tokio::spawn({
            let matchmaker = Arc::clone(&l.matchmaker);
            async move { matchmaker.join(who("bo"), 1).await }
        });
        gate.reached.notified().await;

        // Still reported as waiting while bo fetches her deck.
        assert!(matches!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Waiting { slot: 1, .. }
        ));
        assert!(l.matchmaker.leave("u-ana"));
        assert!(!l.matchmaker.leave("u-ana"));
        assert_eq!(l.matchmaker.status("u-ana"), MatchStatus::Idle);

        gate.release.notify_one();
        assert_eq!(pairing.await??, JoinOutcome::Waiting);
        assert_eq!(l.registry.active_game_for("u-ana"), None);
        assert_eq!(l.matchmaker.status("u-ana"), MatchStatus::Idle);
        assert!(matches!(
            l.matchmaker.status("u-bo"),
            MatchStatus::Waiting { .. }
        ));
        assert_eq!(l.matchmaker.waiting(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_opponent_makes_way_for_the_next_in_line() -> anyhow::Result<()> {
        let (l, gate) = gated_lobby("u-ana");
        l.matchmaker.join(who("ana"), 1).await?;
        gate.arm();

        let pairing = tokio::spawn({
            let matchmaker = Arc::clone(&l.matchmaker);
            async move { matchmaker.join(who("bo"), 1).await }
        });
        gate.reached.notified().await;

        // cy queues behind ana's staged entry, then ana's deck turns out bad.
        assert_eq!(l.matchmaker.join(who("cy"), 1).await?, JoinOutcome::Waiting);
        l.decks.save("u-ana", 1, card_refs(&OVER_CAP_DECK));
        gate.release.notify_one();

        let JoinOutcome::Matched { game_id, opponent_name } = pairing.await??
        else {
            panic!("bo should pair with cy");
        };
        assert_eq!(opponent_name, "cy");
        assert_eq!(l.registry.active_game_for("u-cy"), Some(game_id));
        assert_eq!(l.matchmaker.waiting(), 0);
        assert_eq!(
            l.matchmaker.status("u-ana"),
            MatchStatus::Rejected {
                reason: "suit-point-cap-exceeded".into()
            }
        );
        Ok(())
    }
}
