//! Match registry: owns every live game and enforces one active game per player.
//!
//! The index lock guards only the maps below and is never held while a game
//! lock is taken. Games themselves sit behind their own `RwLock`, so readers see
//! either the state before or after a round resolution, never half of one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cards::Card;
use crate::config::EngineConfig;
use crate::deck::{Deck, DeckRejection};
use crate::engine::rules::MatchRules;
use crate::engine::state::Game;
#[cfg(test)]
use crate::engine::state::Seat;
use crate::types::{GameId, Identity, UserId};

const LOG_TARGET: &str = "guerra::registry";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("player {0} is already in a game")]
    PlayerAlreadyInGame(UserId),
    #[error("a player cannot be matched against themselves")]
    SamePlayer,
    #[error("deck for {user_id} rejected: {rejection}")]
    InvalidDeck {
        user_id: UserId,
        rejection: DeckRejection,
    },
}

/// A game plus its lock.
pub struct GameHandle {
    id: GameId,
    game: RwLock<Game>,
}

impl GameHandle {
    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Game> {
        self.game.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Game> {
        self.game.write()
    }
}

struct Retired {
    handle: Arc<GameHandle>,
    retired_at: Instant,
}

#[derive(Default)]
struct Indices {
    active: HashMap<GameId, Arc<GameHandle>>,
    by_player: HashMap<UserId, GameId>,
    finished: HashMap<GameId, Retired>,
    last_finished: HashMap<UserId, GameId>,
}

pub struct MatchRegistry {
    indices: RwLock<Indices>,
    rng: Mutex<StdRng>,
    rules: MatchRules,
}

impl MatchRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            indices: RwLock::new(Indices::default()),
            rng: Mutex::new(rng),
            rules: config.match_rules(),
        }
    }

    /// Shuffles both decks, deals opening hands, and installs the game.
    pub fn register(
        &self,
        p1: (Identity, Vec<Card>),
        p2: (Identity, Vec<Card>),
    ) -> Result<GameId, RegistryError> {
        if p1.0.user_id == p2.0.user_id {
            return Err(RegistryError::SamePlayer);
        }

        let (deck1, deck2) = {
            let mut rng = self.rng.lock();
            let admit = |identity: &Identity, cards: Vec<Card>, rng: &mut StdRng| {
                Deck::admit(cards, rng).map_err(|rejection| RegistryError::InvalidDeck {
                    user_id: identity.user_id.clone(),
                    rejection,
                })
            };
            (admit(&p1.0, p1.1, &mut *rng)?, admit(&p2.0, p2.1, &mut *rng)?)
        };

        let mut indices = self.indices.write();
        for identity in [&p1.0, &p2.0] {
            if indices.by_player.contains_key(&identity.user_id) {
                return Err(RegistryError::PlayerAlreadyInGame(identity.user_id.clone()));
            }
        }

        let game_id = Uuid::new_v4();
        let (p1_id, p2_id) = (p1.0.user_id.clone(), p2.0.user_id.clone());
        let game = Game::new(game_id, (p1.0, deck1), (p2.0, deck2), self.rules.clone());
        indices.active.insert(
            game_id,
            Arc::new(GameHandle {
                id: game_id,
                game: RwLock::new(game),
            }),
        );
        for user_id in [p1_id.clone(), p2_id.clone()] {
            indices.last_finished.remove(&user_id);
            indices.by_player.insert(user_id, game_id);
        }
        drop(indices);

        info!(
            target: LOG_TARGET,
            %game_id,
            p1 = %p1_id,
            p2 = %p2_id,
            "game registered"
        );
        Ok(game_id)
    }

    /// Active game by id.
    pub fn lookup(&self, game_id: &GameId) -> Option<Arc<GameHandle>> {
        self.indices.read().active.get(game_id).cloned()
    }

    /// Active or recently finished game by id.
    pub fn lookup_any(&self, game_id: &GameId) -> Option<Arc<GameHandle>> {
        let indices = self.indices.read();
        indices
            .active
            .get(game_id)
            .cloned()
            .or_else(|| indices.finished.get(game_id).map(|r| Arc::clone(&r.handle)))
    }

    pub fn active_game_for(&self, user_id: &str) -> Option<GameId> {
        self.indices.read().by_player.get(user_id).copied()
    }

    /// The player's most recent finished game, while it is still retained.
    pub fn last_finished_for(&self, user_id: &str) -> Option<Arc<GameHandle>> {
        let indices = self.indices.read();
        let game_id = indices.last_finished.get(user_id)?;
        indices.finished.get(game_id).map(|r| Arc::clone(&r.handle))
    }

    pub fn forget_last_finished(&self, user_id: &str) {
        self.indices.write().last_finished.remove(user_id);
    }

    /// Moves a game out of the active set and releases both players. Idempotent.
    pub fn retire(&self, game_id: &GameId) -> bool {
        let mut indices = self.indices.write();
        let Some(handle) = indices.active.remove(game_id) else {
            return false;
        };
        let players: Vec<UserId> = indices
            .by_player
            .iter()
            .filter(|(_, id)| *id == game_id)
            .map(|(user, _)| user.clone())
            .collect();
        for user_id in players {
            indices.by_player.remove(&user_id);
            indices.last_finished.insert(user_id, *game_id);
        }
        indices.finished.insert(
            *game_id,
            Retired {
                handle,
                retired_at: Instant::now(),
            },
        );
        debug!(target: LOG_TARGET, %game_id, "game retired");
        true
    }

    pub fn active_games(&self) -> Vec<Arc<GameHandle>> {
        self.indices.read().active.values().cloned().collect()
    }

    /// Drops finished games retired more than `retention` ago.
    pub fn purge_finished(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut indices = self.indices.write();
        let before = indices.finished.len();
        indices
            .finished
            .retain(|_, retired| now.saturating_duration_since(retired.retired_at) < retention);
        let Indices {
            finished,
            last_finished,
            ..
        } = &mut *indices;
        last_finished.retain(|_, game_id| finished.contains_key(game_id));
        before - finished.len()
    }

    pub fn active_count(&self) -> usize {
        self.indices.read().active.len()
    }

    pub fn finished_count(&self) -> usize {
        self.indices.read().finished.len()
    }
}

#[cfg(test)]
impl MatchRegistry {
    /// Installs a prepared game, bypassing the shuffle.
    pub(crate) fn install(&self, game: Game) -> GameId {
        let game_id = game.id();
        let players: Vec<UserId> = Seat::BOTH
            .into_iter()
            .map(|seat| game.player(seat).identity.user_id.clone())
            .collect();
        let mut indices = self.indices.write();
        indices.active.insert(
            game_id,
            Arc::new(GameHandle {
                id: game_id,
                game: RwLock::new(game),
            }),
        );
        for user_id in players {
            indices.by_player.insert(user_id, game_id);
        }
        game_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::legal_deck;

    fn registry() -> MatchRegistry {
        MatchRegistry::new(&EngineConfig {
            rng_seed: Some(11),
            ..EngineConfig::default()
        })
    }

    fn ana() -> Identity {
        Identity::new("u-ana", "ana")
    }

    fn bo() -> Identity {
        Identity::new("u-bo", "bo")
    }

    #[test]
    fn register_deals_three_cards_each() {
        let registry = registry();
        let game_id = registry
            .register((ana(), legal_deck()), (bo(), legal_deck()))
            .unwrap();

        let handle = registry.lookup(&game_id).unwrap();
        let game = handle.read();
        for seat in Seat::BOTH {
            assert_eq!(game.player(seat).hand().len(), 3);
            assert_eq!(game.player(seat).deck_remaining(), 6);
        }
        assert_eq!(game.turn_number(), 0);
        assert_eq!(registry.active_game_for("u-ana"), Some(game_id));
        assert_eq!(registry.active_game_for("u-bo"), Some(game_id));
    }

    #[test]
    fn players_hold_at_most_one_active_game() {
        let registry = registry();
        registry
            .register((ana(), legal_deck()), (bo(), legal_deck()))
            .unwrap();
        let err = registry
            .register((Identity::new("u-cy", "cy"), legal_deck()), (bo(), legal_deck()))
            .unwrap_err();
        assert_eq!(err, RegistryError::PlayerAlreadyInGame("u-bo".into()));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.active_game_for("u-cy"), None);
    }

    #[test]
    fn self_pairing_and_illegal_decks_are_refused() {
        let registry = registry();
        assert_eq!(
            registry.register((ana(), legal_deck()), (ana(), legal_deck())),
            Err(RegistryError::SamePlayer)
        );

        let mut short = legal_deck();
        short.pop();
        assert!(matches!(
            registry.register((ana(), legal_deck()), (bo(), short)),
            Err(RegistryError::InvalidDeck { user_id, .. }) if user_id == "u-bo"
        ));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn retire_is_idempotent_and_keeps_a_tombstone() {
        let registry = registry();
        let game_id = registry
            .register((ana(), legal_deck()), (bo(), legal_deck()))
            .unwrap();

        assert!(registry.retire(&game_id));
        assert!(!registry.retire(&game_id));
        assert!(registry.lookup(&game_id).is_none());
        assert!(registry.lookup_any(&game_id).is_some());
        assert_eq!(registry.active_game_for("u-ana"), None);
        assert_eq!(
            registry.last_finished_for("u-ana").map(|h| h.id()),
            Some(game_id)
        );

        assert_eq!(registry.purge_finished(Duration::ZERO), 1);
        assert!(registry.lookup_any(&game_id).is_none());
        assert!(registry.last_finished_for("u-ana").is_none());
    }

    #[test]
    fn retired_players_can_be_paired_again() {
        let registry = registry();
        let first = registry
            .register((ana(), legal_deck()), (bo(), legal_deck()))
            .unwrap();
        registry.retire(&first);
        let second = registry
            .register((bo(), legal_deck()), (ana(), legal_deck()))
            .unwrap();
        assert_ne!(first, second);
        assert!(registry.last_finished_for("u-ana").is_none());
    }
}
