//! Shared fixtures for unit tests across the crate.

/// Cards and decks.
pub mod fixtures {
    use uuid::Uuid;

    use crate::cards::{Card, CardRef};
    use crate::deck::Deck;
    use crate::engine::rules::MatchRules;
    use crate::engine::state::Game;
    use crate::types::Identity;

    pub fn card(id: &str) -> Card {
        Card::parse_id(id).unwrap_or_else(|err| panic!("bad fixture card {id}: {err}"))
    }

    pub fn cards(ids: &[&str]) -> Vec<Card> {
        ids.iter().map(|id| card(id)).collect()
    }

    pub fn card_refs(ids: &[&str]) -> Vec<CardRef> {
        ids.iter().map(|id| CardRef::from(*id)).collect()
    }

    /// A legal deck with the joker last.
    pub const LEGAL_DECK: [&str; 9] = [
        "hearts_10",
        "hearts_5",
        "diamonds_K",
        "diamonds_2",
        "clubs_A",
        "clubs_8",
        "spades_Q",
        "spades_3",
        "joker",
    ];

    /// Opens with joker, A♦, 7♠.
    pub const OPENER_DECK: [&str; 9] = [
        "joker",
        "diamonds_A",
        "spades_7",
        "hearts_10",
        "hearts_5",
        "diamonds_2",
        "clubs_K",
        "clubs_2",
        "spades_3",
    ];

    /// Opens with A♥, K♣, 7♥.
    pub const FACES_DECK: [&str; 9] = [
        "hearts_A",
        "clubs_K",
        "hearts_7",
        "clubs_2",
        "diamonds_3",
        "diamonds_4",
        "spades_2",
        "spades_5",
        "joker",
    ];

    /// Opens with 9♣, joker, 2♥.
    pub const NUMERALS_DECK: [&str; 9] = [
        "clubs_9",
        "joker",
        "hearts_2",
        "clubs_6",
        "hearts_3",
        "diamonds_10",
        "diamonds_5",
        "spades_8",
        "spades_4",
    ];

    /// Breaks the hearts point cap with 9♥ + 8♥.
    pub const OVER_CAP_DECK: [&str; 9] = [
        "hearts_9",
        "hearts_8",
        "diamonds_K",
        "diamonds_2",
        "clubs_A",
        "clubs_8",
        "spades_Q",
        "spades_3",
        "joker",
    ];

    pub fn legal_deck() -> Vec<Card> {
        cards(&LEGAL_DECK)
    }

    pub fn ana() -> Identity {
        Identity::new("u-ana", "ana")
    }

    pub fn bo() -> Identity {
        Identity::new("u-bo", "bo")
    }

    /// A game whose decks are dealt in the given order, without shuffling.
    pub fn ordered_game(p1_deck: &[&str], p2_deck: &[&str], rules: MatchRules) -> Game {
        let admit = |ids: &[&str]| {
            Deck::admit_ordered(cards(ids)).unwrap_or_else(|err| panic!("illegal fixture deck: {err}"))
        };
        Game::new(
            Uuid::new_v4(),
            (ana(), admit(p1_deck)),
            (bo(), admit(p2_deck)),
            rules,
        )
    }
}

/// In-memory collaborators wired into a full service.
pub mod harness {
    use std::sync::Arc;

    use crate::cards::Catalog;
    use crate::collaborators::{InMemoryDeckProvider, InMemoryHistorySink, InMemoryIdentityResolver};
    use crate::config::EngineConfig;
    use crate::matchmaking::JoinOutcome;
    use crate::outbox::HistoryOutbox;
    use crate::registry::MatchRegistry;
    use crate::service::{Backend, GameService};
    use crate::types::{GameId, Identity};

    use super::fixtures::{card_refs, LEGAL_DECK};

    pub const PLAYERS: [(&str, &str, &str); 3] = [
        ("tok-ana", "u-ana", "ana"),
        ("tok-bo", "u-bo", "bo"),
        ("tok-cy", "u-cy", "cy"),
    ];

    pub struct Harness {
        pub service: Arc<GameService>,
        pub identity: Arc<InMemoryIdentityResolver>,
        pub decks: Arc<InMemoryDeckProvider>,
        pub sink: Arc<InMemoryHistorySink>,
        pub outbox: Arc<HistoryOutbox>,
        pub registry: Arc<MatchRegistry>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(EngineConfig {
                rng_seed: Some(42),
                ..EngineConfig::default()
            })
        }

        pub fn with_config(config: EngineConfig) -> Self {
            let identity = Arc::new(InMemoryIdentityResolver::new());
            let decks = Arc::new(InMemoryDeckProvider::new());
            for (token, user_id, name) in PLAYERS {
                identity.insert(token, Identity::new(user_id, name));
                decks.save(user_id, 1, card_refs(&LEGAL_DECK));
            }
            let sink = Arc::new(InMemoryHistorySink::new());
            let backend = Backend::assemble(
                &config,
                Arc::new(Catalog::builtin().expect("builtin catalog")),
                identity.clone(),
                decks.clone(),
                sink.clone(),
            );
            Self {
                service: backend.service,
                identity,
                decks,
                sink,
                outbox: backend.outbox,
                registry: backend.registry,
            }
        }

        /// Queues `first`, then joins `second`, returning the new game.
        pub async fn pair(&self, first: &str, second: &str) -> GameId {
            let waiting = self.service.join(first, 1).await.expect("first join");
            assert_eq!(waiting, JoinOutcome::Waiting);
            match self.service.join(second, 1).await.expect("second join") {
                JoinOutcome::Matched { game_id, .. } => game_id,
                other => panic!("expected a match, got {other:?}"),
            }
        }
    }
}
