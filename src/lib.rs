pub mod cards;
pub mod collaborators;
pub mod config;
pub mod deck;
pub mod engine;
pub mod matchmaking;
pub mod outbox;
pub mod registry;
pub mod server;
pub mod service;
pub mod sweeper;
pub mod tokio_tools;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use cards::{Card, Catalog, Rank, Suit};
pub use config::EngineConfig;
pub use service::{Backend, GameService, ServiceError};
