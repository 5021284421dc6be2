use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::cards::{CardRef, Catalog};
use crate::collaborators::{
    DeckProvider, HistorySink, HttpDeckProvider, HttpHistorySink, HttpIdentityResolver,
    IdentityResolver, InMemoryDeckProvider, InMemoryHistorySink, InMemoryIdentityResolver,
};
use crate::config::EngineConfig;
use crate::service::Backend;
use crate::sweeper::IdleSweeper;
use crate::types::{DeckSlot, Identity};

use super::routes::GuerraServer;

const LOG_TARGET: &str = "guerra::server::bootstrap";

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub engine: EngineConfig,
    /// Card table to load; the built-in one when absent.
    pub catalog_path: Option<PathBuf>,
    pub identity_url: Option<Url>,
    pub deck_url: Option<Url>,
    pub history_url: Option<Url>,
    /// Players and decks seeded into the in-memory collaborators.
    pub fixtures_path: Option<PathBuf>,
}

/// Tokens, identities and saved decks for running without the real services.
#[derive(Debug, Default, Deserialize)]
pub struct DevFixtures {
    #[serde(default)]
    pub players: Vec<DevPlayer>,
}

#[derive(Debug, Deserialize)]
pub struct DevPlayer {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub decks: BTreeMap<DeckSlot, Vec<CardRef>>,
}

impl DevFixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse fixtures {}", path.display()))
    }
}

struct Collaborators {
    identity: Arc<dyn IdentityResolver>,
    decks: Arc<dyn DeckProvider>,
    history: Arc<dyn HistorySink>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("failed to load card catalog {}", path.display()))?,
        None => {
            let catalog = Catalog::builtin().context("failed to load built-in card catalog")?;
            info!(target: LOG_TARGET, cards = catalog.len(), "using built-in card catalog");
            catalog
        }
    };

    let collaborators = build_collaborators(&config)?;
    let backend = Backend::assemble(
        &config.engine,
        Arc::new(catalog),
        collaborators.identity,
        collaborators.decks,
        collaborators.history,
    );

    let cancel = CancellationToken::new();
    let outbox_task = backend.outbox.spawn_worker(cancel.child_token());
    let sweeper_task =
        IdleSweeper::new(Arc::clone(&backend.engine), &config.engine).spawn(cancel.child_token());

    let server = GuerraServer::new(Arc::clone(&backend.service));
    let make_service = server.into_router().into_make_service();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target: LOG_TARGET,
        %local_addr,
        score_target = config.engine.score_target,
        max_turns = ?config.engine.max_turns,
        "guerra server listening"
    );

    let served = axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error");

    cancel.cancel();
    for (name, task) in [("history-outbox", outbox_task), ("idle-sweeper", sweeper_task)] {
        if let Err(err) = task.await {
            warn!(target: LOG_TARGET, task = name, error = %err, "background task panicked");
        }
    }
    served
}

fn build_collaborators(config: &ServerConfig) -> Result<Collaborators> {
    let client = reqwest::Client::builder()
        .timeout(config.engine.collaborator_timeout)
        .build()
        .context("failed to build http client")?;

    let fixtures = match &config.fixtures_path {
        Some(path) => DevFixtures::load(path)?,
        None => DevFixtures::default(),
    };

    let identity: Arc<dyn IdentityResolver> = match &config.identity_url {
        Some(url) => Arc::new(
            HttpIdentityResolver::new(client.clone(), &as_base(url))
                .context("invalid identity service url")?,
        ),
        None => {
            warn!(
                target: LOG_TARGET,
                players = fixtures.players.len(),
                "no identity service configured; using in-memory tokens"
            );
            let resolver = InMemoryIdentityResolver::new();
            for player in &fixtures.players {
                resolver.insert(
                    player.token.clone(),
                    Identity::new(player.user_id.clone(), player.display_name.clone()),
                );
            }
            Arc::new(resolver)
        }
    };

    let decks: Arc<dyn DeckProvider> = match &config.deck_url {
        Some(url) => Arc::new(HttpDeckProvider::new(client.clone(), as_base(url))),
        None => {
            warn!(target: LOG_TARGET, "no deck service configured; using in-memory decks");
            let provider = InMemoryDeckProvider::new();
            for player in &fixtures.players {
                for (slot, cards) in &player.decks {
                    provider.save(player.user_id.clone(), *slot, cards.clone());
                }
            }
            Arc::new(provider)
        }
    };

    let history: Arc<dyn HistorySink> = match &config.history_url {
        Some(url) => Arc::new(
            HttpHistorySink::new(client, &as_base(url)).context("invalid history service url")?,
        ),
        None => {
            warn!(
                target: LOG_TARGET,
                "no history service configured; match records stay in memory"
            );
            Arc::new(InMemoryHistorySink::new())
        }
    };

    Ok(Collaborators {
        identity,
        decks,
        history,
    })
}

/// Relative joins only keep the last path segment when it ends in `/`.
fn as_base(url: &Url) -> Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: LOG_TARGET, error = %err, "failed to install ctrl-c handler");
    }
    info!(target: LOG_TARGET, "shutdown signal received");
}
