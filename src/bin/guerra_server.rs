use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use guerra::config::{
    EngineConfig, DEFAULT_COLLABORATOR_TIMEOUT, DEFAULT_FINISHED_RETENTION,
    DEFAULT_HISTORY_RETRY_BASE, DEFAULT_HISTORY_RETRY_MAX, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL,
};
use guerra::engine::rules::{DEFAULT_HAND_SIZE, DEFAULT_SCORE_TARGET};
use guerra::server::{run_server, ServerConfig};

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "guerra_server")]
#[command(about = "Run the card-duel match server", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "GUERRA_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// JSON card catalog; the built-in catalog is used when omitted
    #[arg(long, env = "GUERRA_CATALOG")]
    catalog: Option<PathBuf>,

    /// Identity service base URL (serves `users/me`)
    #[arg(long, env = "GUERRA_IDENTITY_URL")]
    identity_url: Option<Url>,

    /// Deck service base URL (serves `decks/{user_id}/{slot}`)
    #[arg(long, env = "GUERRA_DECK_URL")]
    deck_url: Option<Url>,

    /// History service base URL (accepts `POST matches`)
    #[arg(long, env = "GUERRA_HISTORY_URL")]
    history_url: Option<Url>,

    /// Players and decks for the in-memory collaborators
    #[arg(long, env = "GUERRA_FIXTURES")]
    fixtures: Option<PathBuf>,

    /// Points needed to win a game
    #[arg(long, env = "GUERRA_SCORE_TARGET", default_value_t = DEFAULT_SCORE_TARGET)]
    score_target: u32,

    /// Optional cap on resolved rounds
    #[arg(long, env = "GUERRA_MAX_TURNS")]
    max_turns: Option<u32>,

    /// Cards held in hand
    #[arg(long, env = "GUERRA_HAND_SIZE", default_value_t = DEFAULT_HAND_SIZE)]
    hand_size: usize,

    /// Seconds without a submission before a game is abandoned
    #[arg(long, env = "GUERRA_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs_f64())]
    idle_timeout_secs: f64,

    /// Seconds a finished game stays readable
    #[arg(long, env = "GUERRA_FINISHED_RETENTION_SECS", default_value_t = DEFAULT_FINISHED_RETENTION.as_secs_f64())]
    finished_retention_secs: f64,

    /// Seconds between idle sweeps
    #[arg(long, env = "GUERRA_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs_f64())]
    sweep_interval_secs: f64,

    /// Deadline for each identity or deck service call, in seconds
    #[arg(long, env = "GUERRA_COLLABORATOR_TIMEOUT_SECS", default_value_t = DEFAULT_COLLABORATOR_TIMEOUT.as_secs_f64())]
    collaborator_timeout_secs: f64,

    /// First retry delay for history delivery, in seconds
    #[arg(long, env = "GUERRA_HISTORY_RETRY_BASE_SECS", default_value_t = DEFAULT_HISTORY_RETRY_BASE.as_secs_f64())]
    history_retry_base_secs: f64,

    /// Longest retry delay for history delivery, in seconds
    #[arg(long, env = "GUERRA_HISTORY_RETRY_MAX_SECS", default_value_t = DEFAULT_HISTORY_RETRY_MAX.as_secs_f64())]
    history_retry_max_secs: f64,

    /// Optional RNG seed for deterministic deck shuffles
    #[arg(long, env = "GUERRA_RNG_SEED")]
    rng_seed: Option<u64>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "GUERRA_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let config = build_config(args).context("failed to build server config")?;
    run_server(config).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn secs(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {name}: {value}"))
}

fn build_config(args: Args) -> Result<ServerConfig> {
    let engine = EngineConfig {
        score_target: args.score_target,
        max_turns: args.max_turns,
        hand_size: args.hand_size,
        idle_timeout: secs("idle timeout", args.idle_timeout_secs)?,
        finished_retention: secs("finished retention", args.finished_retention_secs)?,
        sweep_interval: secs("sweep interval", args.sweep_interval_secs)?,
        collaborator_timeout: secs("collaborator timeout", args.collaborator_timeout_secs)?,
        history_retry_base: secs("history retry base", args.history_retry_base_secs)?,
        history_retry_max: secs("history retry max", args.history_retry_max_secs)?,
        rng_seed: args.rng_seed,
    };
    anyhow::ensure!(engine.score_target > 0, "score target must be positive");
    anyhow::ensure!(engine.hand_size > 0, "hand size must be positive");
    anyhow::ensure!(
        !engine.sweep_interval.is_zero(),
        "sweep interval must be positive"
    );

    Ok(ServerConfig {
        bind: args.bind,
        engine,
        catalog_path: args.catalog,
        identity_url: args.identity_url,
        deck_url: args.deck_url,
        history_url: args.history_url,
        fixtures_path: args.fixtures,
    })
}
