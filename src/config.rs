use std::time::Duration;

use serde::Deserialize;

use crate::engine::rules::{MatchRules, DEFAULT_HAND_SIZE, DEFAULT_SCORE_TARGET};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_FINISHED_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HISTORY_RETRY_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_HISTORY_RETRY_MAX: Duration = Duration::from_secs(60);

/// Runtime knobs for the match engine and its background tasks.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub score_target: u32,
    pub max_turns: Option<u32>,
    pub hand_size: usize,
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub finished_retention: Duration,
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
    #[serde(with = "duration_secs")]
    pub collaborator_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub history_retry_base: Duration,
    #[serde(with = "duration_secs")]
    pub history_retry_max: Duration,
    /// Seeds deck shuffles; entropy is used when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            score_target: DEFAULT_SCORE_TARGET,
            max_turns: None,
            hand_size: DEFAULT_HAND_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            finished_retention: DEFAULT_FINISHED_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            history_retry_base: DEFAULT_HISTORY_RETRY_BASE,
            history_retry_max: DEFAULT_HISTORY_RETRY_MAX,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn match_rules(&self) -> MatchRules {
        MatchRules {
            score_target: self.score_target,
            max_turns: self.max_turns,
            hand_size: self.hand_size,
        }
    }
}

/// Durations are written as (fractional) seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
