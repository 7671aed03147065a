//! Environment-driven configuration.

use crate::store::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Rules and tuning for the referee
#[derive(Debug, Clone)]
pub struct RefereeConfig {
    /// Wrong replies against one phrase before the last player wins
    pub fail_limit: u32,
    /// Cooldown seeded on a phrase that wins by exhausting the chain
    pub win_cooldown: u32,
    /// Cooldown seeded on the phrase nobody could answer within the fail limit
    pub fail_limit_cooldown: u32,
    /// Random draws before falling back to a full dictionary scan
    pub opening_draws: usize,
    /// Page size for the opening scan
    pub opening_scan_page: usize,
    /// Reject a user answering their own phrase
    pub block_repeat_turns: bool,
    pub read_retry: RetryPolicy,
}

impl Default for RefereeConfig {
    fn default() -> Self {
        Self {
            fail_limit: 10,
            win_cooldown: 3,
            fail_limit_cooldown: 5,
            opening_draws: 256,
            opening_scan_page: 2000,
            block_repeat_turns: true,
            read_retry: RetryPolicy::default(),
        }
    }
}

/// How a word list is loaded into the dictionary
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Delete the existing dictionary and token index first
    pub purge_before_load: bool,
    /// Allow the purge even when the new source yields no phrases
    pub purge_on_empty_source: bool,
    /// Phrases written per batch
    pub batch_size: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            purge_before_load: true,
            purge_on_empty_source: false,
            batch_size: 5000,
        }
    }
}

/// Top-level configuration for the console driver
#[derive(Debug, Clone)]
pub struct Config {
    pub referee: RefereeConfig,
    pub bootstrap: BootstrapConfig,
    pub dictionary_path: PathBuf,
    /// Game id for the console session (None = generate one)
    pub game_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            referee: RefereeConfig::default(),
            bootstrap: BootstrapConfig::default(),
            dictionary_path: PathBuf::from("words/words.txt"),
            game_id: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl RefereeConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let read_retry = RetryPolicy {
            attempts: env_parse("WORDCHAIN_READ_RETRIES").unwrap_or(defaults.read_retry.attempts),
            backoff: env_parse("WORDCHAIN_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_retry.backoff),
        };

        let config = Self {
            fail_limit: env_parse("WORDCHAIN_FAIL_LIMIT")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.fail_limit),
            win_cooldown: env_parse("WORDCHAIN_WIN_COOLDOWN").unwrap_or(defaults.win_cooldown),
            fail_limit_cooldown: env_parse("WORDCHAIN_FAIL_LIMIT_COOLDOWN")
                .unwrap_or(defaults.fail_limit_cooldown),
            opening_draws: env_parse("WORDCHAIN_OPENING_DRAWS").unwrap_or(defaults.opening_draws),
            opening_scan_page: env_parse("WORDCHAIN_OPENING_SCAN_PAGE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.opening_scan_page),
            block_repeat_turns: env_flag(
                "WORDCHAIN_BLOCK_REPEAT_TURNS",
                defaults.block_repeat_turns,
            ),
            read_retry,
        };

        tracing::info!(
            fail_limit = config.fail_limit,
            win_cooldown = config.win_cooldown,
            fail_limit_cooldown = config.fail_limit_cooldown,
            block_repeat_turns = config.block_repeat_turns,
            "Referee config loaded"
        );

        config
    }
}

impl BootstrapConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            purge_before_load: env_flag("WORDCHAIN_PURGE_BEFORE_LOAD", defaults.purge_before_load),
            purge_on_empty_source: env_flag(
                "WORDCHAIN_PURGE_ON_EMPTY",
                defaults.purge_on_empty_source,
            ),
            batch_size: env_parse("WORDCHAIN_BOOTSTRAP_BATCH")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            referee: RefereeConfig::from_env(),
            bootstrap: BootstrapConfig::from_env(),
            dictionary_path: env_string("WORDCHAIN_DICT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.dictionary_path),
            game_id: env_string("WORDCHAIN_GAME_ID"),
        }
    }
}
