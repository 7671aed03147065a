mod cooldown;
mod round;

pub use cooldown::CooldownTable;
pub use round::RoundStore;

use crate::config::{BootstrapConfig, RefereeConfig};
use crate::dictionary::{self, BootstrapReport, Dictionary, DictionaryError};
use crate::referee::Referee;
use crate::store::{self, keys, KeyValueStore, MemoryStore, StoreError};
use crate::text::Phrase;
use crate::types::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const INVALIDATE_SCAN_PAGE: usize = 500;

/// Shared application state
///
/// Round operations for one game are serialized by a per-game lock. Dictionary rebuilds
/// and edits take the dictionary gate exclusively, so they never overlap a round operation.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub config: Arc<RefereeConfig>,
    pub dictionary: Dictionary,
    round_locks: Arc<RwLock<HashMap<GameId, Arc<Mutex<()>>>>>,
    dictionary_gate: Arc<RwLock<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RefereeConfig) -> Self {
        let dictionary = Dictionary::new(store.clone(), config.read_retry);
        Self {
            store,
            config: Arc::new(config),
            dictionary,
            round_locks: Arc::new(RwLock::new(HashMap::new())),
            dictionary_gate: Arc::new(RwLock::new(())),
        }
    }

    /// State backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: RefereeConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Referee for `game_id`; every referee for the same game shares one lock
    pub async fn referee(&self, game_id: &str) -> Referee {
        let lock = {
            let mut locks = self.round_locks.write().await;
            // Drop locks no live referee holds
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(game_id.to_string()).or_default().clone()
        };

        Referee::new(
            self.store.clone(),
            game_id,
            self.config.clone(),
            lock,
            self.dictionary_gate.clone(),
        )
    }

    /// Rebuild the dictionary from `lines` with no round operation in flight.
    ///
    /// Cached remaining-candidate buckets of every game are dropped afterwards and
    /// recomputed against the new index on next use.
    pub async fn bootstrap<I, S>(
        &self,
        lines: I,
        config: &BootstrapConfig,
    ) -> Result<BootstrapReport, DictionaryError>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send,
        S: AsRef<str> + Send,
    {
        let _gate = self.dictionary_gate.write().await;
        let report = self.dictionary.bootstrap(lines, config).await?;
        let dropped = store::delete_matching(
            self.store.as_ref(),
            keys::ALL_REMAINING_PATTERN,
            INVALIDATE_SCAN_PAGE,
        )
        .await?;
        if dropped > 0 {
            tracing::info!(dropped, "Invalidated cached candidate buckets after bootstrap");
        }
        Ok(report)
    }

    /// Load a word list file and bootstrap from it
    pub async fn bootstrap_file(
        &self,
        path: impl AsRef<Path>,
        config: &BootstrapConfig,
    ) -> Result<BootstrapReport, DictionaryError> {
        let lines = dictionary::read_word_file(path).await?;
        self.bootstrap(lines, config).await
    }

    /// Add one phrase to the dictionary. Returns the normalized phrase if it was new.
    pub async fn add_phrase(&self, raw: &str) -> Result<Option<Phrase>, StoreError> {
        let Some(phrase) = Phrase::parse(raw) else {
            return Ok(None);
        };
        let _gate = self.dictionary_gate.write().await;
        if !self.dictionary.insert(&phrase).await? {
            return Ok(None);
        }
        self.invalidate_bucket(&phrase).await?;

        tracing::info!(phrase = %phrase, "Phrase added to dictionary");
        Ok(Some(phrase))
    }

    /// Remove one phrase from the dictionary. Rounds that already used it keep it in
    /// their history.
    pub async fn remove_phrase(&self, raw: &str) -> Result<Option<Phrase>, StoreError> {
        let Some(phrase) = Phrase::parse(raw) else {
            return Ok(None);
        };
        let _gate = self.dictionary_gate.write().await;
        if !self.dictionary.remove(&phrase).await? {
            return Ok(None);
        }
        self.invalidate_bucket(&phrase).await?;

        tracing::info!(phrase = %phrase, "Phrase removed from dictionary");
        Ok(Some(phrase))
    }

    /// Drop every game's cached bucket for the phrase's first token
    async fn invalidate_bucket(&self, phrase: &Phrase) -> Result<(), StoreError> {
        if let Some(token) = phrase.first_token() {
            store::delete_matching(
                self.store.as_ref(),
                &keys::remaining_in_all_games(token),
                INVALIDATE_SCAN_PAGE,
            )
            .await?;
        }
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(RefereeConfig::default())
    }
}
