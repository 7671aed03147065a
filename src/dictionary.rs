//! Dictionary of legal phrases and the token index over their first tokens.
//!
//! Layout in the store:
//! - `dict:phrases`: every phrase
//! - `dict:tokenx:<token>`: phrases whose first token is `<token>`

use crate::config::BootstrapConfig;
use crate::store::{self, keys, read_with_retry, Batch, KeyValueStore, RetryPolicy, StoreError};
use crate::text::Phrase;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lines starting with this marker are ignored
pub const COMMENT_MARKER: &str = "#";

const PURGE_SCAN_PAGE: usize = 1000;

/// Errors that can occur while loading or editing the dictionary
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("Failed to read word list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Word list yielded no phrases; refusing to purge the existing dictionary")]
    EmptySource,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of a bootstrap run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub loaded: usize,
    pub skipped: usize,
    pub purged: bool,
}

/// Read a word list file into lines
pub async fn read_word_file(path: impl AsRef<Path>) -> Result<Vec<String>, DictionaryError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Turn a raw line into a dictionary phrase, if it is one
fn parse_line(line: &str) -> Option<Phrase> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
        return None;
    }
    // A phrase without tokens could never be chained to
    Phrase::parse(trimmed).filter(|p| p.first_token().is_some())
}

/// Handle over the dictionary keys in the store
#[derive(Clone)]
pub struct Dictionary {
    store: Arc<dyn KeyValueStore>,
    retry: RetryPolicy,
}

impl Dictionary {
    pub fn new(store: Arc<dyn KeyValueStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn contains(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        let store = &self.store;
        read_with_retry(self.retry, move || {
            store.sismember(keys::DICT, phrase.as_str())
        })
        .await
    }

    pub async fn len(&self) -> Result<u64, StoreError> {
        let store = &self.store;
        read_with_retry(self.retry, move || store.scard(keys::DICT))
            .await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Number of phrases starting with `token`
    pub async fn bucket_len(&self, token: &str) -> Result<u64, StoreError> {
        let store = &self.store;
        let key = keys::token_index(token);
        let key = key.as_str();
        read_with_retry(self.retry, move || store.scard(key)).await
    }

    /// Every phrase starting with `token`
    pub async fn bucket(&self, token: &str) -> Result<Vec<Phrase>, StoreError> {
        let key = keys::token_index(token);
        self.scan_set(&key).await
    }

    /// A uniformly random phrase
    pub async fn random_phrase(&self) -> Result<Option<Phrase>, StoreError> {
        let store = &self.store;
        let picked = read_with_retry(self.retry, move || store.srandmember(keys::DICT))
            .await?;
        Ok(picked.map(Phrase::from_normalized))
    }

    /// One page of dictionary phrases, for deterministic full scans
    pub async fn scan_page(
        &self,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<Phrase>), StoreError> {
        let store = &self.store;
        let (next, members) =
            read_with_retry(self.retry, move || store.sscan(keys::DICT, cursor, count))
                .await?;
        Ok((next, members.into_iter().map(Phrase::from_normalized).collect()))
    }

    /// Whether some other phrase can follow `phrase`.
    ///
    /// A phrase starting and ending with the same token sits in its own continuation
    /// bucket and does not count as a reply to itself.
    pub async fn has_continuation(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        let Some(token) = phrase.last_token() else {
            return Ok(false);
        };
        let replies = self.bucket_len(token).await?;
        let own = phrase.first_token() == Some(token) && self.contains(phrase).await?;
        Ok(replies > u64::from(own))
    }

    /// Queue the writes that add `phrase` to the dictionary and its bucket
    pub fn stage_insert(batch: &mut Batch, phrase: &Phrase) -> bool {
        let Some(token) = phrase.first_token() else {
            return false;
        };
        batch
            .sadd(keys::DICT, phrase.as_str())
            .sadd(keys::token_index(token), phrase.as_str());
        true
    }

    /// Queue the writes that remove `phrase` from the dictionary and its bucket
    pub fn stage_remove(batch: &mut Batch, phrase: &Phrase) {
        batch.srem(keys::DICT, phrase.as_str());
        if let Some(token) = phrase.first_token() {
            batch.srem(keys::token_index(token), phrase.as_str());
        }
    }

    /// Add one phrase. Returns false if it was already present or has no tokens.
    pub async fn insert(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        if self.contains(phrase).await? {
            return Ok(false);
        }
        let mut batch = Batch::new();
        if !Self::stage_insert(&mut batch, phrase) {
            return Ok(false);
        }
        self.store.exec(batch).await?;
        Ok(true)
    }

    /// Remove one phrase. Returns false if it was not present.
    pub async fn remove(&self, phrase: &Phrase) -> Result<bool, StoreError> {
        if !self.contains(phrase).await? {
            return Ok(false);
        }
        let mut batch = Batch::new();
        Self::stage_remove(&mut batch, phrase);
        self.store.exec(batch).await?;
        Ok(true)
    }

    /// Load phrases from `lines`, optionally replacing the existing dictionary.
    ///
    /// Not atomic as a whole, but re-running with the same input gives the same end state.
    /// Must not run while rounds are in play; `AppState::bootstrap` enforces that.
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
        let mut report = BootstrapReport::default();
        let mut lines = lines.into_iter();

        // Find the first phrase before touching anything, so an empty source can be refused
        let mut first = None;
        for line in lines.by_ref() {
            match parse_line(line.as_ref()) {
                Some(phrase) => {
                    first = Some(phrase);
                    break;
                }
                None => report.skipped += 1,
            }
        }

        if config.purge_before_load {
            if first.is_none() && !config.purge_on_empty_source {
                tracing::warn!("Word list is empty, keeping the existing dictionary");
                return Err(DictionaryError::EmptySource);
            }
            self.purge().await?;
            report.purged = true;
        }

        let batch_size = config.batch_size.max(1);
        let mut batch = Batch::new();
        let mut pending = 0;
        let skipped = &mut report.skipped;
        let rest = lines.filter_map(|line| {
            let parsed = parse_line(line.as_ref());
            if parsed.is_none() {
                *skipped += 1;
            }
            parsed
        });
        for phrase in first.into_iter().chain(rest) {
            Self::stage_insert(&mut batch, &phrase);
            pending += 1;
            report.loaded += 1;
            if pending == batch_size {
                self.store.exec(batch.take()).await?;
                pending = 0;
            }
        }
        if !batch.is_empty() {
            self.store.exec(batch).await?;
        }

        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped,
            purged = report.purged,
            "Dictionary bootstrapped"
        );
        Ok(report)
    }

    /// Delete the phrase set and every token index bucket
    async fn purge(&self) -> Result<(), StoreError> {
        self.store.del(&[keys::DICT.to_string()]).await?;
        let buckets =
            store::delete_matching(self.store.as_ref(), keys::TOKEN_INDEX_PATTERN, PURGE_SCAN_PAGE)
                .await?;
        tracing::debug!(buckets, "Purged token index");
        Ok(())
    }

    async fn scan_set(&self, key: &str) -> Result<Vec<Phrase>, StoreError> {
        let mut members = Vec::new();
        let mut cursor = 0;
        loop {
            let store = &self.store;
            let (next, chunk) = read_with_retry(self.retry, move || store.sscan(key, cursor, 500))
                .await?;
            members.extend(chunk.into_iter().map(Phrase::from_normalized));
            if next == 0 {
                return Ok(members);
            }
            cursor = next;
        }
    }
}
