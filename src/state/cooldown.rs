use crate::store::{read_with_retry, Batch, KeyValueStore, RetryPolicy, StoreError, StoreResult};
use crate::text::Phrase;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-game table of phrases that recently ended a round.
///
/// Each entry counts the round endings left before the phrase is playable again.
/// Entries outlive round resets.
#[derive(Clone)]
pub struct CooldownTable {
    store: Arc<dyn KeyValueStore>,
    key: String,
    retry: RetryPolicy,
}

fn parse_uses(key: &str, raw: &str) -> StoreResult<u32> {
    raw.parse().map_err(|_| StoreError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

impl CooldownTable {
    pub fn new(store: Arc<dyn KeyValueStore>, key: String, retry: RetryPolicy) -> Self {
        Self { store, key, retry }
    }

    /// Uses left for `phrase`, if it is cooling down
    pub async fn remaining(&self, phrase: &Phrase) -> StoreResult<Option<u32>> {
        let store = &self.store;
        let key = self.key.as_str();
        let raw = read_with_retry(self.retry, move || store.hget(key, phrase.as_str()))
            .await?;
        match raw {
            Some(raw) => Ok(Some(parse_uses(key, &raw)?).filter(|n| *n > 0)),
            None => Ok(None),
        }
    }

    pub async fn entries(&self) -> StoreResult<HashMap<String, u32>> {
        let store = &self.store;
        let key = self.key.as_str();
        let raw = read_with_retry(self.retry, move || store.hgetall(key))
            .await?;
        raw.into_iter()
            .map(|(phrase, uses)| Ok((phrase, parse_uses(key, &uses)?)))
            .collect()
    }

    /// Queue a decay of every other entry, then seed `phrase` with `uses`
    pub async fn stage_seed(
        &self,
        batch: &mut Batch,
        phrase: &Phrase,
        uses: u32,
    ) -> StoreResult<()> {
        for (other, left) in self.entries().await? {
            if other == phrase.as_str() {
                continue;
            }
            match left.saturating_sub(1) {
                0 => batch.hdel(self.key.clone(), other),
                n => batch.hset(self.key.clone(), other, n.to_string()),
            };
        }
        if uses == 0 {
            batch.hdel(self.key.clone(), phrase.as_str());
        } else {
            batch.hset(self.key.clone(), phrase.as_str(), uses.to_string());
        }
        Ok(())
    }
}
