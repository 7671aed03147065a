use crate::store::keys::{self, GameKeys};
use crate::store::{
    self, read_with_retry, Batch, KeyValueStore, RetryPolicy, StoreError, StoreResult,
};
use crate::text::Phrase;
use crate::types::*;
use std::sync::Arc;

const FLAG_SET: &str = "1";
const RESET_SCAN_PAGE: usize = 500;

/// Typed view over one game's round keys.
///
/// Holds no state of its own; callers serialize access per game.
#[derive(Clone)]
pub struct RoundStore {
    store: Arc<dyn KeyValueStore>,
    game_id: GameId,
    keys: GameKeys,
    retry: RetryPolicy,
}

impl RoundStore {
    pub fn new(store: Arc<dyn KeyValueStore>, game_id: &str, retry: RetryPolicy) -> Self {
        Self {
            store,
            game_id: game_id.to_string(),
            keys: GameKeys::new(game_id),
            retry,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn keys(&self) -> &GameKeys {
        &self.keys
    }

    async fn read(&self, key: String) -> StoreResult<Option<String>> {
        let store = &self.store;
        let key = key.as_str();
        read_with_retry(self.retry, move || store.get(key)).await
    }

    async fn flag(&self, key: String) -> StoreResult<bool> {
        Ok(self.read(key).await?.as_deref() == Some(FLAG_SET))
    }

    pub async fn last_word(&self) -> StoreResult<Option<Phrase>> {
        Ok(self
            .read(self.keys.last_word())
            .await?
            .map(Phrase::from_normalized))
    }

    pub async fn last_player(&self) -> StoreResult<Option<Player>> {
        Ok(self.read(self.keys.last_user()).await?.map(Player::from_stored))
    }

    pub async fn winner(&self) -> StoreResult<Option<UserId>> {
        self.read(self.keys.winner()).await
    }

    pub async fn is_ended(&self) -> StoreResult<bool> {
        self.flag(self.keys.ended()).await
    }

    pub async fn is_paused(&self) -> StoreResult<bool> {
        self.flag(self.keys.paused()).await
    }

    /// Ended takes precedence over paused
    pub async fn status(&self) -> StoreResult<RoundStatus> {
        if self.is_ended().await? {
            Ok(RoundStatus::Ended)
        } else if self.is_paused().await? {
            Ok(RoundStatus::Paused)
        } else {
            Ok(RoundStatus::Active)
        }
    }

    pub async fn set_paused(&self, paused: bool) -> StoreResult<()> {
        let mut batch = Batch::new();
        if paused {
            batch.set(self.keys.paused(), FLAG_SET);
        } else {
            batch.del(self.keys.paused());
        }
        self.store.exec(batch).await
    }

    pub async fn is_used(&self, phrase: &Phrase) -> StoreResult<bool> {
        let store = &self.store;
        let key = self.keys.used();
        let key = key.as_str();
        read_with_retry(self.retry, move || store.sismember(key, phrase.as_str()))
            .await
    }

    pub async fn used_count(&self) -> StoreResult<u64> {
        let store = &self.store;
        let key = self.keys.used();
        let key = key.as_str();
        read_with_retry(self.retry, move || store.scard(key)).await
    }

    /// Consecutive wrong replies recorded against `phrase`
    pub async fn fail_count(&self, phrase: &Phrase) -> StoreResult<u32> {
        let key = self.keys.fails(phrase.as_str());
        match self.read(key.clone()).await? {
            None => Ok(0),
            Some(raw) => raw
                .parse()
                .map_err(|_| StoreError::InvalidValue { key, value: raw }),
        }
    }

    /// Count one more wrong reply against `phrase`
    pub async fn record_fail(&self, phrase: &Phrase) -> StoreResult<u32> {
        let count = self.store.incr(&self.keys.fails(phrase.as_str())).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Wipe every per-round key. Pause flag and cooldowns survive.
    pub async fn reset(&self) -> StoreResult<()> {
        self.store.del(&self.keys.round_scalars()).await?;
        for pattern in self.keys.round_patterns() {
            store::delete_matching(self.store.as_ref(), &pattern, RESET_SCAN_PAGE).await?;
        }
        Ok(())
    }

    /// Queue the writes that accept `phrase` as the latest move
    fn stage_accept(&self, batch: &mut Batch, phrase: &Phrase, player: &Player) {
        batch
            .set(self.keys.last_word(), phrase.as_str())
            .set(self.keys.last_user(), player.as_stored())
            .sadd(self.keys.used(), phrase.as_str());
        if let Some(token) = phrase.first_token() {
            batch
                .sadd(self.keys.used_by_token(token), phrase.as_str())
                .srem(self.keys.remaining(token), phrase.as_str());
        }
    }

    /// Queue `remaining[token] = index[token] - used_by_token[token]`
    fn stage_materialize(&self, batch: &mut Batch, token: &str) {
        let remaining = self.keys.remaining(token);
        batch
            .sunionstore(remaining.clone(), vec![keys::token_index(token)])
            .sdiffstore(
                remaining.clone(),
                vec![remaining, self.keys.used_by_token(token)],
            );
    }

    /// Record the referee's opening and pre-warm the cache for the reply token
    pub async fn record_opening(&self, opening: &Phrase) -> StoreResult<()> {
        let mut batch = Batch::new();
        self.stage_accept(&mut batch, opening, &Player::Bot);
        batch.del(self.keys.winner()).del(self.keys.ended());
        if let Some(next) = opening.last_token() {
            self.stage_materialize(&mut batch, next);
        }
        self.store.exec(batch).await
    }

    /// Record an accepted move and clear the fail counter of the phrase it answered
    pub async fn record_move(
        &self,
        phrase: &Phrase,
        player: &Player,
        answered: Option<&Phrase>,
    ) -> StoreResult<()> {
        let mut batch = Batch::new();
        self.stage_accept(&mut batch, phrase, player);
        if let Some(previous) = answered {
            batch.del(self.keys.fails(previous.as_str()));
        }
        self.store.exec(batch).await
    }

    /// Queue the writes that end the round with `winner`
    pub fn stage_end(&self, batch: &mut Batch, winner: &UserId) {
        batch
            .set(self.keys.winner(), winner.as_str())
            .set(self.keys.ended(), FLAG_SET);
    }

    /// Size of the remaining-candidates bucket for `token`, materializing it if needed
    pub async fn ensure_remaining(&self, token: &str) -> StoreResult<u64> {
        let key = self.keys.remaining(token);
        let exists = {
            let store = &self.store;
            let key = key.as_str();
            read_with_retry(self.retry, move || store.exists(key))
                .await?
        };
        if !exists {
            let mut batch = Batch::new();
            self.stage_materialize(&mut batch, token);
            self.store.exec(batch).await?;
        }
        let store = &self.store;
        let key = key.as_str();
        read_with_retry(self.retry, move || store.scard(key)).await
    }

    /// A random unused phrase starting with `token`, from the cached bucket
    pub async fn random_remaining(&self, token: &str) -> StoreResult<Option<Phrase>> {
        let store = &self.store;
        let key = self.keys.remaining(token);
        let key = key.as_str();
        let picked = read_with_retry(self.retry, move || store.srandmember(key))
            .await?;
        Ok(picked.map(Phrase::from_normalized))
    }
}
