//! Round referee: openings, move validation, win detection and hints.

mod opening;

pub use opening::{select_opening, OpeningStrategy};

use crate::config::RefereeConfig;
use crate::dictionary::Dictionary;
use crate::state::{CooldownTable, RoundStore};
use crate::store::{Batch, KeyValueStore, StoreError};
use crate::text::Phrase;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

/// Result type for referee operations
pub type RefereeResult<T> = Result<T, RefereeError>;

/// Errors that can occur while refereeing
///
/// Rejected moves are not errors; they come back as [`SubmitOutcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum RefereeError {
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("User id {0:?} is reserved for the referee")]
    ReservedUserId(String),
}

impl RefereeError {
    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefereeError::Store(_))
    }
}

/// Referee for one game.
///
/// Cheap to clone. Every operation that touches the round holds the game's turn lock
/// for its whole duration, so two submissions for the same game never interleave.
#[derive(Clone)]
pub struct Referee {
    game_id: GameId,
    store: Arc<dyn KeyValueStore>,
    round: RoundStore,
    cooldowns: CooldownTable,
    dictionary: Dictionary,
    config: Arc<RefereeConfig>,
    turn_lock: Arc<Mutex<()>>,
    dictionary_gate: Arc<RwLock<()>>,
}

impl Referee {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        game_id: &str,
        config: Arc<RefereeConfig>,
        turn_lock: Arc<Mutex<()>>,
        dictionary_gate: Arc<RwLock<()>>,
    ) -> Self {
        let round = RoundStore::new(store.clone(), game_id, config.read_retry);
        let cooldowns =
            CooldownTable::new(store.clone(), round.keys().cooldown(), config.read_retry);
        let dictionary = Dictionary::new(store.clone(), config.read_retry);
        Self {
            game_id: game_id.to_string(),
            store,
            round,
            cooldowns,
            dictionary,
            config,
            turn_lock,
            dictionary_gate,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn round(&self) -> &RoundStore {
        &self.round
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    #[cfg(test)]
    pub(crate) fn shares_lock_with(&self, other: &Referee) -> bool {
        Arc::ptr_eq(&self.turn_lock, &other.turn_lock)
    }

    /// Dictionary gate (shared) first, then the turn lock
    async fn guard(&self) -> (RwLockReadGuard<'_, ()>, MutexGuard<'_, ()>) {
        let gate = self.dictionary_gate.read().await;
        let turn = self.turn_lock.lock().await;
        (gate, turn)
    }

    fn opening_strategies(&self) -> [OpeningStrategy; 2] {
        [
            OpeningStrategy::RandomDraws {
                attempts: self.config.opening_draws,
            },
            OpeningStrategy::FullScan {
                page_size: self.config.opening_scan_page,
            },
        ]
    }

    /// Wipe the round and open a new one with a phrase that can be answered.
    ///
    /// Returns `None` (with the round left empty) when no dictionary phrase qualifies.
    pub async fn start_round_random(&self) -> RefereeResult<Option<Phrase>> {
        let _guard = self.guard().await;
        self.start_round_locked().await
    }

    async fn start_round_locked(&self) -> RefereeResult<Option<Phrase>> {
        self.round.reset().await?;

        let opening = select_opening(&self.dictionary, &self.opening_strategies()).await?;
        match &opening {
            Some(phrase) => {
                self.round.record_opening(phrase).await?;
                tracing::info!(game_id = %self.game_id, opening = %phrase, "Round started");
            }
            None => {
                tracing::warn!(game_id = %self.game_id, "No answerable opening in dictionary");
            }
        }
        Ok(opening)
    }

    /// Judge one submission
    pub async fn submit(&self, user_id: &str, raw: &str) -> RefereeResult<SubmitOutcome> {
        if user_id == BOT_SENTINEL {
            return Err(RefereeError::ReservedUserId(user_id.to_string()));
        }

        let _guard = self.guard().await;
        let outcome = self.submit_locked(user_id, raw).await?;

        tracing::debug!(
            game_id = %self.game_id,
            user_id,
            reason = ?outcome.reason(),
            "Submission judged"
        );
        Ok(outcome)
    }

    async fn submit_locked(&self, user_id: &str, raw: &str) -> RefereeResult<SubmitOutcome> {
        if self.round.is_ended().await? {
            let winner = self.round.winner().await?;
            return Ok(SubmitOutcome::Ended { winner });
        }
        if self.round.is_paused().await? {
            return Ok(SubmitOutcome::Paused);
        }

        let last_player = self.round.last_player().await?;
        let own_phrase = matches!(&last_player, Some(Player::User(id)) if id == user_id);
        if self.config.block_repeat_turns && own_phrase {
            return Ok(SubmitOutcome::OutOfTurn);
        }

        let last_word = self.round.last_word().await?;
        let phrase = match Phrase::parse(raw) {
            Some(phrase) => phrase,
            None => return self.reject_unknown(last_word.as_ref(), last_player).await,
        };
        if !self.dictionary.contains(&phrase).await? {
            return self.reject_unknown(last_word.as_ref(), last_player).await;
        }

        if self.round.is_used(&phrase).await? {
            return Ok(SubmitOutcome::Used);
        }

        if let Some(remaining) = self.cooldowns.remaining(&phrase).await? {
            return Ok(SubmitOutcome::Cooldown { remaining });
        }

        if let Some(previous) = &last_word {
            if !previous.chains_to(&phrase) {
                self.round.record_fail(previous).await?;
                return Ok(SubmitOutcome::RuleMismatch);
            }
        }

        let player = Player::User(user_id.to_string());
        self.round
            .record_move(&phrase, &player, last_word.as_ref())
            .await?;

        let dead_end = match phrase.last_token() {
            None => true,
            Some(next) => self.round.ensure_remaining(next).await? == 0,
        };
        if dead_end {
            let winner = user_id.to_string();
            self.finish(&winner, &phrase, self.config.win_cooldown).await?;
            return Ok(SubmitOutcome::Won { winner });
        }

        Ok(SubmitOutcome::Accepted)
    }

    /// A phrase outside the dictionary counts against the current phrase and may end
    /// the round in favour of whoever played it
    async fn reject_unknown(
        &self,
        last_word: Option<&Phrase>,
        last_player: Option<Player>,
    ) -> RefereeResult<SubmitOutcome> {
        let Some(last_word) = last_word else {
            return Ok(SubmitOutcome::NotInDict);
        };

        let fails = self.round.record_fail(last_word).await?;
        if fails < self.config.fail_limit {
            return Ok(SubmitOutcome::NotInDict);
        }

        match last_player {
            Some(Player::User(winner)) => {
                self.finish(&winner, last_word, self.config.fail_limit_cooldown)
                    .await?;
                Ok(SubmitOutcome::FailLimitReached { winner })
            }
            _ => Ok(SubmitOutcome::NotInDict),
        }
    }

    /// End the round with `winner` and put `phrase` on cooldown, in one batch
    async fn finish(&self, winner: &UserId, phrase: &Phrase, cooldown: u32) -> RefereeResult<()> {
        let mut batch = Batch::new();
        self.round.stage_end(&mut batch, winner);
        self.cooldowns.stage_seed(&mut batch, phrase, cooldown).await?;
        self.store.exec(batch).await?;

        tracing::info!(
            game_id = %self.game_id,
            winner = %winner,
            phrase = %phrase,
            cooldown,
            "Round ended"
        );
        Ok(())
    }

    /// A playable reply to the current phrase, without changing the round
    pub async fn hint(&self) -> RefereeResult<Option<Phrase>> {
        let _guard = self.guard().await;
        self.hint_locked().await
    }

    async fn hint_locked(&self) -> RefereeResult<Option<Phrase>> {
        if self.round.is_ended().await? {
            return Ok(None);
        }
        let Some(last_word) = self.round.last_word().await? else {
            return Ok(self.dictionary.random_phrase().await?);
        };
        let Some(token) = last_word.last_token() else {
            return Ok(None);
        };
        self.round.ensure_remaining(token).await?;
        Ok(self.round.random_remaining(token).await?)
    }

    pub async fn pause(&self) -> RefereeResult<()> {
        let _guard = self.guard().await;
        self.round.set_paused(true).await?;
        tracing::info!(game_id = %self.game_id, "Round paused");
        Ok(())
    }

    pub async fn resume(&self) -> RefereeResult<()> {
        let _guard = self.guard().await;
        self.round.set_paused(false).await?;
        tracing::info!(game_id = %self.game_id, "Round resumed");
        Ok(())
    }

    pub async fn status(&self) -> RefereeResult<RoundStatus> {
        Ok(self.round.status().await?)
    }

    pub async fn snapshot(&self) -> RefereeResult<RoundSnapshot> {
        let _guard = self.guard().await;
        Ok(RoundSnapshot {
            game_id: self.game_id.clone(),
            status: self.round.status().await?,
            last_word: self.round.last_word().await?,
            last_player: self.round.last_player().await?,
            winner: self.round.winner().await?,
            used_count: self.round.used_count().await?,
        })
    }

    /// Give up on the current phrase: award the last player and open a new round.
    ///
    /// The hint is taken before the reset so it answers the abandoned phrase.
    pub async fn concede(&self) -> RefereeResult<ConcedeOutcome> {
        let _guard = self.guard().await;

        if self.round.is_paused().await? {
            return Ok(ConcedeOutcome::Paused);
        }
        let winner = match self.round.last_player().await? {
            None => return Ok(ConcedeOutcome::NoPlayer),
            Some(Player::Bot) => return Ok(ConcedeOutcome::BotTurn),
            Some(Player::User(winner)) => winner,
        };

        let hint = self.hint_locked().await?;
        tracing::info!(game_id = %self.game_id, winner = %winner, "Round conceded");
        let opening = self.start_round_locked().await?;

        Ok(ConcedeOutcome::Conceded {
            winner,
            hint,
            opening,
        })
    }
}
