use crate::text::Phrase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque ID types for type safety
pub type GameId = String;
pub type UserId = String;

/// Stored in place of a user id when the referee itself made the move
pub const BOT_SENTINEL: &str = "BOT";

/// Who made the last accepted move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Bot,
    User(UserId),
}

impl Player {
    pub fn from_stored(raw: String) -> Self {
        if raw == BOT_SENTINEL {
            Player::Bot
        } else {
            Player::User(raw)
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            Player::Bot => BOT_SENTINEL,
            Player::User(id) => id,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Player::Bot => None,
            Player::User(id) => Some(id),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored())
    }
}

/// Round status, derived from the `paused` and `ended` flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Active,
    Paused,
    Ended,
}

/// Closed set of reason codes reported to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Ok,
    Win,
    Used,
    NotInDict,
    RuleMismatch,
    Cooldown,
    FailLimitReached,
    Ended,
    Paused,
    OutOfTurn,
}

/// Result of validating one submission.
///
/// Every variant is an ordinary game event; store faults are reported separately as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitOutcome {
    /// Accepted; the round continues
    #[serde(rename = "OK")]
    Accepted,
    /// Accepted and the chain dead-ends: the submitter wins
    #[serde(rename = "WIN")]
    Won { winner: UserId },
    Used,
    NotInDict,
    RuleMismatch,
    /// The phrase ended a recent round and is resting
    Cooldown { remaining: u32 },
    /// Too many wrong replies: the last successful player wins
    FailLimitReached { winner: UserId },
    Ended { winner: Option<UserId> },
    Paused,
    /// The same user tried to answer their own phrase
    OutOfTurn,
}

impl SubmitOutcome {
    /// Whether the phrase was accepted into the chain
    pub fn ok(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted | SubmitOutcome::Won { .. })
    }

    /// Whether the round is over after this submission
    pub fn ended(&self) -> bool {
        matches!(
            self,
            SubmitOutcome::Won { .. }
                | SubmitOutcome::FailLimitReached { .. }
                | SubmitOutcome::Ended { .. }
        )
    }

    pub fn winner(&self) -> Option<&UserId> {
        match self {
            SubmitOutcome::Won { winner } | SubmitOutcome::FailLimitReached { winner } => {
                Some(winner)
            }
            SubmitOutcome::Ended { winner } => winner.as_ref(),
            _ => None,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            SubmitOutcome::Accepted => ReasonCode::Ok,
            SubmitOutcome::Won { .. } => ReasonCode::Win,
            SubmitOutcome::Used => ReasonCode::Used,
            SubmitOutcome::NotInDict => ReasonCode::NotInDict,
            SubmitOutcome::RuleMismatch => ReasonCode::RuleMismatch,
            SubmitOutcome::Cooldown { .. } => ReasonCode::Cooldown,
            SubmitOutcome::FailLimitReached { .. } => ReasonCode::FailLimitReached,
            SubmitOutcome::Ended { .. } => ReasonCode::Ended,
            SubmitOutcome::Paused => ReasonCode::Paused,
            SubmitOutcome::OutOfTurn => ReasonCode::OutOfTurn,
        }
    }
}

/// Read-only view of a round for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub game_id: GameId,
    pub status: RoundStatus,
    pub last_word: Option<Phrase>,
    pub last_player: Option<Player>,
    pub winner: Option<UserId>,
    pub used_count: u64,
}

/// Result of an admin concede ("give up, award the last player")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ConcedeOutcome {
    Paused,
    /// Nobody has played yet
    NoPlayer,
    /// The last move is the opening; there is nobody to award
    BotTurn,
    Conceded {
        winner: UserId,
        hint: Option<Phrase>,
        opening: Option<Phrase>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_round_trips_sentinel() {
        assert_eq!(Player::from_stored("BOT".to_string()), Player::Bot);
        assert_eq!(
            Player::from_stored("42".to_string()),
            Player::User("42".to_string())
        );
        assert_eq!(Player::Bot.as_stored(), BOT_SENTINEL);
        assert!(Player::Bot.user_id().is_none());
    }

    #[test]
    fn test_outcome_flags() {
        let win = SubmitOutcome::Won {
            winner: "a".to_string(),
        };
        assert!(win.ok());
        assert!(win.ended());
        assert_eq!(win.winner().map(String::as_str), Some("a"));

        let fail = SubmitOutcome::FailLimitReached {
            winner: "b".to_string(),
        };
        assert!(!fail.ok());
        assert!(fail.ended());

        assert!(SubmitOutcome::Accepted.ok());
        assert!(!SubmitOutcome::Accepted.ended());
        assert!(!SubmitOutcome::Used.ok());
        assert_eq!(SubmitOutcome::Ended { winner: None }.winner(), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SubmitOutcome::Cooldown { remaining: 2 }).unwrap();
        assert_eq!(json["reason"], "COOLDOWN");
        assert_eq!(json["remaining"], 2);

        let json = serde_json::to_value(SubmitOutcome::Accepted).unwrap();
        assert_eq!(json["reason"], "OK");

        let json = serde_json::to_value(SubmitOutcome::NotInDict).unwrap();
        assert_eq!(json["reason"], "NOT_IN_DICT");

        let json = serde_json::to_value(ReasonCode::FailLimitReached).unwrap();
        assert_eq!(json, "FAIL_LIMIT_REACHED");
    }

    #[test]
    fn test_reason_matches_variant() {
        assert_eq!(SubmitOutcome::Paused.reason(), ReasonCode::Paused);
        assert_eq!(
            SubmitOutcome::Won {
                winner: "x".to_string()
            }
            .reason(),
            ReasonCode::Win
        );
    }
}
