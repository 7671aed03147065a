//! Key layout. Dictionary keys are global; round keys are namespaced by game id.

/// All dictionary phrases
pub const DICT: &str = "dict:phrases";

/// Pattern matching every token index bucket
pub const TOKEN_INDEX_PATTERN: &str = "dict:tokenx:*";

/// Pattern matching every game's remaining-candidates buckets
pub const ALL_REMAINING_PATTERN: &str = "wc:*:remainx:*";

/// Phrases whose first token is `token`
pub fn token_index(token: &str) -> String {
    format!("dict:tokenx:{token}")
}

/// Remaining-candidates buckets for `token` across every game
pub fn remaining_in_all_games(token: &str) -> String {
    format!("wc:*:remainx:{token}")
}

/// Keys belonging to one game
#[derive(Debug, Clone)]
pub struct GameKeys {
    prefix: String,
}

impl GameKeys {
    pub fn new(game_id: &str) -> Self {
        Self {
            prefix: format!("wc:{game_id}"),
        }
    }

    pub fn last_word(&self) -> String {
        format!("{}:last_word", self.prefix)
    }

    pub fn last_user(&self) -> String {
        format!("{}:last_user", self.prefix)
    }

    pub fn used(&self) -> String {
        format!("{}:used", self.prefix)
    }

    pub fn used_by_token(&self, token: &str) -> String {
        format!("{}:used_tokenx:{token}", self.prefix)
    }

    pub fn remaining(&self, token: &str) -> String {
        format!("{}:remainx:{token}", self.prefix)
    }

    pub fn fails(&self, phrase: &str) -> String {
        format!("{}:fails:{phrase}", self.prefix)
    }

    pub fn winner(&self) -> String {
        format!("{}:winner", self.prefix)
    }

    pub fn ended(&self) -> String {
        format!("{}:ended", self.prefix)
    }

    pub fn paused(&self) -> String {
        format!("{}:paused", self.prefix)
    }

    /// Cooldown table; outlives individual rounds
    pub fn cooldown(&self) -> String {
        format!("{}:cooldown", self.prefix)
    }

    /// Scalar keys wiped on round reset
    pub fn round_scalars(&self) -> Vec<String> {
        vec![
            self.last_word(),
            self.last_user(),
            self.used(),
            self.winner(),
            self.ended(),
        ]
    }

    /// Patterns for per-token and per-phrase keys wiped on round reset
    pub fn round_patterns(&self) -> [String; 3] {
        [
            format!("{}:remainx:*", self.prefix),
            format!("{}:used_tokenx:*", self.prefix),
            format!("{}:fails:*", self.prefix),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_keys_are_namespaced() {
        let keys = GameKeys::new("channel:42");
        assert_eq!(keys.last_word(), "wc:channel:42:last_word");
        assert_eq!(keys.remaining("mèo"), "wc:channel:42:remainx:mèo");
        assert_eq!(keys.cooldown(), "wc:channel:42:cooldown");
    }

    #[test]
    fn test_reset_does_not_cover_cooldown_or_pause() {
        let keys = GameKeys::new("g");
        let scalars = keys.round_scalars();
        assert!(!scalars.contains(&keys.cooldown()));
        assert!(!scalars.contains(&keys.paused()));
    }
}
