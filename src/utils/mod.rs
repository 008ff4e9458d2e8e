use regex::Regex;
use std::sync::OnceLock;

/// Account names the game server accepts: 3-16 letters, digits or underscores.
pub fn is_valid_player_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{3,16}$").expect("player name pattern compiles"))
        .is_match(name)
}
