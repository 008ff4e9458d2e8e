use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A player identifier. Stored case is preserved, comparisons ignore case.
pub type PlayerName = String;

/// A request to add a player to the remote whitelist.
///
/// Identity is the pair (requester, player name); two requesters asking for
/// the same player are distinct queue entries until one of them succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistRequest {
    pub requester_id: String,
    pub player_name: PlayerName,
}

impl WhitelistRequest {
    pub fn new(requester_id: impl Into<String>, player_name: impl Into<PlayerName>) -> Self {
        Self {
            requester_id: requester_id.into(),
            player_name: player_name.into(),
        }
    }

    pub fn same_identity(&self, other: &WhitelistRequest) -> bool {
        self.requester_id == other.requester_id && names_match(&self.player_name, &other.player_name)
    }
}

/// Result of an interactive submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    AlreadyConfirmed,
    /// `now_confirmed` is false when the request was queued for retry.
    Accepted { now_confirmed: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetrySummary {
    /// Distinct identities submitted to the registry.
    pub attempted: usize,
    /// Queue entries from the pass's snapshot settled by a delivery,
    /// same-identity duplicates included.
    pub confirmed: usize,
    pub failed: usize,
}

/// Summary of one retry + resync cycle, kept for the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub retry: RetrySummary,
    pub resynced: bool,
    pub confirmed_total: Option<usize>,
    pub pending_total: Option<usize>,
}

pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

pub fn contains_name(names: &[PlayerName], name: &str) -> bool {
    names.iter().any(|existing| names_match(existing, name))
}

/// Sorts case-insensitively and drops case-insensitive duplicates.
/// The first occurrence of a name decides its stored casing.
pub fn normalize_confirmed<I>(names: I) -> Vec<PlayerName>
where
    I: IntoIterator<Item = PlayerName>,
{
    let mut unique: Vec<PlayerName> = Vec::new();
    for name in names {
        if !contains_name(&unique, &name) {
            unique.push(name);
        }
    }
    unique.sort_by_cached_key(|name| name.to_lowercase());
    unique
}

/// Inserts `name` keeping `names` sorted. Returns false if it was already there.
pub fn insert_confirmed(names: &mut Vec<PlayerName>, name: &str) -> bool {
    if contains_name(names, name) {
        return false;
    }
    let key = name.to_lowercase();
    let idx = names.partition_point(|existing| existing.to_lowercase() < key);
    names.insert(idx, name.to_string());
    true
}
