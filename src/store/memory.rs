use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PendingFilter, PlayerStore, StoreError};
use crate::models::whitelist::{insert_confirmed, normalize_confirmed, PlayerName, WhitelistRequest};

#[derive(Default)]
struct Lists {
    confirmed: Vec<PlayerName>,
    pending: Vec<WhitelistRequest>,
}

/// Volatile store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    lists: Mutex<Lists>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(confirmed: Vec<PlayerName>, pending: Vec<WhitelistRequest>) -> Self {
        Self {
            lists: Mutex::new(Lists {
                confirmed: normalize_confirmed(confirmed),
                pending,
            }),
        }
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn confirmed_players(&self) -> Result<Vec<PlayerName>, StoreError> {
        Ok(self.lists.lock().await.confirmed.clone())
    }

    async fn pending_requests(&self) -> Result<Vec<WhitelistRequest>, StoreError> {
        Ok(self.lists.lock().await.pending.clone())
    }

    async fn add_confirmed(&self, name: &str) -> Result<bool, StoreError> {
        Ok(insert_confirmed(&mut self.lists.lock().await.confirmed, name))
    }

    async fn replace_confirmed(&self, names: Vec<PlayerName>) -> Result<(), StoreError> {
        self.lists.lock().await.confirmed = normalize_confirmed(names);
        Ok(())
    }

    async fn enqueue_pending(&self, request: WhitelistRequest) -> Result<(), StoreError> {
        self.lists.lock().await.pending.push(request);
        Ok(())
    }

    async fn remove_pending(&self, filter: PendingFilter<'_>) -> Result<usize, StoreError> {
        let mut lists = self.lists.lock().await;
        let before = lists.pending.len();
        lists.pending.retain(|request| !filter(request));
        Ok(before - lists.pending.len())
    }
}
