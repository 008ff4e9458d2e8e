//! Persistence for the confirmed set and the pending queue.
//!
//! Every backend serializes its mutating calls behind one lock and leaves
//! its visible state consistent after each call returns. Dropping a mutation
//! future part way (a timed-out cycle, a disconnected client) must not leave
//! the visible state out of step with what is persisted.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreBackend;
use crate::models::whitelist::{PlayerName, WhitelistRequest};

pub mod file;
pub mod memory;
pub mod mysql;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("store write task failed: {0}")]
    WriteTask(#[from] tokio::task::JoinError),
}

pub type PendingFilter<'a> = &'a (dyn Fn(&WhitelistRequest) -> bool + Send + Sync);

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Snapshot of the confirmed set in sort order.
    async fn confirmed_players(&self) -> Result<Vec<PlayerName>, StoreError>;

    /// Snapshot of the pending queue, oldest first.
    async fn pending_requests(&self) -> Result<Vec<WhitelistRequest>, StoreError>;

    /// Returns false (and changes nothing) if the name is already confirmed.
    async fn add_confirmed(&self, name: &str) -> Result<bool, StoreError>;

    async fn replace_confirmed(&self, names: Vec<PlayerName>) -> Result<(), StoreError>;

    async fn enqueue_pending(&self, request: WhitelistRequest) -> Result<(), StoreError>;

    /// Removes every pending entry matching `filter`, returns how many went.
    async fn remove_pending(&self, filter: PendingFilter<'_>) -> Result<usize, StoreError>;
}

pub async fn open(backend: &StoreBackend) -> Result<Arc<dyn PlayerStore>, StoreError> {
    let store: Arc<dyn PlayerStore> = match backend {
        StoreBackend::File {
            confirmed_path,
            pending_path,
        } => Arc::new(JsonFileStore::open(confirmed_path, pending_path).await?),
        StoreBackend::MySql { database_url } => Arc::new(MySqlStore::connect(database_url).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
