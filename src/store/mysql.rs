use async_trait::async_trait;
use sqlx::{MySqlPool, Row};
use tokio::sync::Mutex;

use super::{PendingFilter, PlayerStore, StoreError};
use crate::db;
use crate::models::whitelist::{contains_name, normalize_confirmed, PlayerName, WhitelistRequest};

/// MySQL-backed store. Each mutation runs in its own transaction; the
/// local mutex keeps this process to one writer at a time.
pub struct MySqlStore {
    pool: MySqlPool,
    write_lock: Mutex<()>,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = db::establish_connection(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("MySQL store ready");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl PlayerStore for MySqlStore {
    async fn confirmed_players(&self) -> Result<Vec<PlayerName>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM whitelisted_players")
            .fetch_all(&self.pool)
            .await?;
        Ok(normalize_confirmed(names))
    }

    async fn pending_requests(&self) -> Result<Vec<WhitelistRequest>, StoreError> {
        let rows = sqlx::query("SELECT requester_id, player_name FROM pending_requests ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| WhitelistRequest::new(row.get::<String, _>("requester_id"), row.get::<String, _>("player_name")))
            .collect())
    }

    async fn add_confirmed(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM whitelisted_players FOR UPDATE")
            .fetch_all(&mut *tx)
            .await?;
        if contains_name(&existing, name) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO whitelisted_players (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn replace_confirmed(&self, names: Vec<PlayerName>) -> Result<(), StoreError> {
        let names = normalize_confirmed(names);
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM whitelisted_players")
            .execute(&mut *tx)
            .await?;
        for name in &names {
            sqlx::query("INSERT INTO whitelisted_players (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn enqueue_pending(&self, request: WhitelistRequest) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO pending_requests (requester_id, player_name) VALUES (?, ?)")
            .bind(&request.requester_id)
            .bind(&request.player_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_pending(&self, filter: PendingFilter<'_>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT id, requester_id, player_name FROM pending_requests ORDER BY id ASC FOR UPDATE")
            .fetch_all(&mut *tx)
            .await?;

        let doomed: Vec<i64> = rows
            .iter()
            .filter(|row| {
                let request = WhitelistRequest::new(
                    row.get::<String, _>("requester_id"),
                    row.get::<String, _>("player_name"),
                );
                filter(&request)
            })
            .map(|row| row.get::<i64, _>("id"))
            .collect();

        for id in &doomed {
            sqlx::query("DELETE FROM pending_requests WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(doomed.len())
    }
}
