use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{PendingFilter, PlayerStore, StoreError};
use crate::models::whitelist::{insert_confirmed, normalize_confirmed, PlayerName, WhitelistRequest};

struct Lists {
    confirmed: Vec<PlayerName>,
    pending: Vec<WhitelistRequest>,
}

/// A computed replacement for one of the two lists.
enum Change {
    Confirmed(Vec<PlayerName>),
    Pending(Vec<WhitelistRequest>),
}

/// Two JSON files: an array of names and an array of
/// `{"requesterId", "playerName"}` objects.
///
/// Both lists are cached in memory. A mutation is written to disk first and
/// only then applied to the cache, so a failed write changes nothing. The
/// write and the cache update run on a spawned task that owns the lock, so
/// the pair completes even if the caller stops polling half way.
pub struct JsonFileStore {
    confirmed_path: Arc<PathBuf>,
    pending_path: Arc<PathBuf>,
    lists: Arc<Mutex<Lists>>,
}

impl JsonFileStore {
    pub async fn open(
        confirmed_path: impl Into<PathBuf>,
        pending_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let confirmed_path = confirmed_path.into();
        let pending_path = pending_path.into();

        let confirmed: Vec<PlayerName> = read_json(&confirmed_path).await?;
        let pending: Vec<WhitelistRequest> = read_json(&pending_path).await?;
        tracing::info!(
            "Loaded {} whitelisted and {} pending players from disk",
            confirmed.len(),
            pending.len()
        );

        Ok(Self {
            confirmed_path: Arc::new(confirmed_path),
            pending_path: Arc::new(pending_path),
            lists: Arc::new(Mutex::new(Lists {
                confirmed: normalize_confirmed(confirmed),
                pending,
            })),
        })
    }

    /// Persists `change` and then swaps it into the cache, on a detached task
    /// holding `lists` until both steps are done.
    async fn commit(&self, mut lists: OwnedMutexGuard<Lists>, change: Change) -> Result<(), StoreError> {
        let confirmed_path = Arc::clone(&self.confirmed_path);
        let pending_path = Arc::clone(&self.pending_path);
        let task = tokio::spawn(async move {
            match change {
                Change::Confirmed(next) => {
                    write_json(&confirmed_path, &next).await?;
                    lists.confirmed = next;
                }
                Change::Pending(next) => {
                    write_json(&pending_path, &next).await?;
                    lists.pending = next;
                }
            }
            Ok::<(), StoreError>(())
        });
        task.await?
    }
}

#[async_trait]
impl PlayerStore for JsonFileStore {
    async fn confirmed_players(&self) -> Result<Vec<PlayerName>, StoreError> {
        Ok(self.lists.lock().await.confirmed.clone())
    }

    async fn pending_requests(&self) -> Result<Vec<WhitelistRequest>, StoreError> {
        Ok(self.lists.lock().await.pending.clone())
    }

    async fn add_confirmed(&self, name: &str) -> Result<bool, StoreError> {
        let lists = Arc::clone(&self.lists).lock_owned().await;
        let mut next = lists.confirmed.clone();
        if !insert_confirmed(&mut next, name) {
            return Ok(false);
        }
        self.commit(lists, Change::Confirmed(next)).await?;
        Ok(true)
    }

    async fn replace_confirmed(&self, names: Vec<PlayerName>) -> Result<(), StoreError> {
        let lists = Arc::clone(&self.lists).lock_owned().await;
        self.commit(lists, Change::Confirmed(normalize_confirmed(names))).await
    }

    async fn enqueue_pending(&self, request: WhitelistRequest) -> Result<(), StoreError> {
        let lists = Arc::clone(&self.lists).lock_owned().await;
        let mut next = lists.pending.clone();
        next.push(request);
        self.commit(lists, Change::Pending(next)).await
    }

    async fn remove_pending(&self, filter: PendingFilter<'_>) -> Result<usize, StoreError> {
        let lists = Arc::clone(&self.lists).lock_owned().await;
        let next: Vec<WhitelistRequest> = lists
            .pending
            .iter()
            .filter(|request| !filter(request))
            .cloned()
            .collect();
        let removed = lists.pending.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.commit(lists, Change::Pending(next)).await?;
        Ok(removed)
    }
}

async fn read_json<T>(path: &Path) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        // First start: nothing written yet.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes to a sibling temp file, syncs it, then renames it over `path`.
async fn write_json<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
    file.write_all(&bytes).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        (
            dir.path().join("data/whitelisted.json"),
            dir.path().join("data/pending.json"),
        )
    }

    #[tokio::test]
    async fn missing_files_open_empty() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();

        assert!(store.confirmed_players().await.unwrap().is_empty());
        assert!(store.pending_requests().await.unwrap().is_empty());
        assert!(!confirmed.exists());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);

        {
            let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
            assert!(store.add_confirmed("bob").await.unwrap());
            assert!(store.add_confirmed("Alice").await.unwrap());
            assert!(!store.add_confirmed("BOB").await.unwrap());
            store.enqueue_pending(WhitelistRequest::new("7", "carol")).await.unwrap();
            store.enqueue_pending(WhitelistRequest::new("8", "dave")).await.unwrap();
        }

        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        assert_eq!(store.confirmed_players().await.unwrap(), vec!["Alice", "bob"]);
        assert_eq!(
            store.pending_requests().await.unwrap(),
            vec![WhitelistRequest::new("7", "carol"), WhitelistRequest::new("8", "dave")]
        );
    }

    #[tokio::test]
    async fn writes_the_documented_layout() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        store.add_confirmed("Notch").await.unwrap();
        store.enqueue_pending(WhitelistRequest::new("42", "jeb_")).await.unwrap();

        let names: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&confirmed).unwrap()).unwrap();
        let queue: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&pending).unwrap()).unwrap();
        assert_eq!(names, serde_json::json!(["Notch"]));
        assert_eq!(
            queue,
            serde_json::json!([{ "requesterId": "42", "playerName": "jeb_" }])
        );
        assert!(!dir.path().join("data/pending.json.tmp").exists());
    }

    #[tokio::test]
    async fn unsorted_file_is_normalized_on_open() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        std::fs::create_dir_all(confirmed.parent().unwrap()).unwrap();
        std::fs::write(&confirmed, r#"["zoe", "Adam", "ZOE"]"#).unwrap();

        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        assert_eq!(store.confirmed_players().await.unwrap(), vec!["Adam", "zoe"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        std::fs::create_dir_all(pending.parent().unwrap()).unwrap();
        std::fs::write(&pending, "{ not json").unwrap();

        let err = JsonFileStore::open(&confirmed, &pending).await.err().unwrap();
        assert!(matches!(err, StoreError::Json { .. }));
    }

    #[tokio::test]
    async fn remove_pending_persists() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        store.enqueue_pending(WhitelistRequest::new("1", "a_1")).await.unwrap();
        store.enqueue_pending(WhitelistRequest::new("2", "b_2")).await.unwrap();

        let removed = store
            .remove_pending(&|r: &WhitelistRequest| r.requester_id == "1")
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let reopened = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        assert_eq!(
            reopened.pending_requests().await.unwrap(),
            vec![WhitelistRequest::new("2", "b_2")]
        );
    }

    /// Polls `fut` once and then drops it, the way a timeout or a closed
    /// connection abandons a handler mid-write.
    async fn abandon_after_first_poll<F: std::future::Future>(fut: F) {
        tokio::select! {
            biased;
            _ = fut => {}
            _ = std::future::ready(()) => {}
        }
    }

    #[tokio::test]
    async fn dropped_enqueue_still_lands_in_cache_and_on_disk() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();

        abandon_after_first_poll(store.enqueue_pending(WhitelistRequest::new("1", "first"))).await;
        store.enqueue_pending(WhitelistRequest::new("2", "second")).await.unwrap();

        let expected = vec![WhitelistRequest::new("1", "first"), WhitelistRequest::new("2", "second")];
        assert_eq!(store.pending_requests().await.unwrap(), expected);
        let reopened = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        assert_eq!(reopened.pending_requests().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn dropped_replace_does_not_split_cache_from_disk() {
        let dir = TempDir::new().unwrap();
        let (confirmed, pending) = paths(&dir);
        let store = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        store.add_confirmed("alice").await.unwrap();

        abandon_after_first_poll(store.replace_confirmed(vec!["carol".into()])).await;
        store.add_confirmed("bob").await.unwrap();

        assert_eq!(store.confirmed_players().await.unwrap(), vec!["bob", "carol"]);
        let reopened = JsonFileStore::open(&confirmed, &pending).await.unwrap();
        assert_eq!(reopened.confirmed_players().await.unwrap(), vec!["bob", "carol"]);
    }
}
