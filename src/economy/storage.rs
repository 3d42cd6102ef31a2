use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use sled::IVec;

use crate::economy::errors::StoreError;
use crate::economy::types::{PlayerKey, PlayerPatch, PlayerRecord, PLAYER_SCHEMA_VERSION};
use crate::metrics;

const TREE_PLAYERS: &str = "economy_players";

/// Record store contract consumed by the engine.
///
/// Calls are blocking; [`StoreHandle`] moves them off the async runtime and bounds them
/// with a timeout.
pub trait PlayerStore: Send + Sync {
    /// Fetch one record, `None` when the player has never played in this guild.
    fn get_player(&self, key: PlayerKey) -> Result<Option<PlayerRecord>, StoreError>;

    /// Apply `patch` and bump the record version.
    ///
    /// With `expected_version = Some(v)` the write only happens when the stored version is
    /// still `v` (a missing record counts as version `0`), otherwise [`StoreError::Conflict`].
    /// With `None` the patch is applied to whatever is stored, creating the record if needed.
    fn upsert_player(
        &self,
        key: PlayerKey,
        patch: &PlayerPatch,
        expected_version: Option<u64>,
    ) -> Result<PlayerRecord, StoreError>;

    /// Return the existing record or create a zero-balance, empty-inventory one.
    fn ensure_player_exists(
        &self,
        key: PlayerKey,
        guild_name: &str,
        display_name: &str,
    ) -> Result<PlayerRecord, StoreError>;

    /// Every record in one guild, in key order.
    fn list_guild_players(&self, guild_id: u64) -> Result<Vec<PlayerRecord>, StoreError>;

    /// Number of records per guild.
    fn guild_player_counts(&self) -> Result<BTreeMap<u64, usize>, StoreError>;
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledPlayerStoreBuilder {
    path: PathBuf,
}

impl SledPlayerStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<SledPlayerStore, StoreError> {
        SledPlayerStore::open(self.path)
    }
}

/// Sled-backed player records, one bincode value per `(guild, player)`.
pub struct SledPlayerStore {
    _db: sled::Db,
    players: sled::Tree,
}

impl SledPlayerStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let players = db.open_tree(TREE_PLAYERS)?;
        Ok(Self { _db: db, players })
    }

    fn players_key(key: PlayerKey) -> Vec<u8> {
        format!("players:{}:{}", key.guild_id, key.player_id).into_bytes()
    }

    fn guild_prefix(guild_id: u64) -> Vec<u8> {
        format!("players:{}:", guild_id).into_bytes()
    }

    fn serialize(record: &PlayerRecord) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(record)?)
    }

    fn deserialize(bytes: &[u8]) -> Result<PlayerRecord, StoreError> {
        let record: PlayerRecord = bincode::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn version_of(bytes: Option<&IVec>) -> Result<u64, StoreError> {
        match bytes {
            Some(bytes) => Ok(Self::deserialize(bytes)?.version),
            None => Ok(0),
        }
    }
}

impl PlayerStore for SledPlayerStore {
    fn get_player(&self, key: PlayerKey) -> Result<Option<PlayerRecord>, StoreError> {
        let Some(bytes) = self.players.get(Self::players_key(key))? else {
            return Ok(None);
        };
        Ok(Some(Self::deserialize(&bytes)?))
    }

    fn upsert_player(
        &self,
        key: PlayerKey,
        patch: &PlayerPatch,
        expected_version: Option<u64>,
    ) -> Result<PlayerRecord, StoreError> {
        let db_key = Self::players_key(key);
        loop {
            let current = self.players.get(&db_key)?;
            let actual = Self::version_of(current.as_ref())?;
            if let Some(expected) = expected_version {
                if expected != actual {
                    return Err(StoreError::Conflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    });
                }
            }

            let mut record = match &current {
                Some(bytes) => Self::deserialize(bytes)?,
                None => PlayerRecord::new(key, "", ""),
            };
            patch.apply(&mut record);
            record.version = actual + 1;
            record.schema_version = PLAYER_SCHEMA_VERSION;
            record.touch();

            let bytes = Self::serialize(&record)?;
            match self.players.compare_and_swap(&db_key, current, Some(bytes))? {
                Ok(()) => {
                    self.players.flush()?;
                    return Ok(record);
                }
                Err(cas) => {
                    if let Some(expected) = expected_version {
                        return Err(StoreError::Conflict {
                            key: key.to_string(),
                            expected,
                            actual: Self::version_of(cas.current.as_ref())?,
                        });
                    }
                    debug!("upsert {} raced another writer, retrying", key);
                }
            }
        }
    }

    fn ensure_player_exists(
        &self,
        key: PlayerKey,
        guild_name: &str,
        display_name: &str,
    ) -> Result<PlayerRecord, StoreError> {
        let db_key = Self::players_key(key);
        if let Some(bytes) = self.players.get(&db_key)? {
            return Self::deserialize(&bytes);
        }

        let mut record = PlayerRecord::new(key, guild_name, display_name);
        record.version = 1;
        let bytes = Self::serialize(&record)?;
        match self
            .players
            .compare_and_swap(&db_key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.players.flush()?;
                Ok(record)
            }
            // Someone else created it between our read and write.
            Err(cas) => match cas.current {
                Some(bytes) => Self::deserialize(&bytes),
                None => Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: 0,
                    actual: 0,
                }),
            },
        }
    }

    fn list_guild_players(&self, guild_id: u64) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.players.scan_prefix(Self::guild_prefix(guild_id)) {
            let (_, value) = entry?;
            records.push(Self::deserialize(&value)?);
        }
        Ok(records)
    }

    fn guild_player_counts(&self) -> Result<BTreeMap<u64, usize>, StoreError> {
        let mut counts = BTreeMap::new();
        for entry in self.players.scan_prefix(b"players:") {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            let guild = text
                .strip_prefix("players:")
                .and_then(|rest| rest.split(':').next())
                .and_then(|id| id.parse::<u64>().ok());
            if let Some(guild_id) = guild {
                *counts.entry(guild_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

/// Async front for a [`PlayerStore`]: every call runs on the blocking pool and fails with
/// [`StoreError::Timeout`] once the configured timeout elapses. A timed-out write may still
/// land afterwards; callers only learn that the outcome is unknown.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn PlayerStore>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn PlayerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PlayerStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Join(join_err.to_string())),
            Err(_) => {
                warn!("store {} exceeded {:?}", op, self.timeout);
                metrics::inc_store_timeouts();
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }

    pub async fn get_player(&self, key: PlayerKey) -> Result<Option<PlayerRecord>, StoreError> {
        self.call("get_player", move |s| s.get_player(key)).await
    }

    pub async fn upsert_player(
        &self,
        key: PlayerKey,
        patch: PlayerPatch,
        expected_version: Option<u64>,
    ) -> Result<PlayerRecord, StoreError> {
        self.call("upsert_player", move |s| {
            s.upsert_player(key, &patch, expected_version)
        })
        .await
    }

    pub async fn ensure_player_exists(
        &self,
        key: PlayerKey,
        guild_name: &str,
        display_name: &str,
    ) -> Result<PlayerRecord, StoreError> {
        let guild_name = guild_name.to_string();
        let display_name = display_name.to_string();
        self.call("ensure_player_exists", move |s| {
            s.ensure_player_exists(key, &guild_name, &display_name)
        })
        .await
    }

    pub async fn list_guild_players(
        &self,
        guild_id: u64,
    ) -> Result<Vec<PlayerRecord>, StoreError> {
        self.call("list_guild_players", move |s| s.list_guild_players(guild_id))
            .await
    }

    pub async fn guild_player_counts(&self) -> Result<BTreeMap<u64, usize>, StoreError> {
        self.call("guild_player_counts", |s| s.guild_player_counts())
            .await
    }
}
