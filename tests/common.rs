//! Test utilities & fixtures.
//! Every fixture owns a sled database inside a temp dir that disappears with it.
#![allow(dead_code)] // Not every test binary uses every helper.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use guildmarket::commands::CommandDispatcher;
use guildmarket::config::EconomyConfig;
use guildmarket::economy::{
    EconomyEngine, EffectDice, ItemStack, ManualClock, MarriageState, PlayerKey, PlayerPatch,
    PlayerRecord, PlayerStore, SledPlayerStore, SledPlayerStoreBuilder, StoreError, StoreHandle,
};
use tempfile::TempDir;

pub const GUILD: u64 = 1001;

/// Sled store that answers conditional writes to one player with a version conflict, as
/// if another command kept landing on that record first.
pub struct ContestedStore {
    inner: SledPlayerStore,
    contested: u64,
    conflicts_left: AtomicUsize,
    conditional_writes: AtomicUsize,
}

impl ContestedStore {
    /// Conditional writes attempted against the contested player so far.
    pub fn conditional_writes(&self) -> usize {
        self.conditional_writes.load(Ordering::SeqCst)
    }
}

impl PlayerStore for ContestedStore {
    fn get_player(&self, key: PlayerKey) -> Result<Option<PlayerRecord>, StoreError> {
        self.inner.get_player(key)
    }

    fn upsert_player(
        &self,
        key: PlayerKey,
        patch: &PlayerPatch,
        expected_version: Option<u64>,
    ) -> Result<PlayerRecord, StoreError> {
        if let (Some(expected), true) = (expected_version, key.player_id == self.contested) {
            self.conditional_writes.fetch_add(1, Ordering::SeqCst);
            let injected = self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if injected {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual: expected + 1,
                });
            }
        }
        self.inner.upsert_player(key, patch, expected_version)
    }

    fn ensure_player_exists(
        &self,
        key: PlayerKey,
        guild_name: &str,
        display_name: &str,
    ) -> Result<PlayerRecord, StoreError> {
        self.inner.ensure_player_exists(key, guild_name, display_name)
    }

    fn list_guild_players(&self, guild_id: u64) -> Result<Vec<PlayerRecord>, StoreError> {
        self.inner.list_guild_players(guild_id)
    }

    fn guild_player_counts(&self) -> Result<BTreeMap<u64, usize>, StoreError> {
        self.inner.guild_player_counts()
    }
}

pub struct TestEconomy {
    // Held so the database directory outlives the store.
    _dir: TempDir,
    pub store: StoreHandle,
    pub engine: Arc<EconomyEngine>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: CommandDispatcher,
}

impl TestEconomy {
    pub fn new(dice: impl EffectDice + 'static) -> Self {
        Self::with_config(dice, EconomyConfig::default())
    }

    pub fn with_config(dice: impl EffectDice + 'static, config: EconomyConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SledPlayerStoreBuilder::new(dir.path().join("economy"))
            .open()
            .expect("open store");
        Self::assemble(dir, Arc::new(store), dice, config)
    }

    /// Fixture whose store fails the next `conflicts` conditional writes to `player`
    /// (`usize::MAX` for every one of them).
    pub fn contested(
        dice: impl EffectDice + 'static,
        player: u64,
        conflicts: usize,
    ) -> (Self, Arc<ContestedStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let inner = SledPlayerStoreBuilder::new(dir.path().join("economy"))
            .open()
            .expect("open store");
        let contested = Arc::new(ContestedStore {
            inner,
            contested: player,
            conflicts_left: AtomicUsize::new(conflicts),
            conditional_writes: AtomicUsize::new(0),
        });
        let eco = Self::assemble(dir, contested.clone(), dice, EconomyConfig::default());
        (eco, contested)
    }

    fn assemble(
        dir: TempDir,
        store: Arc<dyn PlayerStore>,
        dice: impl EffectDice + 'static,
        config: EconomyConfig,
    ) -> Self {
        let store = StoreHandle::new(store, Duration::from_secs(5));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = Arc::new(
            EconomyEngine::builder(store.clone())
                .dice(dice)
                .clock(clock.clone())
                .config(config)
                .build(),
        );
        let dispatcher = CommandDispatcher::new(engine.clone());
        Self {
            _dir: dir,
            store,
            engine,
            clock,
            dispatcher,
        }
    }

    pub fn key(&self, player: u64) -> PlayerKey {
        PlayerKey::new(GUILD, player)
    }

    /// Create `player` with an exact balance and inventory.
    pub async fn seed(&self, player: u64, balance: i64, items: &[(&str, u32)]) -> PlayerRecord {
        let key = self.key(player);
        self.store
            .ensure_player_exists(key, "Test Guild", &format!("player{}", player))
            .await
            .expect("ensure");
        let inventory = items
            .iter()
            .map(|(name, qty)| ItemStack::new(*name, *qty))
            .collect();
        self.store
            .upsert_player(
                key,
                PlayerPatch::new().set_balance(balance).inventory(inventory),
                None,
            )
            .await
            .expect("seed")
    }

    pub async fn set_marriage(&self, player: u64, state: MarriageState) {
        self.store
            .upsert_player(self.key(player), PlayerPatch::new().marriage(state), None)
            .await
            .expect("marriage");
    }

    pub async fn player(&self, player: u64) -> PlayerRecord {
        self.store
            .get_player(self.key(player))
            .await
            .expect("get")
            .expect("player exists")
    }

    /// Run a chat line as `player` and return the rendered reply.
    pub async fn say(&self, player: u64, line: &str) -> String {
        self.dispatcher
            .handle(GUILD, "Test Guild", player, &format!("player{}", player), line)
            .await
            .render_text()
    }
}
