use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::inventory;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;

/// Primary key of a player record: the player is only ever visible inside one guild.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerKey {
    pub guild_id: u64,
    pub player_id: u64,
}

impl PlayerKey {
    pub fn new(guild_id: u64, player_id: u64) -> Self {
        Self {
            guild_id,
            player_id,
        }
    }

    /// Key of another player in the same guild.
    pub fn sibling(&self, player_id: u64) -> Self {
        Self::new(self.guild_id, player_id)
    }
}

impl std::fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.guild_id, self.player_id)
    }
}

/// Relationship status as seen from one player's own record.
///
/// `ProposedTo` is one-sided. `MarriedTo` is only genuinely mutual when the partner's
/// record also says `MarriedTo` back; a one-sided `MarriedTo` is a divorce the partner
/// already filed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarriageState {
    #[default]
    Unmarried,
    ProposedTo(u64),
    MarriedTo(u64),
}

impl MarriageState {
    /// The other player this record points at, if any.
    pub fn partner(&self) -> Option<u64> {
        match self {
            MarriageState::Unmarried => None,
            MarriageState::ProposedTo(id) | MarriageState::MarriedTo(id) => Some(*id),
        }
    }

    pub fn references(&self, player_id: u64) -> bool {
        self.partner() == Some(player_id)
    }

    pub fn is_unmarried(&self) -> bool {
        matches!(self, MarriageState::Unmarried)
    }
}

/// A stack of one catalog item in a player's inventory. Quantity is always positive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemStack {
    /// Bare catalog identifier, e.g. `gun`
    pub name: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// One player's economy state inside one guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub guild_id: u64,
    pub player_id: u64,
    #[serde(default)]
    pub guild_name: String,
    #[serde(default)]
    pub display_name: String,
    pub balance: i64,
    #[serde(default)]
    pub last_use_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_daily_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub marriage: MarriageState,
    #[serde(default)]
    pub inventory: Vec<ItemStack>,
    /// Bumped by the store on every write; the token for conditional updates.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerRecord {
    /// Zero-balance, empty-inventory record for a player seen for the first time.
    pub fn new(key: PlayerKey, guild_name: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            guild_id: key.guild_id,
            player_id: key.player_id,
            guild_name: guild_name.to_string(),
            display_name: display_name.to_string(),
            balance: 0,
            last_use_at: None,
            last_daily_at: None,
            marriage: MarriageState::Unmarried,
            inventory: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn key(&self) -> PlayerKey {
        PlayerKey::new(self.guild_id, self.player_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Held quantity of `name`, `0` when absent.
    pub fn quantity_of(&self, name: &str) -> u32 {
        inventory::quantity_of(&self.inventory, name)
    }
}

/// How a patch changes a numeric field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BalanceChange {
    Set(i64),
    Increment(i64),
}

/// Field-level partial update applied by [`PlayerStore::upsert_player`].
///
/// [`PlayerStore::upsert_player`]: crate::economy::storage::PlayerStore::upsert_player
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub balance: Option<BalanceChange>,
    pub inventory: Option<Vec<ItemStack>>,
    /// Stack merged into whatever inventory the record holds when the patch lands.
    pub grant: Option<ItemStack>,
    pub marriage: Option<MarriageState>,
    pub last_use_at: Option<DateTime<Utc>>,
    pub last_daily_at: Option<DateTime<Utc>>,
}

impl PlayerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_balance(mut self, delta: i64) -> Self {
        self.balance = Some(BalanceChange::Increment(delta));
        self
    }

    pub fn set_balance(mut self, value: i64) -> Self {
        self.balance = Some(BalanceChange::Set(value));
        self
    }

    pub fn inventory(mut self, inventory: Vec<ItemStack>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Add `quantity` of `name` on top of the stored inventory. Unlike [`Self::inventory`]
    /// this does not depend on what the caller read, so it can be applied unconditionally.
    pub fn grant(mut self, name: &str, quantity: u32) -> Self {
        self.grant = Some(ItemStack::new(name, quantity));
        self
    }

    pub fn marriage(mut self, state: MarriageState) -> Self {
        self.marriage = Some(state);
        self
    }

    pub fn last_use_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_use_at = Some(at);
        self
    }

    pub fn last_daily_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_daily_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == PlayerPatch::default()
    }

    /// Apply every present field to `record`. Does not touch `version`.
    pub fn apply(&self, record: &mut PlayerRecord) {
        match self.balance {
            Some(BalanceChange::Set(value)) => record.balance = value,
            Some(BalanceChange::Increment(delta)) => {
                record.balance = record.balance.saturating_add(delta)
            }
            None => {}
        }
        if let Some(inventory) = &self.inventory {
            record.inventory = inventory.clone();
        }
        if let Some(stack) = &self.grant {
            // a zero-quantity grant is a no-op
            let merged = inventory::increment(&record.inventory, &stack.name, stack.quantity);
            if let Ok(merged) = merged {
                record.inventory = merged;
            }
        }
        if let Some(marriage) = self.marriage {
            record.marriage = marriage;
        }
        if let Some(at) = self.last_use_at {
            record.last_use_at = Some(at);
        }
        if let Some(at) = self.last_daily_at {
            record.last_daily_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_increments_and_sets() {
        let mut record = PlayerRecord::new(PlayerKey::new(1, 2), "Guild", "alice");
        record.balance = 100;

        PlayerPatch::new().add_balance(-40).apply(&mut record);
        assert_eq!(record.balance, 60);

        PlayerPatch::new()
            .set_balance(5)
            .inventory(vec![ItemStack::new("gun", 1)])
            .marriage(MarriageState::ProposedTo(9))
            .apply(&mut record);
        assert_eq!(record.balance, 5);
        assert_eq!(record.quantity_of("gun"), 1);
        assert_eq!(record.marriage, MarriageState::ProposedTo(9));
        assert_eq!(record.version, 0);
    }

    #[test]
    fn grant_merges_into_stored_inventory() {
        let mut record = PlayerRecord::new(PlayerKey::new(1, 2), "Guild", "alice");
        record.inventory = vec![ItemStack::new("ring", 1), ItemStack::new("bow", 2)];

        PlayerPatch::new().grant("ring", 3).apply(&mut record);
        assert_eq!(
            record.inventory,
            vec![ItemStack::new("ring", 4), ItemStack::new("bow", 2)]
        );

        PlayerPatch::new().grant("gun", 1).apply(&mut record);
        assert_eq!(record.quantity_of("gun"), 1);

        PlayerPatch::new().grant("gun", 0).apply(&mut record);
        assert_eq!(record.quantity_of("gun"), 1);
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut record = PlayerRecord::new(PlayerKey::new(1, 2), "Guild", "alice");
        let before = record.clone();
        let patch = PlayerPatch::new();
        assert!(patch.is_empty());
        patch.apply(&mut record);
        assert_eq!(record, before);
    }

    #[test]
    fn marriage_state_partner() {
        assert_eq!(MarriageState::Unmarried.partner(), None);
        assert!(MarriageState::ProposedTo(4).references(4));
        assert!(!MarriageState::MarriedTo(4).references(5));
    }
}
