use std::time::Duration;

use thiserror::Error;

/// Failures raised by a [`PlayerStore`](crate::economy::storage::PlayerStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// A conditional update saw a different record version than the caller read.
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// The call did not complete within the configured store timeout.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The blocking task running the store call panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(String),
}

/// Which side of a ring use is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarriageParty {
    You,
    Them,
}

/// Every way an economy operation can fail.
///
/// Each variant maps to exactly one user-facing message, see [`EconomyError::user_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EconomyError {
    #[error("player not found")]
    PlayerNotFound,

    #[error("recipient is not playing")]
    RecipientNotPlaying,

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient quantity")]
    InsufficientQuantity,

    #[error("inventory is empty")]
    EmptyInventory,

    #[error("item not in inventory: {0}")]
    ItemNotInInventory(String),

    #[error("already married ({0:?})")]
    AlreadyMarried(MarriageParty),

    #[error("not married")]
    NotMarried,

    #[error("not married to that user")]
    NotMarriedToThatUser,

    #[error("cooldown active for {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("cannot target yourself")]
    SelfTarget,

    #[error("no target given")]
    MissingTarget,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("concurrent modification")]
    ConcurrentModification,

    /// The acting player's write was saved but the other party's record could not be
    /// updated. Carries the message describing what did happen; never retried.
    #[error("partially applied: {0}")]
    PartiallyApplied(String),
}

impl EconomyError {
    /// Fixed message shown to the player for this failure.
    pub fn user_message(&self) -> String {
        match self {
            EconomyError::PlayerNotFound => "You are not playing the game yet!".to_string(),
            EconomyError::RecipientNotPlaying => {
                "That user is not currently playing the game!".to_string()
            }
            EconomyError::ItemNotFound(_) => "That item doesn't exist!".to_string(),
            EconomyError::InsufficientFunds => "You don't have enough money for that!".to_string(),
            EconomyError::InsufficientQuantity => {
                "You don't have enough of that item!".to_string()
            }
            EconomyError::EmptyInventory => {
                "You do not have any items in your inventory!".to_string()
            }
            EconomyError::ItemNotInInventory(_) => {
                "You do not have that item in your inventory!".to_string()
            }
            EconomyError::AlreadyMarried(MarriageParty::You) => {
                "You are already married!".to_string()
            }
            EconomyError::AlreadyMarried(MarriageParty::Them) => {
                "That user is already married!".to_string()
            }
            EconomyError::NotMarried => "You are not married!".to_string(),
            EconomyError::NotMarriedToThatUser => "You are not married to that user!".to_string(),
            EconomyError::CooldownActive { remaining_secs } => {
                format!(
                    "You must wait {}s before doing that again!",
                    (*remaining_secs).max(1)
                )
            }
            EconomyError::InvalidAmount => "Please specify a valid amount!".to_string(),
            EconomyError::SelfTarget => "You can't do that to yourself!".to_string(),
            EconomyError::MissingTarget => "You need to mention who to use that on!".to_string(),
            EconomyError::StoreUnavailable(detail) => {
                format!("Error occurred while talking to the database! {}", detail)
            }
            EconomyError::ConcurrentModification => {
                "Your records changed while this was in progress, please try again!".to_string()
            }
            EconomyError::PartiallyApplied(outcome) => outcome.clone(),
        }
    }

    /// Only store outages and version conflicts are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EconomyError::StoreUnavailable(_) | EconomyError::ConcurrentModification
        )
    }

    /// Stable short name used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            EconomyError::PlayerNotFound => "player_not_found",
            EconomyError::RecipientNotPlaying => "recipient_not_playing",
            EconomyError::ItemNotFound(_) => "item_not_found",
            EconomyError::InsufficientFunds => "insufficient_funds",
            EconomyError::InsufficientQuantity => "insufficient_quantity",
            EconomyError::EmptyInventory => "empty_inventory",
            EconomyError::ItemNotInInventory(_) => "item_not_in_inventory",
            EconomyError::AlreadyMarried(_) => "already_married",
            EconomyError::NotMarried => "not_married",
            EconomyError::NotMarriedToThatUser => "not_married_to_that_user",
            EconomyError::CooldownActive { .. } => "cooldown_active",
            EconomyError::InvalidAmount => "invalid_amount",
            EconomyError::SelfTarget => "self_target",
            EconomyError::MissingTarget => "missing_target",
            EconomyError::StoreUnavailable(_) => "store_unavailable",
            EconomyError::ConcurrentModification => "concurrent_modification",
            EconomyError::PartiallyApplied(_) => "partially_applied",
        }
    }
}

impl From<StoreError> for EconomyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => EconomyError::ConcurrentModification,
            other => EconomyError::StoreUnavailable(other.to_string()),
        }
    }
}
