//! Guild economy: records, catalog, inventory arithmetic, persistence and the engine
//! that ties them together.

pub mod catalog;
pub mod clock;
pub mod dice;
pub mod engine;
pub mod errors;
pub mod inventory;
pub mod listing;
pub mod storage;
pub mod types;

pub use catalog::{normalize_identifier, Catalog, CatalogItem};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dice::{EffectDice, FixedDice, SeededDice, ThreadDice};
pub use engine::{EconomyEngine, EconomyEngineBuilder, EconomyResult};
pub use errors::{EconomyError, MarriageParty, StoreError};
pub use listing::{paginate, Listing, ListingEntry};
pub use storage::{PlayerStore, SledPlayerStore, SledPlayerStoreBuilder, StoreHandle};
pub use types::*;
