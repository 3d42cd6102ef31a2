//! # Economy Engine
//!
//! Every player-facing operation: shop transactions (buy, sell, give), item effects
//! (use), marriage (ring use, divorce) and the wallet commands (balance, daily, beg, pay,
//! rob, leaderboard).
//!
//! ## Write discipline
//!
//! Each operation reads the records it needs, validates everything, then writes. A write
//! that changes what the acting player owns or spends is conditional on the version that
//! was read, so two racing operations cannot both spend the same balance; the loser fails
//! with [`EconomyError::ConcurrentModification`] and nothing of it is written. Credits
//! to the acting player after a successful debit elsewhere are plain increments.
//!
//! Writes to a second player that depend on what it holds (the target of an item, the
//! victim of `rob`) are re-resolved against a fresh read when that record moved underneath
//! us, a bounded number of times. Gifts and payments land on the recipient as grants and
//! increments, which never conflict.
//!
//! [`EconomyError::ConcurrentModification`] always means nothing was written. When the
//! second player's record still cannot be updated after the acting player's write was
//! saved, the operation fails with [`EconomyError::PartiallyApplied`] instead, which
//! describes what did happen and is never retried. The two records are never written
//! atomically together: if the process dies between the debit and the credit, the debited
//! side stays short.
//!
//! ## Use ordering
//!
//! Cooldown, catalog lookup, ownership and target checks all happen before the first
//! write. The first write stamps `last_use_at` and consumes the item (cars are never
//! consumed); the effect is resolved after that, so a narrative miss still costs the item
//! and the cooldown.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::config::EconomyConfig;
use crate::metrics;

use super::catalog::{Catalog, CatalogItem};
use super::clock::{Clock, SystemClock};
use super::dice::{EffectDice, ThreadDice};
use super::errors::{EconomyError, MarriageParty, StoreError};
use super::inventory;
use super::listing::{self, Listing};
use super::storage::StoreHandle;
use super::types::{MarriageState, PlayerKey, PlayerPatch, PlayerRecord};

pub type EconomyResult<T> = Result<T, EconomyError>;

/// Chocolate jackpot.
pub const GOLDEN_TICKET: i64 = 1_000_000;
pub const GOLDEN_TICKET_PERCENT: u32 = 1;
/// Flat amount a car takes from its target.
pub const CAR_TOLL: i64 = 1000;
/// Share of the target's balance a gun takes.
pub const GUN_ROBBERY: (f64, f64) = (0.10, 0.60);
/// Share of the target's balance a bow takes.
pub const BOW_ROBBERY: (f64, f64) = (0.20, 0.30);
/// Share of the archer's own balance lost when the target shoots back.
pub const BOW_BACKFIRE: (f64, f64) = (0.10, 0.20);
/// Coins taken by a plain `rob`, before capping at the target's balance.
pub const ROB_RANGE: (i64, i64) = (1, 50);

const RING: &str = "ring";
const GUN: &str = "gun";
const SHIELD: &str = "shield";

/// How many times a write to another player's record is re-resolved after a version
/// conflict before giving up.
const OTHER_RECORD_ATTEMPTS: usize = 3;

fn mention(player_id: u64) -> String {
    format!("<@{}>", player_id)
}

/// What using an item does, keyed by catalog identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Chocolate,
    Car,
    Gun,
    Bow,
    Ring,
    /// Catalog items without an effect are consumed and nothing else happens.
    Inert,
}

impl Effect {
    fn for_identifier(identifier: &str) -> Self {
        match identifier {
            "chocolate" => Effect::Chocolate,
            "car" => Effect::Car,
            "gun" => Effect::Gun,
            "bow" => Effect::Bow,
            "ring" => Effect::Ring,
            _ => Effect::Inert,
        }
    }

    fn needs_target(self) -> bool {
        matches!(self, Effect::Car | Effect::Gun | Effect::Bow | Effect::Ring)
    }

    fn consumes_item(self) -> bool {
        self != Effect::Car
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingPlan {
    Propose,
    Accept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shot {
    Blocked,
    ShotBack,
    Took(i64),
}

/// The transaction engine. Cheap to share behind an `Arc`; holds no per-player state.
pub struct EconomyEngine {
    store: StoreHandle,
    catalog: Arc<Catalog>,
    dice: Mutex<Box<dyn EffectDice>>,
    clock: Arc<dyn Clock>,
    config: EconomyConfig,
}

pub struct EconomyEngineBuilder {
    store: StoreHandle,
    catalog: Option<Arc<Catalog>>,
    dice: Option<Box<dyn EffectDice>>,
    clock: Option<Arc<dyn Clock>>,
    config: EconomyConfig,
}

impl EconomyEngineBuilder {
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn dice(mut self, dice: impl EffectDice + 'static) -> Self {
        self.dice = Some(Box::new(dice));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: EconomyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EconomyEngine {
        EconomyEngine {
            store: self.store,
            catalog: self.catalog.unwrap_or_else(Catalog::shared),
            dice: Mutex::new(self.dice.unwrap_or_else(|| Box::new(ThreadDice))),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        }
    }
}

impl EconomyEngine {
    /// Standard catalog, thread RNG, wall clock and default rules unless overridden.
    pub fn builder(store: StoreHandle) -> EconomyEngineBuilder {
        EconomyEngineBuilder {
            store,
            catalog: None,
            dice: None,
            clock: None,
            config: EconomyConfig::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    fn currency(&self) -> &str {
        &self.config.currency_name
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn run<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = EconomyResult<T>>,
    ) -> EconomyResult<T> {
        let started = Instant::now();
        let result = work.await;
        match &result {
            Ok(_) => metrics::record_success(operation, started),
            Err(err) => {
                if err.is_transient() || matches!(err, EconomyError::PartiallyApplied(_)) {
                    warn!("{} failed: {}", operation, err);
                } else {
                    debug!("{} rejected: {}", operation, err);
                }
                metrics::record_failure(operation, err.kind(), started);
            }
        }
        result
    }

    fn roll<T>(&self, f: impl FnOnce(&mut dyn EffectDice) -> T) -> T {
        let mut dice = self.dice.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut **dice)
    }

    /// Whole units of `share` of a balance; negative balances yield nothing.
    fn share_of(&self, balance: i64, share: (f64, f64)) -> i64 {
        let fraction = self.roll(|dice| dice.fraction(share.0, share.1));
        let taken = (balance.max(0) as f64 * fraction) as i64;
        taken.clamp(0, balance.max(0))
    }

    fn find_item(&self, item_id: &str) -> EconomyResult<&CatalogItem> {
        self.catalog
            .find_by_identifier(item_id)
            .ok_or_else(|| EconomyError::ItemNotFound(item_id.to_string()))
    }

    async fn load_player(&self, key: PlayerKey) -> EconomyResult<PlayerRecord> {
        self.store
            .get_player(key)
            .await?
            .ok_or(EconomyError::PlayerNotFound)
    }

    async fn load_other(&self, key: PlayerKey) -> EconomyResult<PlayerRecord> {
        self.store
            .get_player(key)
            .await?
            .ok_or(EconomyError::RecipientNotPlaying)
    }

    /// Resolve the other party of a two-player operation.
    async fn load_target(&self, key: PlayerKey, target: Option<u64>) -> EconomyResult<PlayerRecord> {
        let target = target.ok_or(EconomyError::MissingTarget)?;
        if target == key.player_id {
            return Err(EconomyError::SelfTarget);
        }
        self.load_other(key.sibling(target)).await
    }

    async fn write(
        &self,
        key: PlayerKey,
        patch: PlayerPatch,
        expected_version: Option<u64>,
    ) -> EconomyResult<PlayerRecord> {
        match self.store.upsert_player(key, patch, expected_version).await {
            Ok(record) => Ok(record),
            Err(err @ StoreError::Conflict { .. }) => {
                metrics::inc_conflicts();
                warn!("{}", err);
                Err(err.into())
            }
            Err(err) => {
                error!("write to {} failed: {}", key, err);
                Err(err.into())
            }
        }
    }

    async fn credit(&self, key: PlayerKey, amount: i64) -> EconomyResult<PlayerRecord> {
        self.write(key, PlayerPatch::new().add_balance(amount), None)
            .await
    }

    /// Conditionally update a record we do not own the operation for.
    ///
    /// `plan` sees the current record and returns the patch to write (or `None` for no
    /// write) plus the outcome to report. On a version conflict the record is re-read and
    /// `plan` runs again.
    async fn update_other<T, F>(&self, mut record: PlayerRecord, mut plan: F) -> EconomyResult<T>
    where
        F: FnMut(&PlayerRecord) -> EconomyResult<(Option<PlayerPatch>, T)>,
    {
        let key = record.key();
        for attempt in 1..=OTHER_RECORD_ATTEMPTS {
            let (patch, outcome) = plan(&record)?;
            let Some(patch) = patch else {
                return Ok(outcome);
            };
            match self.store.upsert_player(key, patch, Some(record.version)).await {
                Ok(_) => return Ok(outcome),
                Err(StoreError::Conflict {
                    expected, actual, ..
                }) => {
                    metrics::inc_conflicts();
                    warn!(
                        "{} moved from v{} to v{} (attempt {}), re-reading",
                        key, expected, actual, attempt
                    );
                    record = self.load_other(key).await?;
                }
                Err(err) => {
                    error!("write to {} failed: {}", key, err);
                    return Err(err.into());
                }
            }
        }
        Err(EconomyError::ConcurrentModification)
    }

    fn check_use_cooldown(&self, actor: &PlayerRecord, now: DateTime<Utc>) -> EconomyResult<()> {
        if self.config.bypasses_cooldown(actor.player_id) {
            return Ok(());
        }
        let Some(last_use) = actor.last_use_at else {
            return Ok(());
        };
        let cooldown = self.config.use_cooldown();
        let elapsed = now - last_use;
        if elapsed >= cooldown {
            return Ok(());
        }
        let remaining = (cooldown - elapsed).min(cooldown);
        Err(EconomyError::CooldownActive {
            remaining_secs: (remaining.num_milliseconds() + 999) / 1000,
        })
    }

    /// Create the record on first contact; every command path calls this first.
    pub async fn ensure_player(
        &self,
        key: PlayerKey,
        guild_name: &str,
        display_name: &str,
    ) -> EconomyResult<PlayerRecord> {
        Ok(self
            .store
            .ensure_player_exists(key, guild_name, display_name)
            .await?)
    }

    // ------------------------------------------------------------------
    // Shop transactions
    // ------------------------------------------------------------------

    pub async fn buy(&self, key: PlayerKey, item_id: &str, amount: u32) -> EconomyResult<String> {
        self.run("buy", async {
            if amount == 0 {
                return Err(EconomyError::InvalidAmount);
            }
            let player = self.load_player(key).await?;
            let item = self.find_item(item_id)?;
            let cost = item
                .price
                .checked_mul(i64::from(amount))
                .ok_or(EconomyError::InsufficientFunds)?;
            if player.balance < cost {
                return Err(EconomyError::InsufficientFunds);
            }

            let inventory = inventory::increment(&player.inventory, &item.identifier, amount)?;
            let patch = PlayerPatch::new().add_balance(-cost).inventory(inventory);
            self.write(key, patch, Some(player.version)).await?;

            info!("{} bought {}x {} for {}", key, amount, item.identifier, cost);
            Ok(format!(
                "You have successfully bought {}X {} for {} {}!",
                amount,
                item.identifier,
                cost,
                self.currency()
            ))
        })
        .await
    }

    pub async fn sell(&self, key: PlayerKey, item_id: &str, amount: u32) -> EconomyResult<String> {
        self.run("sell", async {
            if amount == 0 {
                return Err(EconomyError::InvalidAmount);
            }
            let player = self.load_player(key).await?;
            if player.inventory.is_empty() {
                return Err(EconomyError::EmptyInventory);
            }
            let item = self.find_item(item_id)?;
            if player.quantity_of(&item.identifier) < amount {
                return Err(EconomyError::InsufficientQuantity);
            }

            let proceeds = item.sell_price().saturating_mul(i64::from(amount));
            let inventory = inventory::decrement(&player.inventory, &item.identifier, amount)?;
            let patch = PlayerPatch::new().add_balance(proceeds).inventory(inventory);
            self.write(key, patch, Some(player.version)).await?;

            info!("{} sold {}x {} for {}", key, amount, item.identifier, proceeds);
            Ok(format!(
                "You have successfully sold {}X {} for {} {}!",
                amount,
                item.identifier,
                proceeds,
                self.currency()
            ))
        })
        .await
    }

    pub async fn give(
        &self,
        key: PlayerKey,
        item_id: &str,
        amount: u32,
        recipient_id: u64,
    ) -> EconomyResult<String> {
        self.run("give", async {
            if amount == 0 {
                return Err(EconomyError::InvalidAmount);
            }
            let giver = self.load_player(key).await?;
            self.load_target(key, Some(recipient_id)).await?;
            let item = self.find_item(item_id)?;
            let held = giver.quantity_of(&item.identifier);
            if held == 0 {
                return Err(EconomyError::ItemNotInInventory(item.identifier.clone()));
            }
            if held < amount {
                return Err(EconomyError::InsufficientQuantity);
            }

            let remaining = inventory::decrement(&giver.inventory, &item.identifier, amount)?;
            self.write(key, PlayerPatch::new().inventory(remaining), Some(giver.version))
                .await?;

            let name = item.identifier.as_str();
            self.write(
                key.sibling(recipient_id),
                PlayerPatch::new().grant(name, amount),
                None,
            )
            .await?;

            info!("{} gave {}x {} to {}", key, amount, name, recipient_id);
            Ok(format!(
                "You gave {}X {} to {}!",
                amount,
                name,
                mention(recipient_id)
            ))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Item effects
    // ------------------------------------------------------------------

    /// Use one item, optionally on another player of the same guild.
    pub async fn use_item(
        &self,
        key: PlayerKey,
        item_id: &str,
        target: Option<u64>,
    ) -> EconomyResult<String> {
        self.run("use", self.use_item_inner(key, item_id, target))
            .await
    }

    async fn use_item_inner(
        &self,
        key: PlayerKey,
        item_id: &str,
        target: Option<u64>,
    ) -> EconomyResult<String> {
        let actor = self.load_player(key).await?;
        let now = self.clock.now();
        self.check_use_cooldown(&actor, now)?;

        let item = self.find_item(item_id)?;
        if actor.inventory.is_empty() {
            return Err(EconomyError::EmptyInventory);
        }
        if actor.quantity_of(&item.identifier) == 0 {
            return Err(EconomyError::ItemNotInInventory(item.identifier.clone()));
        }

        let effect = Effect::for_identifier(&item.identifier);
        let target = if effect.needs_target() {
            Some(self.load_target(key, target).await?)
        } else {
            None
        };

        let ring_plan = match (&target, effect) {
            (Some(target), Effect::Ring) => Some(plan_ring(&actor, target)?),
            _ => None,
        };

        let mut stamp = PlayerPatch::new().last_use_at(now);
        if effect.consumes_item() {
            stamp = stamp.inventory(inventory::decrement(
                &actor.inventory,
                &item.identifier,
                1,
            )?);
        }
        if let (Some(plan), Some(target)) = (ring_plan, &target) {
            stamp = stamp.marriage(match plan {
                RingPlan::Propose => MarriageState::ProposedTo(target.player_id),
                RingPlan::Accept => MarriageState::MarriedTo(target.player_id),
            });
        }
        let stamped = self.write(key, stamp, Some(actor.version)).await?;
        debug!("{} used {} (v{})", key, item.identifier, stamped.version);

        let outcome = match (effect, target) {
            (Effect::Chocolate, _) => self.eat_chocolate(key).await,
            (Effect::Car, Some(target)) => self.run_over(key, target).await,
            (Effect::Gun, Some(target)) => self.shoot_gun(key, target).await,
            (Effect::Bow, Some(target)) => self.shoot_bow(stamped, target).await,
            (Effect::Ring, Some(target)) => match ring_plan {
                Some(RingPlan::Accept) => self.accept_proposal(key, target).await,
                _ => {
                    info!("{} proposed to {}", key, target.player_id);
                    Ok(format!(
                        "You proposed to {} with a ring! They now have to accept your proposal by using their own ring!",
                        mention(target.player_id)
                    ))
                }
            },
            (Effect::Inert, _) => Ok(format!("You used your {}. Nothing happened.", item.display_name)),
            // needs_target() guarantees a target for the remaining effects
            (_, None) => Err(EconomyError::MissingTarget),
        };

        // The item and the cooldown are already spent: a lost race from here on must not
        // reach the caller as "nothing happened".
        outcome.map_err(|err| match err {
            EconomyError::ConcurrentModification => {
                warn!("{} used {} but the effect could not be applied", key, item.identifier);
                EconomyError::PartiallyApplied(format!(
                    "You used your {}, but the records involved kept changing and its effect could not be applied.",
                    item.display_name
                ))
            }
            other => other,
        })
    }

    async fn eat_chocolate(&self, key: PlayerKey) -> EconomyResult<String> {
        if !self.roll(|dice| dice.chance(GOLDEN_TICKET_PERCENT)) {
            return Ok("You ate some chocolate. Yum!".to_string());
        }
        self.credit(key, GOLDEN_TICKET).await?;
        info!("{} found a golden ticket", key);
        Ok(format!(
            "You found a golden ticket! You won {} {}!",
            GOLDEN_TICKET,
            self.currency()
        ))
    }

    async fn run_over(&self, key: PlayerKey, target: PlayerRecord) -> EconomyResult<String> {
        let victim = target.player_id;
        let toll = self
            .update_other(target, |t| {
                if t.balance < CAR_TOLL {
                    Ok((None, 0))
                } else {
                    Ok((Some(PlayerPatch::new().add_balance(-CAR_TOLL)), CAR_TOLL))
                }
            })
            .await?;
        if toll == 0 {
            return Ok(format!(
                "You ran over {} with your car, but they didn't have enough money to pay you!",
                mention(victim)
            ));
        }
        self.credit(key, toll).await?;
        info!("{} took a {} toll from {}", key, toll, victim);
        Ok(format!(
            "You ran over {} with your car and took {} {} from them!",
            mention(victim),
            toll,
            self.currency()
        ))
    }

    async fn shoot_gun(&self, key: PlayerKey, target: PlayerRecord) -> EconomyResult<String> {
        let victim = target.player_id;
        let shot = self
            .update_other(target, |t| {
                if inventory::has_item(&t.inventory, SHIELD, 1) {
                    let inventory = inventory::decrement(&t.inventory, SHIELD, 1)?;
                    return Ok((Some(PlayerPatch::new().inventory(inventory)), Shot::Blocked));
                }
                let taken = self.share_of(t.balance, GUN_ROBBERY);
                let patch = (taken > 0).then(|| PlayerPatch::new().add_balance(-taken));
                Ok((patch, Shot::Took(taken)))
            })
            .await?;

        match shot {
            Shot::Took(taken) => {
                if taken > 0 {
                    self.credit(key, taken).await?;
                }
                info!("{} robbed {} of {} at gunpoint", key, victim, taken);
                Ok(format!(
                    "You held up {} at gunpoint and robbed {} {} from them!",
                    mention(victim),
                    taken,
                    self.currency()
                ))
            }
            _ => {
                info!("{}'s shot at {} was blocked by a shield", key, victim);
                Ok(format!(
                    "You shot {} with your gun, but they had a shield and it blocked the bullet!",
                    mention(victim)
                ))
            }
        }
    }

    async fn shoot_bow(&self, archer: PlayerRecord, target: PlayerRecord) -> EconomyResult<String> {
        let key = archer.key();
        let victim = target.player_id;
        let shot = self
            .update_other(target, |t| {
                if inventory::has_item(&t.inventory, GUN, 1) {
                    let inventory = inventory::decrement(&t.inventory, GUN, 1)?;
                    return Ok((Some(PlayerPatch::new().inventory(inventory)), Shot::ShotBack));
                }
                let taken = self.share_of(t.balance, BOW_ROBBERY);
                let patch = (taken > 0).then(|| PlayerPatch::new().add_balance(-taken));
                Ok((patch, Shot::Took(taken)))
            })
            .await?;

        match shot {
            Shot::Took(taken) => {
                if taken > 0 {
                    self.credit(key, taken).await?;
                }
                info!("{} robbed {} of {} with a bow", key, victim, taken);
                Ok(format!(
                    "You shot {} and took {} {} from them!",
                    mention(victim),
                    taken,
                    self.currency()
                ))
            }
            _ => {
                let lost = self
                    .update_other(archer, |a| {
                        let lost = self.share_of(a.balance, BOW_BACKFIRE);
                        let patch = (lost > 0).then(|| PlayerPatch::new().add_balance(-lost));
                        Ok((patch, lost))
                    })
                    .await?;
                info!("{} was shot back by {} and lost {}", key, victim, lost);
                Ok(format!(
                    "You tried to rob {} with a bow, but they had a gun and shot you! You lost {} {}!",
                    mention(victim),
                    lost,
                    self.currency()
                ))
            }
        }
    }

    async fn accept_proposal(&self, key: PlayerKey, target: PlayerRecord) -> EconomyResult<String> {
        let partner = target.player_id;
        let accepted = self
            .update_other(target, |t| {
                if t.marriage.references(key.player_id) {
                    let patch = PlayerPatch::new().marriage(MarriageState::MarriedTo(key.player_id));
                    Ok((Some(patch), true))
                } else {
                    Ok((None, false))
                }
            })
            .await;

        if let Err(EconomyError::ConcurrentModification) = accepted {
            // We already wrote MarriedTo; step back to a proposal so neither side claims a
            // marriage the other never recorded.
            self.write(
                key,
                PlayerPatch::new().marriage(MarriageState::ProposedTo(partner)),
                None,
            )
            .await?;
            return Err(EconomyError::PartiallyApplied(format!(
                "You used your ring, but {}'s records kept changing. It stands as a proposal to them for now.",
                mention(partner)
            )));
        }

        let accepted = accepted?;
        if !accepted {
            // The proposal was withdrawn between our read and our write: what we wrote
            // stands as a fresh proposal instead.
            self.write(
                key,
                PlayerPatch::new().marriage(MarriageState::ProposedTo(partner)),
                None,
            )
            .await?;
            return Ok(format!(
                "You proposed to {} with a ring! They now have to accept your proposal by using their own ring!",
                mention(partner)
            ));
        }

        info!("{} and {} are married", key, partner);
        Ok(format!(
            "🎉 Congratulations! You and {} are now officially married! 🎉",
            mention(partner)
        ))
    }

    // ------------------------------------------------------------------
    // Marriage
    // ------------------------------------------------------------------

    /// Leave a marriage or withdraw a proposal. Only the acting record changes; the ring
    /// comes back either way.
    pub async fn divorce(&self, key: PlayerKey, target_id: u64) -> EconomyResult<String> {
        self.run("divorce", async {
            let actor = self.load_player(key).await?;
            if actor.marriage.is_unmarried() {
                return Err(EconomyError::NotMarried);
            }
            let target = self.load_other(key.sibling(target_id)).await?;
            if !actor.marriage.references(target_id) {
                return Err(EconomyError::NotMarriedToThatUser);
            }

            let inventory = inventory::increment(&actor.inventory, RING, 1)?;
            let patch = PlayerPatch::new()
                .inventory(inventory)
                .marriage(MarriageState::Unmarried);
            self.write(key, patch, Some(actor.version)).await?;

            let partner = mention(target_id);
            let message = match actor.marriage {
                MarriageState::ProposedTo(_) => format!(
                    "You withdrew your proposal to {}. Your ring has been returned.",
                    partner
                ),
                _ if target.marriage.references(key.player_id) => format!(
                    "You filed for divorce with {}! They now have to sign the papers to finalize the divorce.",
                    partner
                ),
                _ => format!(
                    "The papers have gone through. You and {} are now officially divorced...",
                    partner
                ),
            };
            info!("{} left {} ({:?})", key, target_id, actor.marriage);
            Ok(message)
        })
        .await
    }

    /// Describe the acting player's relationship, checking the partner's side.
    pub async fn marriage_status(&self, key: PlayerKey) -> EconomyResult<String> {
        self.run("marriage", async {
            let actor = self.load_player(key).await?;
            let message = match actor.marriage {
                MarriageState::Unmarried => "You are not married.".to_string(),
                MarriageState::ProposedTo(id) => format!(
                    "You proposed to {}. They have not accepted yet.",
                    mention(id)
                ),
                MarriageState::MarriedTo(id) => {
                    let partner = self.store.get_player(key.sibling(id)).await?;
                    let mutual = partner
                        .map(|p| p.marriage == MarriageState::MarriedTo(key.player_id))
                        .unwrap_or(false);
                    if mutual {
                        format!("You are officially married to {}.", mention(id))
                    } else {
                        format!(
                            "{} filed for divorce. Divorce them to sign the papers.",
                            mention(id)
                        )
                    }
                }
            };
            Ok(message)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Wallet
    // ------------------------------------------------------------------

    pub async fn balance(&self, key: PlayerKey) -> EconomyResult<String> {
        self.run("balance", async {
            let player = self.load_player(key).await?;
            Ok(format!("You have {} {}.", player.balance, self.currency()))
        })
        .await
    }

    pub async fn daily(&self, key: PlayerKey) -> EconomyResult<String> {
        self.run("daily", async {
            let player = self.load_player(key).await?;
            let now = self.clock.now();
            if let Some(last) = player.last_daily_at {
                let cooldown = self.config.daily_cooldown();
                let elapsed = now - last;
                if elapsed < cooldown {
                    let remaining = (cooldown - elapsed).min(cooldown);
                    return Err(EconomyError::CooldownActive {
                        remaining_secs: (remaining.num_milliseconds() + 999) / 1000,
                    });
                }
            }

            let grant = self.config.daily_grant;
            let patch = PlayerPatch::new().add_balance(grant).last_daily_at(now);
            self.write(key, patch, Some(player.version)).await?;
            info!("{} claimed the daily {}", key, grant);
            Ok(format!(
                "You claimed your daily {} {}!",
                grant,
                self.currency()
            ))
        })
        .await
    }

    pub async fn beg(&self, key: PlayerKey) -> EconomyResult<String> {
        self.run("beg", async {
            self.load_player(key).await?;
            let alms = self.roll(|dice| dice.range(self.config.beg_min, self.config.beg_max));
            if alms <= 0 {
                return Ok("Nobody gave you anything. Try again later!".to_string());
            }
            self.credit(key, alms).await?;
            Ok(format!(
                "Someone took pity on you and gave you {} {}!",
                alms,
                self.currency()
            ))
        })
        .await
    }

    pub async fn pay(&self, key: PlayerKey, recipient_id: u64, amount: u32) -> EconomyResult<String> {
        self.run("pay", async {
            if amount == 0 {
                return Err(EconomyError::InvalidAmount);
            }
            let payer = self.load_player(key).await?;
            self.load_target(key, Some(recipient_id)).await?;
            let amount = i64::from(amount);
            if payer.balance < amount {
                return Err(EconomyError::InsufficientFunds);
            }

            self.write(
                key,
                PlayerPatch::new().add_balance(-amount),
                Some(payer.version),
            )
            .await?;
            self.credit(key.sibling(recipient_id), amount).await?;

            info!("{} paid {} to {}", key, amount, recipient_id);
            Ok(format!(
                "You paid {} {} {}!",
                mention(recipient_id),
                amount,
                self.currency()
            ))
        })
        .await
    }

    /// Pickpocket a few coins, never more than the victim holds.
    pub async fn rob(&self, key: PlayerKey, target_id: u64) -> EconomyResult<String> {
        self.run("rob", async {
            self.load_player(key).await?;
            let target = self.load_target(key, Some(target_id)).await?;
            let roll = self.roll(|dice| dice.range(ROB_RANGE.0, ROB_RANGE.1));
            let taken = self
                .update_other(target, |t| {
                    let taken = roll.min(t.balance).max(0);
                    let patch = (taken > 0).then(|| PlayerPatch::new().add_balance(-taken));
                    Ok((patch, taken))
                })
                .await?;
            if taken == 0 {
                return Ok(format!("{} has nothing worth stealing!", mention(target_id)));
            }
            self.credit(key, taken).await?;
            info!("{} robbed {} from {}", key, taken, target_id);
            Ok(format!(
                "You robbed {} and got away with {} {}!",
                mention(target_id),
                taken,
                self.currency()
            ))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Zero-based `page`; out-of-range pages clamp.
    pub async fn shop(&self, page: i64) -> EconomyResult<Listing> {
        self.run("shop", async {
            Ok(listing::paginate(
                "Shop",
                listing::shop_entries(&self.catalog, self.currency()),
                self.config.shop_page_size,
                page,
            ))
        })
        .await
    }

    pub async fn inventory(&self, key: PlayerKey, page: i64) -> EconomyResult<Listing> {
        self.run("inventory", async {
            let player = self.load_player(key).await?;
            if player.inventory.is_empty() {
                return Err(EconomyError::EmptyInventory);
            }
            let title = if player.display_name.is_empty() {
                "Inventory".to_string()
            } else {
                format!("{}'s Inventory", player.display_name)
            };
            Ok(listing::paginate(
                title,
                listing::inventory_entries(&self.catalog, &player.inventory),
                self.config.inventory_page_size,
                page,
            ))
        })
        .await
    }

    pub async fn leaderboard(&self, guild_id: u64) -> EconomyResult<Listing> {
        self.run("leaderboard", async {
            let players = self.store.list_guild_players(guild_id).await?;
            let size = self.config.leaderboard_size;
            Ok(listing::paginate(
                "Leaderboard",
                listing::leaderboard_entries(players, size, self.currency()),
                size,
                0,
            ))
        })
        .await
    }
}

/// Decide what a ring does before anything is written.
fn plan_ring(actor: &PlayerRecord, target: &PlayerRecord) -> EconomyResult<RingPlan> {
    if !actor.marriage.is_unmarried() {
        return Err(EconomyError::AlreadyMarried(MarriageParty::You));
    }
    if target.marriage.references(actor.player_id) {
        return Ok(RingPlan::Accept);
    }
    if !target.marriage.is_unmarried() {
        return Err(EconomyError::AlreadyMarried(MarriageParty::Them));
    }
    Ok(RingPlan::Propose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::clock::ManualClock;
    use crate::economy::dice::FixedDice;
    use crate::economy::storage::SledPlayerStore;
    use crate::economy::types::ItemStack;
    use std::time::Duration;

    const GUILD: u64 = 500;

    struct Harness {
        engine: EconomyEngine,
        store: StoreHandle,
        clock: Arc<ManualClock>,
    }

    fn harness(dice: FixedDice) -> Harness {
        let store = StoreHandle::new(
            Arc::new(SledPlayerStore::temporary().unwrap()),
            Duration::from_secs(5),
        );
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = EconomyEngine::builder(store.clone())
            .dice(dice)
            .clock(clock.clone())
            .build();
        Harness {
            engine,
            store,
            clock,
        }
    }

    fn key(player: u64) -> PlayerKey {
        PlayerKey::new(GUILD, player)
    }

    async fn seed(h: &Harness, player: u64, balance: i64, items: &[(&str, u32)]) {
        h.store
            .ensure_player_exists(key(player), "Guild", &format!("p{}", player))
            .await
            .unwrap();
        let inventory = items.iter().map(|(n, q)| ItemStack::new(*n, *q)).collect();
        h.store
            .upsert_player(
                key(player),
                PlayerPatch::new().set_balance(balance).inventory(inventory),
                None,
            )
            .await
            .unwrap();
    }

    async fn get(h: &Harness, player: u64) -> PlayerRecord {
        h.store.get_player(key(player)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn buy_debits_and_stocks() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 2500, &[]).await;

        let msg = h.engine.buy(key(1), "gun", 1).await.unwrap();
        assert_eq!(msg, "You have successfully bought 1X gun for 2000 coins!");
        let p = get(&h, 1).await;
        assert_eq!(p.balance, 500);
        assert_eq!(p.inventory, vec![ItemStack::new("gun", 1)]);
    }

    #[tokio::test]
    async fn buy_rejections_write_nothing() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 100, &[]).await;
        let before = get(&h, 1).await;

        assert_eq!(
            h.engine.buy(key(1), "shield", 1).await,
            Err(EconomyError::InsufficientFunds)
        );
        assert_eq!(
            h.engine.buy(key(1), "sword", 1).await,
            Err(EconomyError::ItemNotFound("sword".to_string()))
        );
        assert_eq!(
            h.engine.buy(key(1), "bow", 0).await,
            Err(EconomyError::InvalidAmount)
        );
        assert_eq!(
            h.engine.buy(key(2), "bow", 1).await,
            Err(EconomyError::PlayerNotFound)
        );
        assert_eq!(get(&h, 1).await, before);
    }

    #[tokio::test]
    async fn sell_pays_half_price() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("bow", 3)]).await;

        h.engine.sell(key(1), "🏹 Bow", 2).await.unwrap();
        let p = get(&h, 1).await;
        assert_eq!(p.balance, 400);
        assert_eq!(p.quantity_of("bow"), 1);
    }

    #[tokio::test]
    async fn sell_without_stack_fails_cleanly() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("bow", 1)]).await;
        let before = get(&h, 1).await;
        assert_eq!(
            h.engine.sell(key(1), "gun", 1).await,
            Err(EconomyError::InsufficientQuantity)
        );
        assert_eq!(get(&h, 1).await.version, before.version);

        seed(&h, 2, 0, &[]).await;
        assert_eq!(
            h.engine.sell(key(2), "gun", 1).await,
            Err(EconomyError::EmptyInventory)
        );
    }

    #[tokio::test]
    async fn give_moves_stack_between_players() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("ring", 2)]).await;
        seed(&h, 2, 0, &[("ring", 1)]).await;

        let msg = h.engine.give(key(1), "ring", 2, 2).await.unwrap();
        assert_eq!(msg, "You gave 2X ring to <@2>!");
        assert!(get(&h, 1).await.inventory.is_empty());
        assert_eq!(get(&h, 2).await.quantity_of("ring"), 3);
    }

    #[tokio::test]
    async fn give_checks_recipient_and_stock() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("ring", 1)]).await;
        seed(&h, 2, 0, &[]).await;

        assert_eq!(
            h.engine.give(key(1), "ring", 1, 9).await,
            Err(EconomyError::RecipientNotPlaying)
        );
        assert_eq!(
            h.engine.give(key(1), "ring", 1, 1).await,
            Err(EconomyError::SelfTarget)
        );
        assert_eq!(
            h.engine.give(key(1), "gun", 1, 2).await,
            Err(EconomyError::ItemNotInInventory("gun".to_string()))
        );
        assert_eq!(
            h.engine.give(key(1), "ring", 2, 2).await,
            Err(EconomyError::InsufficientQuantity)
        );
    }

    #[tokio::test]
    async fn second_use_within_cooldown_fails() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("chocolate", 2), ("gun", 1)]).await;

        h.engine.use_item(key(1), "chocolate", None).await.unwrap();
        let err = h.engine.use_item(key(1), "gun", Some(2)).await.unwrap_err();
        assert!(matches!(err, EconomyError::CooldownActive { remaining_secs: 60 }));

        h.clock.advance(chrono::Duration::seconds(59));
        assert!(matches!(
            h.engine.use_item(key(1), "chocolate", None).await,
            Err(EconomyError::CooldownActive { remaining_secs: 1 })
        ));

        h.clock.advance(chrono::Duration::seconds(1));
        h.engine.use_item(key(1), "chocolate", None).await.unwrap();
        assert!(get(&h, 1).await.quantity_of("chocolate") == 0);
    }

    #[tokio::test]
    async fn bypass_list_skips_cooldown() {
        let store = StoreHandle::new(
            Arc::new(SledPlayerStore::temporary().unwrap()),
            Duration::from_secs(5),
        );
        let config = EconomyConfig {
            cooldown_bypass: vec![1],
            ..EconomyConfig::default()
        };
        let engine = EconomyEngine::builder(store.clone())
            .dice(FixedDice::low())
            .config(config)
            .build();
        store.ensure_player_exists(key(1), "G", "admin").await.unwrap();
        store
            .upsert_player(
                key(1),
                PlayerPatch::new().inventory(vec![ItemStack::new("chocolate", 2)]),
                None,
            )
            .await
            .unwrap();

        engine.use_item(key(1), "chocolate", None).await.unwrap();
        engine.use_item(key(1), "chocolate", None).await.unwrap();
    }

    #[tokio::test]
    async fn chocolate_jackpot() {
        let h = harness(FixedDice::new(true, 0.0));
        seed(&h, 1, 5, &[("chocolate", 1)]).await;
        let msg = h.engine.use_item(key(1), "chocolate", None).await.unwrap();
        assert_eq!(msg, "You found a golden ticket! You won 1000000 coins!");
        assert_eq!(get(&h, 1).await.balance, 1_000_005);
    }

    #[tokio::test]
    async fn plain_chocolate_only_consumes() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 5, &[("chocolate", 1)]).await;
        let msg = h.engine.use_item(key(1), "chocolate", None).await.unwrap();
        assert_eq!(msg, "You ate some chocolate. Yum!");
        let p = get(&h, 1).await;
        assert_eq!(p.balance, 5);
        assert!(p.inventory.is_empty());
        assert!(p.last_use_at.is_some());
    }

    #[tokio::test]
    async fn car_tolls_and_is_kept() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("car", 1)]).await;
        seed(&h, 2, 1500, &[]).await;

        let msg = h.engine.use_item(key(1), "car", Some(2)).await.unwrap();
        assert_eq!(
            msg,
            "You ran over <@2> with your car and took 1000 coins from them!"
        );
        assert_eq!(get(&h, 1).await.balance, 1000);
        assert_eq!(get(&h, 1).await.quantity_of("car"), 1);
        assert_eq!(get(&h, 2).await.balance, 500);
    }

    #[tokio::test]
    async fn car_on_poor_target_moves_nothing() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("car", 1)]).await;
        seed(&h, 2, 999, &[]).await;

        let msg = h.engine.use_item(key(1), "car", Some(2)).await.unwrap();
        assert!(msg.contains("didn't have enough money"));
        assert_eq!(get(&h, 1).await.balance, 0);
        assert_eq!(get(&h, 2).await.balance, 999);
    }

    #[tokio::test]
    async fn shield_blocks_gun() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 100, &[("gun", 1)]).await;
        seed(&h, 2, 800, &[("shield", 1)]).await;

        let msg = h.engine.use_item(key(1), "gun", Some(2)).await.unwrap();
        assert!(msg.contains("blocked the bullet"));
        let victim = get(&h, 2).await;
        assert!(victim.inventory.is_empty());
        assert_eq!(victim.balance, 800);
        let shooter = get(&h, 1).await;
        assert_eq!(shooter.balance, 100);
        assert!(shooter.inventory.is_empty());
    }

    #[tokio::test]
    async fn gun_robs_low_end_share() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("gun", 1)]).await;
        seed(&h, 2, 1000, &[]).await;

        let msg = h.engine.use_item(key(1), "gun", Some(2)).await.unwrap();
        assert_eq!(
            msg,
            "You held up <@2> at gunpoint and robbed 100 coins from them!"
        );
        assert_eq!(get(&h, 1).await.balance, 100);
        assert_eq!(get(&h, 2).await.balance, 900);
    }

    #[tokio::test]
    async fn bow_against_gun_backfires() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 1000, &[("bow", 1)]).await;
        seed(&h, 2, 1000, &[("gun", 2)]).await;

        let msg = h.engine.use_item(key(1), "bow", Some(2)).await.unwrap();
        assert!(msg.ends_with("they had a gun and shot you! You lost 100 coins!"));
        assert_eq!(get(&h, 1).await.balance, 900);
        let victim = get(&h, 2).await;
        assert_eq!(victim.balance, 1000);
        assert_eq!(victim.quantity_of("gun"), 1);
    }

    #[tokio::test]
    async fn bow_robs_unarmed_target() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("bow", 1)]).await;
        seed(&h, 2, 1000, &[]).await;

        let msg = h.engine.use_item(key(1), "bow", Some(2)).await.unwrap();
        assert_eq!(msg, "You shot <@2> and took 200 coins from them!");
        assert_eq!(get(&h, 1).await.balance, 200);
        assert_eq!(get(&h, 2).await.balance, 800);
    }

    #[tokio::test]
    async fn targeted_use_needs_a_playing_target() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("gun", 1)]).await;

        assert_eq!(
            h.engine.use_item(key(1), "gun", None).await,
            Err(EconomyError::MissingTarget)
        );
        assert_eq!(
            h.engine.use_item(key(1), "gun", Some(1)).await,
            Err(EconomyError::SelfTarget)
        );
        assert_eq!(
            h.engine.use_item(key(1), "gun", Some(3)).await,
            Err(EconomyError::RecipientNotPlaying)
        );
        // nothing consumed, no cooldown started
        let p = get(&h, 1).await;
        assert_eq!(p.quantity_of("gun"), 1);
        assert!(p.last_use_at.is_none());
    }

    #[tokio::test]
    async fn use_reports_missing_items() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[]).await;
        assert_eq!(
            h.engine.use_item(key(1), "gun", Some(2)).await,
            Err(EconomyError::EmptyInventory)
        );
        seed(&h, 1, 0, &[("bow", 1)]).await;
        assert_eq!(
            h.engine.use_item(key(1), "gun", Some(2)).await,
            Err(EconomyError::ItemNotInInventory("gun".to_string()))
        );
        assert_eq!(
            h.engine.use_item(key(1), "laser", Some(2)).await,
            Err(EconomyError::ItemNotFound("laser".to_string()))
        );
    }

    #[tokio::test]
    async fn ring_proposal_then_acceptance() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("ring", 1)]).await;
        seed(&h, 2, 0, &[("ring", 1)]).await;

        let msg = h.engine.use_item(key(1), "ring", Some(2)).await.unwrap();
        assert!(msg.starts_with("You proposed to <@2>"));
        assert_eq!(get(&h, 1).await.marriage, MarriageState::ProposedTo(2));
        assert_eq!(get(&h, 2).await.marriage, MarriageState::Unmarried);

        let msg = h.engine.use_item(key(2), "ring", Some(1)).await.unwrap();
        assert_eq!(
            msg,
            "🎉 Congratulations! You and <@1> are now officially married! 🎉"
        );
        assert_eq!(get(&h, 1).await.marriage, MarriageState::MarriedTo(2));
        assert_eq!(get(&h, 2).await.marriage, MarriageState::MarriedTo(1));
        assert!(get(&h, 2).await.inventory.is_empty());

        assert_eq!(
            h.engine.marriage_status(key(1)).await.unwrap(),
            "You are officially married to <@2>."
        );
    }

    #[tokio::test]
    async fn ring_rejects_taken_parties() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[("ring", 2)]).await;
        seed(&h, 2, 0, &[]).await;
        seed(&h, 3, 0, &[]).await;
        h.store
            .upsert_player(key(3), PlayerPatch::new().marriage(MarriageState::MarriedTo(4)), None)
            .await
            .unwrap();

        assert_eq!(
            h.engine.use_item(key(1), "ring", Some(3)).await,
            Err(EconomyError::AlreadyMarried(MarriageParty::Them))
        );
        h.engine.use_item(key(1), "ring", Some(2)).await.unwrap();
        h.clock.advance(chrono::Duration::seconds(60));
        assert_eq!(
            h.engine.use_item(key(1), "ring", Some(2)).await,
            Err(EconomyError::AlreadyMarried(MarriageParty::You))
        );
    }

    #[tokio::test]
    async fn divorce_is_one_sided_until_both_sign() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[]).await;
        seed(&h, 2, 0, &[]).await;
        h.store
            .upsert_player(key(1), PlayerPatch::new().marriage(MarriageState::MarriedTo(2)), None)
            .await
            .unwrap();
        h.store
            .upsert_player(key(2), PlayerPatch::new().marriage(MarriageState::MarriedTo(1)), None)
            .await
            .unwrap();

        let msg = h.engine.divorce(key(1), 2).await.unwrap();
        assert!(msg.starts_with("You filed for divorce with <@2>!"));
        let a = get(&h, 1).await;
        assert_eq!(a.marriage, MarriageState::Unmarried);
        assert_eq!(a.quantity_of("ring"), 1);
        assert_eq!(get(&h, 2).await.marriage, MarriageState::MarriedTo(1));
        assert!(h
            .engine
            .marriage_status(key(2))
            .await
            .unwrap()
            .contains("filed for divorce"));

        let msg = h.engine.divorce(key(2), 1).await.unwrap();
        assert!(msg.contains("now officially divorced"));
        assert_eq!(get(&h, 2).await.marriage, MarriageState::Unmarried);
    }

    #[tokio::test]
    async fn divorce_preconditions() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[]).await;
        seed(&h, 2, 0, &[]).await;
        seed(&h, 3, 0, &[]).await;
        assert_eq!(h.engine.divorce(key(1), 2).await, Err(EconomyError::NotMarried));

        h.store
            .upsert_player(key(1), PlayerPatch::new().marriage(MarriageState::ProposedTo(2)), None)
            .await
            .unwrap();
        assert_eq!(
            h.engine.divorce(key(1), 3).await,
            Err(EconomyError::NotMarriedToThatUser)
        );
        assert_eq!(
            h.engine.divorce(key(1), 9).await,
            Err(EconomyError::RecipientNotPlaying)
        );
        let msg = h.engine.divorce(key(1), 2).await.unwrap();
        assert!(msg.starts_with("You withdrew your proposal"));
        assert_eq!(get(&h, 1).await.quantity_of("ring"), 1);
    }

    #[tokio::test]
    async fn daily_once_per_period() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 0, &[]).await;
        h.engine.daily(key(1)).await.unwrap();
        assert!(matches!(
            h.engine.daily(key(1)).await,
            Err(EconomyError::CooldownActive { .. })
        ));
        h.clock.advance(chrono::Duration::hours(24));
        h.engine.daily(key(1)).await.unwrap();
        assert_eq!(get(&h, 1).await.balance, 200);
    }

    #[tokio::test]
    async fn beg_and_balance() {
        let h = harness(FixedDice::new(false, 0.99));
        seed(&h, 1, 0, &[]).await;
        h.engine.beg(key(1)).await.unwrap();
        assert_eq!(h.engine.balance(key(1)).await.unwrap(), "You have 10 coins.");
    }

    #[tokio::test]
    async fn pay_conserves_money() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 300, &[]).await;
        seed(&h, 2, 10, &[]).await;

        h.engine.pay(key(1), 2, 250).await.unwrap();
        assert_eq!(get(&h, 1).await.balance, 50);
        assert_eq!(get(&h, 2).await.balance, 260);
        assert_eq!(
            h.engine.pay(key(1), 2, 51).await,
            Err(EconomyError::InsufficientFunds)
        );
        assert_eq!(h.engine.pay(key(1), 2, 0).await, Err(EconomyError::InvalidAmount));
    }

    #[tokio::test]
    async fn rob_is_capped_by_victim_balance() {
        let h = harness(FixedDice::new(false, 0.99));
        seed(&h, 1, 0, &[]).await;
        seed(&h, 2, 20, &[]).await;
        h.engine.rob(key(1), 2).await.unwrap();
        assert_eq!(get(&h, 1).await.balance, 20);
        assert_eq!(get(&h, 2).await.balance, 0);
        let msg = h.engine.rob(key(1), 2).await.unwrap();
        assert_eq!(msg, "<@2> has nothing worth stealing!");
    }

    #[tokio::test]
    async fn listings_page_and_clamp() {
        let h = harness(FixedDice::low());
        let shop = h.engine.shop(7).await.unwrap();
        assert_eq!(shop.total_pages, 2);
        assert_eq!(shop.page, 1);
        assert_eq!(shop.entries.len(), 1);

        seed(&h, 1, 10, &[("gun", 2)]).await;
        seed(&h, 2, 30, &[]).await;
        let inv = h.engine.inventory(key(1), 0).await.unwrap();
        assert_eq!(inv.entries[0].display_label, "🔫 Gun");
        assert_eq!(
            h.engine.inventory(key(2), 0).await,
            Err(EconomyError::EmptyInventory)
        );

        let board = h.engine.leaderboard(GUILD).await.unwrap();
        assert_eq!(board.entries[0].display_label, "#1 p2");
    }

    #[tokio::test]
    async fn stale_read_loses_the_race() {
        let h = harness(FixedDice::low());
        seed(&h, 1, 2000, &[]).await;
        let stale = get(&h, 1).await;
        h.engine.buy(key(1), "gun", 1).await.unwrap();

        // A second purchase planned against the stale read must not overdraw.
        let patch = PlayerPatch::new()
            .add_balance(-2000)
            .inventory(inventory::increment(&stale.inventory, "gun", 1).unwrap());
        let err = h.engine.write(key(1), patch, Some(stale.version)).await;
        assert_eq!(err, Err(EconomyError::ConcurrentModification));
        assert_eq!(get(&h, 1).await.balance, 0);
    }
}
