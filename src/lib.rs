//! # Guildmarket - Per-Guild Chat Economy
//!
//! Guildmarket is the transaction engine behind a chat economy game: every guild has its
//! own players, each with a balance, an inventory of shop items and a relationship
//! status. Players buy and sell items, give them away, and use them on each other.
//!
//! ## Features
//!
//! - **Shop**: a fixed, price-ordered catalog; items sell back for half price.
//! - **Item Effects**: chocolate jackpots, car tolls, gun and bow robberies with shield
//!   and gun counters, rings for proposals.
//! - **Marriage**: one-sided proposals, mutual marriage, one-sided divorce filings.
//! - **Wallet**: balance, daily grant, begging, payments, pickpocketing, leaderboard.
//! - **Safe Concurrency**: every spending write is a compare-and-swap against the record
//!   version that was read, so racing commands cannot overdraw a player.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use guildmarket::config::Config;
//! use guildmarket::commands::CommandDispatcher;
//! use guildmarket::economy::{EconomyEngine, SledPlayerStore, StoreHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = SledPlayerStore::open(config.storage.database_path())?;
//!     let handle = StoreHandle::new(Arc::new(store), config.economy.store_timeout());
//!     let engine = EconomyEngine::builder(handle)
//!         .config(config.economy.clone())
//!         .build();
//!     let dispatcher = CommandDispatcher::new(Arc::new(engine));
//!     let reply = dispatcher.handle(1, "My Guild", 42, "alice", "bal").await;
//!     println!("{}", reply.render_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`economy`] - records, catalog, inventory, storage and the transaction engine
//! - [`commands`] - parsing chat command lines and dispatching them to the engine
//! - [`config`] - configuration management and validation
//! - [`logutil`] - log sanitising for user-supplied text
//! - [`metrics`] - operation counters

pub mod commands;
pub mod config;
pub mod economy;
pub mod logutil;
pub mod metrics;
