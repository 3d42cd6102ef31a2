//! Chat command surface.
//!
//! Turns one line of chat text (`buy gun 2`, `use ring <@123>`) into an
//! [`EconomyCommand`] and runs it against the [`EconomyEngine`]. The dispatcher makes
//! sure the acting player has a record first and retries a command once when it lost a
//! race with a concurrent command on the same record.

use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::economy::{EconomyEngine, EconomyError, EconomyResult, Listing, PlayerKey};
use crate::logutil::escape_log;
use crate::metrics;

/// Economy commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EconomyCommand {
    Help,
    Balance,             // BAL
    Daily,               // DAILY
    Beg,                 // BEG
    Rob { target: u64 }, // ROB @user
    Pay { recipient: u64, amount: u32 },
    Leaderboard,
    /// Zero-based page
    Shop { page: i64 },
    Inventory { page: i64 },
    Buy { item: String, amount: u32 },
    Sell { item: String, amount: u32 },
    Give { item: String, amount: u32, recipient: u64 },
    Use { item: String, target: Option<u64> },
    Divorce { target: u64 },
    Marriage,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid mention {0}")]
    BadMention(String),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Unknown(_) => "Command not recognized! Try `help`.".to_string(),
            CommandError::Usage(usage) => format!("Usage: {}", usage),
            CommandError::InvalidAmount => EconomyError::InvalidAmount.user_message(),
            CommandError::BadMention(_) => "Please mention a valid user!".to_string(),
        }
    }
}

const HELP: &str = "\
bal - show your balance
daily - claim your daily reward
beg - beg for a few coins
rob @user - pickpocket someone
pay @user <amount> - send coins
leaderboard - richest players
shop [page] - items for sale
inv [page] - your inventory
buy <item> [amount] / sell <item> [amount]
give <item> [amount] @user
use <item> [@user]
divorce @user / marriage";

/// Accepts `<@123>`, `<@!123>` and a bare `123`.
pub fn parse_mention(token: &str) -> Option<u64> {
    let inner = match token.strip_prefix("<@") {
        Some(rest) => rest.strip_suffix('>')?.trim_start_matches('!'),
        None => token,
    };
    if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

fn looks_like_mention(token: &str) -> bool {
    token.starts_with("<@") && token.ends_with('>')
}

fn parse_amount(token: &str) -> Result<u32, CommandError> {
    let value: i64 = token.parse().map_err(|_| CommandError::InvalidAmount)?;
    if value <= 0 {
        return Err(CommandError::InvalidAmount);
    }
    u32::try_from(value).map_err(|_| CommandError::InvalidAmount)
}

fn mention_arg(token: Option<&&str>, usage: &'static str) -> Result<u64, CommandError> {
    let token = token.ok_or(CommandError::Usage(usage))?;
    parse_mention(token).ok_or_else(|| CommandError::BadMention(token.to_string()))
}

/// `[page]` as typed by a player (1-based) to the engine's zero-based index.
fn page_arg(token: Option<&&str>) -> i64 {
    token
        .and_then(|t| t.parse::<i64>().ok())
        .map(|p| p.saturating_sub(1))
        .unwrap_or(0)
}

/// Split `<item words…> [amount]` into an item name and a quantity (default 1).
fn item_and_amount(words: &[&str], usage: &'static str) -> Result<(String, u32), CommandError> {
    let Some((last, rest)) = words.split_last() else {
        return Err(CommandError::Usage(usage));
    };
    if !rest.is_empty() && last.parse::<i64>().is_ok() {
        return Ok((rest.join(" "), parse_amount(last)?));
    }
    Ok((words.join(" "), 1))
}

impl EconomyCommand {
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((verb, args)) = parts.split_first() else {
            return Err(CommandError::Unknown(String::new()));
        };

        match verb.to_lowercase().as_str() {
            "help" | "h" | "?" => Ok(EconomyCommand::Help),
            "bal" | "balance" => Ok(EconomyCommand::Balance),
            "daily" => Ok(EconomyCommand::Daily),
            "beg" => Ok(EconomyCommand::Beg),
            "rob" => Ok(EconomyCommand::Rob {
                target: mention_arg(args.first(), "rob @user")?,
            }),
            "pay" => {
                const USAGE: &str = "pay @user <amount>";
                let recipient = mention_arg(args.first(), USAGE)?;
                let amount = args.get(1).ok_or(CommandError::Usage(USAGE))?;
                Ok(EconomyCommand::Pay {
                    recipient,
                    amount: parse_amount(amount)?,
                })
            }
            "leaderboard" | "lb" | "top" => Ok(EconomyCommand::Leaderboard),
            "shop" => Ok(EconomyCommand::Shop {
                page: page_arg(args.first()),
            }),
            "inv" | "inventory" | "i" => Ok(EconomyCommand::Inventory {
                page: page_arg(args.first()),
            }),
            "buy" => {
                let (item, amount) = item_and_amount(args, "buy <item> [amount]")?;
                Ok(EconomyCommand::Buy { item, amount })
            }
            "sell" => {
                let (item, amount) = item_and_amount(args, "sell <item> [amount]")?;
                Ok(EconomyCommand::Sell { item, amount })
            }
            "give" => {
                const USAGE: &str = "give <item> [amount] @user";
                let Some((last, words)) = args.split_last() else {
                    return Err(CommandError::Usage(USAGE));
                };
                let recipient = mention_arg(Some(last), USAGE)?;
                let (item, amount) = item_and_amount(words, USAGE)?;
                Ok(EconomyCommand::Give {
                    item,
                    amount,
                    recipient,
                })
            }
            "use" => {
                const USAGE: &str = "use <item> [@user]";
                match args.split_last() {
                    None => Err(CommandError::Usage(USAGE)),
                    Some((last, words)) if looks_like_mention(last) => {
                        if words.is_empty() {
                            return Err(CommandError::Usage(USAGE));
                        }
                        Ok(EconomyCommand::Use {
                            item: words.join(" "),
                            target: Some(mention_arg(Some(last), USAGE)?),
                        })
                    }
                    Some(_) => Ok(EconomyCommand::Use {
                        item: args.join(" "),
                        target: None,
                    }),
                }
            }
            "divorce" => Ok(EconomyCommand::Divorce {
                target: mention_arg(args.first(), "divorce @user")?,
            }),
            "marriage" | "spouse" => Ok(EconomyCommand::Marriage),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Metrics/log label.
    pub fn name(&self) -> &'static str {
        match self {
            EconomyCommand::Help => "help",
            EconomyCommand::Balance => "balance",
            EconomyCommand::Daily => "daily",
            EconomyCommand::Beg => "beg",
            EconomyCommand::Rob { .. } => "rob",
            EconomyCommand::Pay { .. } => "pay",
            EconomyCommand::Leaderboard => "leaderboard",
            EconomyCommand::Shop { .. } => "shop",
            EconomyCommand::Inventory { .. } => "inventory",
            EconomyCommand::Buy { .. } => "buy",
            EconomyCommand::Sell { .. } => "sell",
            EconomyCommand::Give { .. } => "give",
            EconomyCommand::Use { .. } => "use",
            EconomyCommand::Divorce { .. } => "divorce",
            EconomyCommand::Marriage => "marriage",
        }
    }
}

/// What a command produced: a message, or a listing for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Text(String),
    Listing(Listing),
}

impl CommandOutput {
    pub fn render_text(&self) -> String {
        match self {
            CommandOutput::Text(text) => text.clone(),
            CommandOutput::Listing(listing) => listing.render_text(),
        }
    }
}

pub struct CommandDispatcher {
    engine: Arc<EconomyEngine>,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<EconomyEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EconomyEngine {
        &self.engine
    }

    /// Parse and run one chat line from `player_id` in `guild_id`. Never fails: every
    /// error becomes exactly one user-facing message.
    pub async fn handle(
        &self,
        guild_id: u64,
        guild_name: &str,
        player_id: u64,
        display_name: &str,
        line: &str,
    ) -> CommandOutput {
        debug!(
            "guild {} player {} ({}): {}",
            guild_id,
            player_id,
            escape_log(display_name),
            escape_log(line)
        );
        let command = match EconomyCommand::parse(line) {
            Ok(command) => command,
            Err(err) => return CommandOutput::Text(err.user_message()),
        };
        if command == EconomyCommand::Help {
            return CommandOutput::Text(HELP.to_string());
        }

        let key = PlayerKey::new(guild_id, player_id);
        if let Err(err) = self
            .engine
            .ensure_player(key, guild_name, display_name)
            .await
        {
            return CommandOutput::Text(err.user_message());
        }

        let result = match self.execute(key, &command).await {
            Err(EconomyError::ConcurrentModification) => {
                metrics::inc_dispatch_retries();
                info!("{} for {} lost a race, retrying once", command.name(), key);
                self.execute(key, &command).await
            }
            other => other,
        };
        result.unwrap_or_else(|err| CommandOutput::Text(err.user_message()))
    }

    /// Run an already parsed command for an existing player.
    pub async fn execute(
        &self,
        key: PlayerKey,
        command: &EconomyCommand,
    ) -> EconomyResult<CommandOutput> {
        let engine = &self.engine;
        let text = match command {
            EconomyCommand::Help => HELP.to_string(),
            EconomyCommand::Balance => engine.balance(key).await?,
            EconomyCommand::Daily => engine.daily(key).await?,
            EconomyCommand::Beg => engine.beg(key).await?,
            EconomyCommand::Rob { target } => engine.rob(key, *target).await?,
            EconomyCommand::Pay { recipient, amount } => {
                engine.pay(key, *recipient, *amount).await?
            }
            EconomyCommand::Leaderboard => {
                return Ok(CommandOutput::Listing(engine.leaderboard(key.guild_id).await?))
            }
            EconomyCommand::Shop { page } => {
                return Ok(CommandOutput::Listing(engine.shop(*page).await?))
            }
            EconomyCommand::Inventory { page } => {
                return Ok(CommandOutput::Listing(engine.inventory(key, *page).await?))
            }
            EconomyCommand::Buy { item, amount } => engine.buy(key, item, *amount).await?,
            EconomyCommand::Sell { item, amount } => engine.sell(key, item, *amount).await?,
            EconomyCommand::Give {
                item,
                amount,
                recipient,
            } => engine.give(key, item, *amount, *recipient).await?,
            EconomyCommand::Use { item, target } => engine.use_item(key, item, *target).await?,
            EconomyCommand::Divorce { target } => engine.divorce(key, *target).await?,
            EconomyCommand::Marriage => engine.marriage_status(key).await?,
        };
        Ok(CommandOutput::Text(text))
    }
}
