//! Binary entrypoint for the guildmarket CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml` and the player database
//! - `exec --guild <id> --player <id> <command…>` - run one economy command
//! - `shell --guild <id> --player <id>` - read economy commands from stdin until EOF or `quit`
//! - `status [--json]` - print operation counters and players per guild
//!
//! See the library crate docs for module-level details: `guildmarket::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

use guildmarket::commands::CommandDispatcher;
use guildmarket::config::Config;
use guildmarket::economy::{EconomyEngine, SledPlayerStore, StoreHandle};
use guildmarket::metrics;

#[derive(Parser)]
#[command(name = "guildmarket")]
#[command(about = "Per-guild chat economy: shop, inventory, item effects and marriages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Args, Clone)]
struct Actor {
    /// Guild the command runs in
    #[arg(long)]
    guild: u64,
    /// Acting player id
    #[arg(long)]
    player: u64,
    /// Display name recorded when the player is first seen
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    guild_name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the database
    Init,
    /// Run a single economy command, e.g. `exec --guild 1 --player 2 buy gun 1`
    Exec {
        #[command(flatten)]
        actor: Actor,
        /// Command line as a player would type it
        #[arg(trailing_var_arg = true, required = true)]
        line: Vec<String>,
    },
    /// Read economy commands from stdin, one per line
    Shell {
        #[command(flatten)]
        actor: Actor,
    },
    /// Show counters and per-guild player counts
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new guildmarket configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let cfg = Config::default();
            let db_path = cfg.storage.database_path();
            SledPlayerStore::open(&db_path)?;
            info!("Player database ready at {}", db_path.display());
            println!("Created {} and {}", cli.config, db_path.display());
        }
        Commands::Exec { actor, line } => {
            let config = load_config(pre_config, &cli.config).await?;
            let dispatcher = build_dispatcher(&config)?;
            let reply = dispatcher
                .handle(
                    actor.guild,
                    &actor.guild_name,
                    actor.player,
                    &actor.name,
                    &line.join(" "),
                )
                .await;
            println!("{}", reply.render_text());
        }
        Commands::Shell { actor } => {
            let config = load_config(pre_config, &cli.config).await?;
            let dispatcher = build_dispatcher(&config)?;
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    break;
                }
                let reply = dispatcher
                    .handle(
                        actor.guild,
                        &actor.guild_name,
                        actor.player,
                        &actor.name,
                        line,
                    )
                    .await;
                println!("{}", reply.render_text());
            }
        }
        Commands::Status { json } => {
            let config = load_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let counts = store.guild_player_counts().await?;
            let snapshot = metrics::snapshot();
            if json {
                let body = serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": config.storage.database_path(),
                    "guilds": counts,
                    "metrics": snapshot,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("guildmarket v{}", env!("CARGO_PKG_VERSION"));
                println!("Database: {}", config.storage.database_path().display());
                println!("Guilds: {}", counts.len());
                for (guild, players) in &counts {
                    println!("  {}: {} players", guild, players);
                }
                println!(
                    "Operations: {} ok / {} failed, {} conflicts, {} store timeouts",
                    snapshot.operations_ok,
                    snapshot.operations_failed,
                    snapshot.version_conflicts,
                    snapshot.store_timeouts
                );
            }
        }
    }

    Ok(())
}

async fn load_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    let config = match pre_config {
        Some(config) => config,
        None => Config::load(path).await?,
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<StoreHandle> {
    let store = SledPlayerStore::open(config.storage.database_path())?;
    Ok(StoreHandle::new(
        Arc::new(store),
        config.economy.store_timeout(),
    ))
}

fn build_dispatcher(config: &Config) -> Result<CommandDispatcher> {
    let engine = EconomyEngine::builder(open_store(config)?)
        .config(config.economy.clone())
        .build();
    Ok(CommandDispatcher::new(Arc::new(engine)))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Mutex::new(f);
        // Echo to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
