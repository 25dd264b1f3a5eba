use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use groupwarden_server::config::{ServerConfig, build_engine};
use groupwarden_server::engine::permissions::{Command as BotCommand, Rank, available_commands};
use groupwarden_server::web::app_state::AppState;
use groupwarden_server::web::router::build_router;

/// How often cached group records with no operation in flight are dropped.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "groupwarden")]
#[command(author, version, about = "Group permission and moderation service", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "groupwarden.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (the default)
    Serve,
    /// Print a member's rank
    Rank { group_id: String, member_id: String },
    /// Set a member's rank, bypassing authorization
    SetRank {
        group_id: String,
        member_id: String,
        /// Tier name (banned, restricted, regular, trusted, moderator, admin, owner) or integer
        rank: String,
    },
    /// Print a group's message and moderation counters
    Stats { group_id: String },
    /// List the bot commands open to a rank, or describe one command
    Commands {
        /// Command name, with or without the leading slash
        name: Option<String>,
        /// Rank whose commands to list
        #[arg(long, default_value = "regular")]
        rank: String,
    },
}

fn command_line(command: BotCommand) -> String {
    format!(
        "/{:<10} {:<10} {}",
        command.as_str(),
        command.min_rank().to_string(),
        command.description()
    )
}

fn command_help(name: Option<&str>, rank: &str) -> Result<Vec<String>> {
    if let Some(name) = name {
        let command = BotCommand::parse(name).with_context(|| format!("unknown command {name:?}"))?;
        return Ok(vec![command_line(command)]);
    }
    let rank = Rank::parse(rank).with_context(|| format!("unknown rank {rank:?}"))?;
    Ok(available_commands(rank).into_iter().map(command_line).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    let engine = Arc::new(build_engine(&config).await?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let sweeper = engine.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    sweeper.evict_idle_groups();
                }
            });

            let app = build_router(Arc::new(AppState { engine }));
            let web_addr = &config.server.web_address;

            info!(
                "Groupwarden starting on {} ({:?} backend)",
                web_addr, config.store.backend
            );

            let listener = tokio::net::TcpListener::bind(web_addr)
                .await
                .with_context(|| format!("failed to bind {web_addr}"))?;
            axum::serve(listener, app).await.context("server error")?;
        }
        Command::Rank {
            group_id,
            member_id,
        } => {
            let rank = engine.rank_of(&group_id, &member_id).await?;
            println!("{member_id} in {group_id}: {rank}");
        }
        Command::SetRank {
            group_id,
            member_id,
            rank,
        } => {
            let rank = Rank::parse(&rank).with_context(|| format!("unknown rank {rank:?}"))?;
            engine.set_rank(&group_id, &member_id, rank).await?;
            println!("{member_id} in {group_id} is now {rank}");
        }
        Command::Stats { group_id } => {
            let stats = engine.stats(&group_id).await?;
            println!("messages:        {}", stats.message_count);
            println!("warnings issued: {}", stats.warnings_issued);
            println!("users banned:    {}", stats.users_banned);
        }
        Command::Commands { name, rank } => {
            for line in command_help(name.as_deref(), &rank)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}
