//! Relay application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite store
//! 4. Run an administrative subcommand, or the console relay loop

mod cli;
mod console;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_chat::{
    provider_from_configure, AnswerRouter, DefaultFilter, RelayAdmin, RosterMember,
    SessionOrchestrator,
};
use relay_core::config::RelayConfig;
use relay_core::store::{IdentityCache, SessionStore};
use relay_core::types::{Configure, UserUid};
use relay_storage::{Database, SqliteIdentityCache, SqliteSessionStore};

use cli::{CliArgs, Command, ConfigureCommand, HistoryArgs, RunArgs, UsersCommand};
use console::{ConsoleEvent, ConsoleReply};

struct Stores {
    identity: Arc<SqliteIdentityCache>,
    sessions: Arc<SqliteSessionStore>,
}

fn configure_command(
    admin: &RelayAdmin,
    identity: &SqliteIdentityCache,
    command: ConfigureCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ConfigureCommand::Add { kind, mut fields } => {
            fields.sort();
            let discriminators: Vec<&str> = fields.iter().map(|(_, v)| v.as_str()).collect();
            let mut configure = Configure::new();
            for (key, value) in &fields {
                configure.insert(key.clone(), serde_json::Value::from(value.as_str()));
            }
            let id = admin.add_configure(&kind, &discriminators, configure)?;
            println!("{}", id);
        }
        ConfigureCommand::Show { id } => {
            let configure = identity.get_configure(&id)?;
            println!("{}", serde_json::to_string_pretty(&configure)?);
        }
    }
    Ok(())
}

fn users_command(
    admin: &RelayAdmin,
    command: UsersCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        UsersCommand::Import {
            platform,
            roster,
            answers,
        } => {
            let content = std::fs::read_to_string(&roster)?;
            let members: Vec<RosterMember> = serde_json::from_str(&content)?;
            let report = admin.import_roster(&platform, &members, &answers)?;
            println!("{}", serde_json::to_string(&report)?);
        }
        UsersCommand::Bind {
            platform,
            external_id,
            uid,
        } => admin.bind(&platform, &external_id, &UserUid::new(uid))?,
        UsersCommand::Grant {
            uid,
            answers,
            as_default,
        } => admin.grant(&UserUid::new(uid), &answers, as_default)?,
    }
    Ok(())
}

fn history_command(stores: &Stores, args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let uid = stores
        .identity
        .resolve_uid(&args.platform, &args.external_id)?;
    let end = chrono::Utc::now();
    let start = end - chrono::Duration::hours(args.hours);
    for session in stores.sessions.get_history(&uid, start, end)? {
        println!("{}", serde_json::to_string(&session)?);
    }
    Ok(())
}

async fn run_relay(
    stores: Stores,
    config: &RelayConfig,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut router = AnswerRouter::new();
    for id in &args.answers {
        let configure = stores.identity.get_configure(id)?;
        router.register(id.clone(), provider_from_configure(id, &configure)?);
    }

    let orchestrator = SessionOrchestrator::new(
        stores.identity.clone(),
        stores.sessions.clone(),
        router,
        config.orchestrator.clone(),
    );
    orchestrator.add_filter(Arc::new(DefaultFilter::new(
        stores.sessions.clone(),
        config.filter.clone(),
    )));
    orchestrator.add_completion_handler(Arc::new(ConsoleReply));

    tracing::info!(platform = %args.platform, "Reading messages from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match ConsoleEvent::parse(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed input line");
                        continue;
                    }
                };
                orchestrator
                    .on_incoming_message(event.into_message(&args.platform))
                    .await?;
                tracing::debug!(queue_depth = orchestrator.queue_depth(), "Message accepted");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = if config_file.exists() {
        RelayConfig::load(&config_file)?
    } else {
        RelayConfig::default()
    };

    // Tracing. Logs go to stderr; stdout carries answers and command output.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join(&config.storage.db_file);
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let stores = Stores {
        identity: Arc::new(SqliteIdentityCache::new(Arc::clone(&db))),
        sessions: Arc::new(SqliteSessionStore::new(db)),
    };
    let admin = RelayAdmin::new(stores.identity.clone());

    match args.command {
        Command::Configure(command) => configure_command(&admin, &stores.identity, command)?,
        Command::Users(command) => users_command(&admin, command)?,
        Command::History(history) => history_command(&stores, history)?,
        Command::Run(run) => run_relay(stores, &config, run).await?,
    }

    Ok(())
}
