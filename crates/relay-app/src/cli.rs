//! CLI argument definitions for the relay binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Chat relay: dedups inbound platform messages and routes them to answer providers.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite store.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage provider and platform configures.
    #[command(subcommand)]
    Configure(ConfigureCommand),

    /// Provision users.
    #[command(subcommand)]
    Users(UsersCommand),

    /// Print a user's saved sessions as JSON lines.
    History(HistoryArgs),

    /// Relay JSON-line messages from stdin to the given answer providers.
    Run(RunArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigureCommand {
    /// Store a configure and print its id.
    Add {
        /// Configure kind, e.g. `echo`.
        #[arg(long)]
        kind: String,
        /// Field as `key=value`; repeatable.
        #[arg(long = "set", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },
    /// Print a stored configure.
    Show { id: String },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    /// Import every member of a JSON roster file.
    Import {
        #[arg(long)]
        platform: String,
        /// JSON array of `{"external_id", "name"}` objects.
        #[arg(long)]
        roster: PathBuf,
        /// Answer ids to entitle and default; repeatable.
        #[arg(long = "answer", required = true)]
        answers: Vec<String>,
    },
    /// Bind a platform identity to an existing user.
    Bind {
        #[arg(long)]
        platform: String,
        #[arg(long = "external-id")]
        external_id: String,
        #[arg(long)]
        uid: String,
    },
    /// Entitle a user to answer ids.
    Grant {
        #[arg(long)]
        uid: String,
        #[arg(long = "answer", required = true)]
        answers: Vec<String>,
        /// Also make the ids default answers.
        #[arg(long = "default")]
        as_default: bool,
    },
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long)]
    pub platform: String,
    #[arg(long = "external-id")]
    pub external_id: String,
    /// How far back to look.
    #[arg(long, default_value_t = 24)]
    pub hours: i64,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configure ids to materialize as answer providers; repeatable.
    #[arg(long = "answer", required = true)]
    pub answers: Vec<String>,
    /// Platform label given to console messages.
    #[arg(long, default_value = "console")]
    pub platform: String,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > RELAY_CONFIG env var > ~/.relay/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("RELAY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > RELAY_DATA_DIR env var > config file value.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> PathBuf {
        if let Some(ref p) = self.data_dir {
            return p.clone();
        }
        if let Ok(p) = std::env::var("RELAY_DATA_DIR") {
            return PathBuf::from(p);
        }
        expand_home(config_data_dir)
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{}`", raw)),
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".relay").join("config.toml");
    }
    PathBuf::from("config.toml")
}
