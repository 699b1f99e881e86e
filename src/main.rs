//! `streamgate` CLI - Query providers and manage configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use streamgate::{ConfigStore, MediaType, ProcessEnv};

mod cmd;

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(about = "Aggregate stream candidates from many providers")]
#[command(version)]
struct Cli {
    /// Override document to use instead of the default location
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch stream candidates for a title from every enabled provider
    Streams {
        /// TMDB id of the title
        media_id: String,

        /// movie or series
        #[arg(short = 't', long = "type", default_value = "movie")]
        media_type: MediaType,

        /// Season number (series only)
        #[arg(short, long)]
        season: Option<u32>,

        /// Episode number (series only)
        #[arg(short, long)]
        episode: Option<u32>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List known providers and whether they are enabled
    Providers {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show or change the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the credential pool and draw a sample credential
    Cookies {
        /// Draw one credential and print the resulting stats
        #[arg(long)]
        pick: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Set a key in the override document (value parsed as JSON when possible)
    Set { key: String, value: String },

    /// Remove a key from the override document
    Unset { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let store = match cli.config_path {
        Some(path) => ConfigStore::open(path, Arc::new(ProcessEnv)),
        None => ConfigStore::from_process_env(),
    };

    match cli.command {
        Commands::Streams {
            media_id,
            media_type,
            season,
            episode,
            json,
        } => {
            cmd::streams::cmd_streams(store, media_id, media_type, season, episode, json).await?;
        }
        Commands::Providers { json } => {
            cmd::providers::cmd_providers(store, json)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd::config::cmd_config_show(&store)?,
            ConfigAction::Set { key, value } => cmd::config::cmd_config_set(&store, &key, &value)?,
            ConfigAction::Unset { key } => cmd::config::cmd_config_unset(&store, &key)?,
        },
        Commands::Cookies { pick } => {
            cmd::cookies::cmd_cookies(&store, pick)?;
        }
    }

    Ok(())
}
