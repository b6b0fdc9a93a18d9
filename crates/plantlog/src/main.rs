//! `plantlog` - CLI and server for plant observation tracking
//!
//! This binary runs the HTTP API and offers offline access to the local
//! database: statistics, account roles and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use plantlog::backend::{ObservationQuery, ProfileQuery, Records};
use plantlog::cli::{Cli, Command, ConfigCommand, StatsCommand, UserCommand};
use plantlog::stats::{self, Summary};
use plantlog::storage::{FsBlobs, LocalBackend};
use plantlog::{init_logging, Backend, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(cmd) => serve(&config, cmd.listen.unwrap_or(config.server.listen)).await,
        Command::Status(cmd) => status(&config, cmd.json),
        Command::Stats(cmd) => print_stats(&config, &cmd).await,
        Command::User(cmd) => user(&config, cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_backend(config: &Config) -> anyhow::Result<LocalBackend> {
    LocalBackend::open(config)
        .with_context(|| format!("opening database {}", config.database_path().display()))
}

async fn serve(config: &Config, listen: std::net::SocketAddr) -> anyhow::Result<()> {
    let local = Arc::new(open_backend(config)?);
    let pruned = local.prune_expired_sessions()?;
    if pruned > 0 {
        info!("Pruned {} expired sessions", pruned);
    }

    let blobs = Arc::new(FsBlobs::new(
        config.blob_dir(),
        config.storage.public_base_url.clone(),
    ));
    info!("Database: {}", config.database_path().display());
    info!("Photos: {}", blobs.root().display());

    let backend = Backend::new(local.clone(), local, blobs);
    plantlog::api::serve(config, backend, listen).await?;
    Ok(())
}

fn status(config: &Config, json: bool) -> anyhow::Result<()> {
    let stats = open_backend(config)?.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "blob_dir": config.blob_dir(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("plantlog status");
        println!("---------------");
        println!("Database:          {}", config.database_path().display());
        println!("Photos:            {}", config.blob_dir().display());
        println!("Users:             {}", stats.users);
        println!("Plants:            {}", stats.plants);
        println!("Observations:      {}", stats.observations);
        println!("Active sessions:   {}", stats.active_sessions);
        if let Some(newest) = stats.newest_observation {
            println!("Newest observation: {}", newest.to_rfc3339());
        }
        println!("Database size:     {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

async fn print_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let backend = open_backend(config)?;
    let observations = backend
        .query_observations(ObservationQuery {
            student_id: Some(cmd.student),
            plant_id: cmd.plant,
        })
        .await?;

    let missing = cmd.missing.unwrap_or(config.stats.missing_values);
    let report = stats::report(&observations, &cmd.fields, &cmd.pairs, missing);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Observations: {}", report.observations);
    println!();
    println!("{:<16} {:>6} {:>10} {:>10} {:>10}", "field", "count", "average", "min", "max");
    for entry in &report.summaries {
        match &entry.summary {
            Summary::Values(d) => println!(
                "{:<16} {:>6} {:>10.2} {:>10.2} {:>10.2}",
                entry.field, d.count, d.average, d.min, d.max
            ),
            Summary::NoData => println!("{:<16} {:>6}", entry.field, "no data"),
        }
    }
    println!();
    println!("Correlations ({}):", report.missing_values.as_str());
    for pair in &report.correlations {
        let coefficient = pair
            .coefficient
            .map_or_else(|| "undefined".to_string(), |r| format!("{r:.3}"));
        println!("  {} vs {}: {}", pair.x, pair.y, coefficient);
    }
    Ok(())
}

async fn user(config: &Config, cmd: UserCommand) -> anyhow::Result<()> {
    let backend = open_backend(config)?;
    match cmd {
        UserCommand::List { role, json } => {
            let profiles = backend.query_profiles(ProfileQuery { role }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&profiles)?);
            } else if profiles.is_empty() {
                println!("No users.");
            } else {
                for profile in profiles {
                    println!(
                        "{}  {:<8} {}",
                        profile.id,
                        profile.role,
                        profile.full_name.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        UserCommand::SetRole { id, role } => {
            let profile = backend
                .update_role(id, role)
                .await
                .with_context(|| format!("setting role of {id}"))?;
            println!("{} is now {}", profile.id, profile.role);
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen:             {}", config.server.listen);
                println!("  Max body bytes:     {}", config.server.max_body_bytes);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Blob directory:     {}", config.blob_dir().display());
                println!("  Public base URL:    {}", config.storage.public_base_url);
                println!();
                println!("[Auth]");
                println!("  Session TTL (h):    {}", config.auth.session_ttl_hours);
                println!("  Min password len:   {}", config.auth.min_password_length);
                println!();
                println!("[Stats]");
                println!("  Missing values:     {}", config.stats.missing_values.as_str());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
