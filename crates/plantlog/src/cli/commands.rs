//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::model::{Field, Role};
use crate::stats::MissingValues;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (overrides `server.listen`)
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Student whose observations are analysed
    #[arg(short, long, value_name = "ID")]
    pub student: Uuid,

    /// Only observations of this plant
    #[arg(short, long, value_name = "PLANT_ID")]
    pub plant: Option<i64>,

    /// Field to summarize; repeatable (default: height, leaf area, spread)
    #[arg(short, long = "field", value_name = "FIELD", value_parser = parse_field)]
    pub fields: Vec<Field>,

    /// Field pair to correlate, as x:y; repeatable
    #[arg(long = "pair", value_name = "X:Y", value_parser = parse_pair)]
    pub pairs: Vec<(Field, Field)>,

    /// Missing-value policy for correlations: zero_fill or exclude_pairwise
    /// (overrides `stats.missing_values`)
    #[arg(short, long, value_name = "POLICY", value_parser = parse_missing)]
    pub missing: Option<MissingValues>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Account management commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List profiles, ordered by name
    List {
        /// Only profiles with this role
        #[arg(short, long, value_parser = parse_role)]
        role: Option<Role>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Change a user's role (the only way to create the first admin)
    SetRole {
        /// User ID
        id: Uuid,

        /// New role: student, teacher or admin
        #[arg(value_parser = parse_role)]
        role: Role,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn parse_field(s: &str) -> Result<Field, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_pair(s: &str) -> Result<(Field, Field), String> {
    crate::stats::parse_pair(s).map_err(|e| e.to_string())
}

fn parse_missing(s: &str) -> Result<MissingValues, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}
