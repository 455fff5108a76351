//! Command line surface of the `feedguard` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "feedguard")]
#[command(about = "Hides feed posts whose topic scores cross your thresholds")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FEEDGUARD_CONFIG", default_value = "feedguard.toml")]
    pub config: PathBuf,

    /// Overrides `[store] database_url`
    #[arg(long, env = "FEEDGUARD_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one scan cycle over a captured feed snapshot
    Scan {
        /// JSON snapshot of the rendered feed
        #[arg(short, long)]
        snapshot: PathBuf,
    },
    /// Drop every cached classification result
    ResetCache,
    /// Manage topic rules
    #[command(subcommand)]
    Topics(TopicCommands),
    /// Manage the classifier API key
    #[command(subcommand)]
    Credential(CredentialCommands),
}

#[derive(Subcommand, Debug)]
pub enum TopicCommands {
    /// Print the configured rules in order
    List,
    /// Append a rule
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long)]
        threshold: f64,
    },
    /// Replace the rule at INDEX
    Update {
        index: usize,
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long)]
        threshold: f64,
    },
    /// Delete the rule at INDEX
    Remove { index: usize },
    /// Store the default rules if none are configured
    Seed,
}

#[derive(Subcommand, Debug)]
pub enum CredentialCommands {
    Set { token: String },
    Clear,
}
