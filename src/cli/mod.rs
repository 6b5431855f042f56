//! Command-line interface for tavern
//!
//! Provides main commands:
//! - `init` - Set up a site in the working directory
//! - `run` - Serve the site and publish it as an onion service
//! - `onion` - Key file tools
//! - `version` - Print the version

mod init;
mod onion;
mod run;

pub use init::run_init;
pub use onion::run_onion;
pub use run::run_serve;

use crate::crypto::KeyType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tavern - static site publishing over Tor onion services
#[derive(Parser, Debug)]
#[command(name = "tavern")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Working directory holding tavern.json, public/ and onion.key
    #[arg(short, long, default_value = ".", global = true)]
    pub dir: PathBuf,

    /// Verbose output
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize tavern in the working directory
    Init(InitArgs),

    /// Serve public/ and publish it as an onion service
    Run(RunArgs),

    /// Tor onion key tools
    Onion(OnionArgs),

    /// Print version
    Version,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing onion.key without asking
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to config file (overrides <dir>/tavern.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Arguments for onion command
#[derive(Parser, Debug)]
pub struct OnionArgs {
    #[command(subcommand)]
    pub action: OnionAction,
}

/// Onion subcommands
#[derive(Subcommand, Debug)]
pub enum OnionAction {
    /// Generate a new onion.key file
    New(OnionNewArgs),

    /// Show the onion address of a key file
    Show(OnionShowArgs),
}

/// Arguments for onion new
#[derive(Parser, Debug)]
pub struct OnionNewArgs {
    /// Type of key to generate (ed25519 or rsa)
    #[arg(short = 't', long = "type", default_value = "ed25519")]
    pub key_type: KeyType,

    /// Path to key file (defaults to <dir>/onion.key)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Overwrite an existing key file without asking
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Arguments for onion show
#[derive(Parser, Debug)]
pub struct OnionShowArgs {
    /// Path to key file (defaults to <dir>/onion.key)
    #[arg(long)]
    pub key: Option<PathBuf>,
}

/// Parse command line arguments
pub fn parse() -> Cli {
    Cli::parse()
}
