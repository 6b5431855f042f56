//! Init command - set up a site directory
//!
//! 1. Refuse if tavern.json already exists
//! 2. Write the default configuration
//! 3. Create the public directory
//! 4. Generate onion.key

use super::onion::generate_key_file;
use super::InitArgs;
use crate::config::{self, Config, CONFIG_FILE};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Run the init command
pub fn run_init(dir: &Path, args: &InitArgs) -> Result<()> {
    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() {
        bail!("Unable to init ({} file already exists)", CONFIG_FILE);
    }

    fs::create_dir_all(dir).context("Failed to create working directory")?;

    let config = Config::default();
    config::write(&config, &config_path)?;
    info!("Wrote {}", config_path.display());

    let public_dir = dir.join(&config.public_dir);
    fs::create_dir_all(&public_dir)
        .with_context(|| format!("Failed to create {}", public_dir.display()))?;

    if let Some(tor) = &config.tor {
        generate_key_file(&dir.join(&tor.private_key_file), tor.key_type, args.force)?;
    }

    println!("Done");
    Ok(())
}
