//! tavern - static site publishing over Tor onion services
//!
//! Serves a directory over HTTP on localhost and registers it with the local
//! Tor daemon as an onion service.
//!
//! # Usage
//!
//! ```bash
//! # Set up tavern.json, public/ and onion.key
//! tavern init
//!
//! # Serve and publish until Ctrl-C
//! tavern run
//!
//! # Generate a legacy RSA key instead
//! tavern onion new --type rsa
//! ```

use anyhow::Result;
use tavern::cli::{self, Commands};
use tavern::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    logging::init(cli.verbose);

    match &cli.command {
        Commands::Init(args) => {
            cli::run_init(&cli.dir, args)?;
        },
        Commands::Run(args) => {
            cli::run_serve(&cli.dir, args).await?;
        },
        Commands::Onion(args) => {
            cli::run_onion(&cli.dir, args)?;
        },
        Commands::Version => {
            println!("{}", tavern::VERSION);
        },
    }

    Ok(())
}
