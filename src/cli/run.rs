//! Run command - serve the site and publish it
//!
//! The local server always starts. Publication failures are logged and the
//! site stays reachable locally; key file problems abort startup.

use super::RunArgs;
use crate::config::{self, TorConfig, CONFIG_FILE};
use crate::crypto::load_or_generate;
use crate::server;
use crate::service::{LocalTarget, PublishedService, ServicePublisher};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

/// Run the serve loop until Ctrl-C
pub async fn run_serve(dir: &Path, args: &RunArgs) -> Result<()> {
    info!("tavern v{} starting", crate::VERSION);

    let config_path = args.config.clone().unwrap_or_else(|| dir.join(CONFIG_FILE));
    if !config_path.exists() {
        bail!("Missing {} file", CONFIG_FILE);
    }
    let config = config::load_from_path(&config_path)?;

    let public_dir = dir.join(&config.public_dir);
    if !public_dir.is_dir() {
        warn!("Public directory {} does not exist", public_dir.display());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (bound_tx, bound_rx) = oneshot::channel();
    let (target_tx, target_rx) = oneshot::channel();
    let mut server = tokio::spawn(server::serve(
        config.server.host.clone(),
        config.server.port,
        public_dir,
        bound_tx,
        shutdown_rx,
    ));

    // report the bound address, then hand it to the publisher
    let announce = async move {
        let addr = bound_rx.await.ok()?;
        println!("Local server: http://{}", addr);
        let _ = target_tx.send(addr);
        Some(addr)
    };

    let (bound, published) = match &config.tor {
        Some(tor) => {
            let target = LocalTarget::awaiting(config.server.host.clone(), target_rx);
            tokio::select! {
                (bound, published) = async { tokio::join!(announce, start_publication(dir, tor, target)) } => {
                    match published {
                        Ok(published) => (bound, published),
                        Err(e) => {
                            let _ = shutdown_tx.send(true);
                            server.await.context("Local server task failed")??;
                            return Err(e);
                        },
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    // dropping the publish future closes its control connection
                    info!("Interrupted during publication");
                    let _ = shutdown_tx.send(true);
                    server.await.context("Local server task failed")??;
                    return Ok(());
                },
            }
        },
        None => {
            info!("No tor section in config, serving locally only");
            (announce.await, None)
        },
    };

    if bound.is_none() {
        server.await.context("Local server task failed")??;
        bail!("Local server stopped before binding");
    }

    if let Some(service) = &published {
        println!("Hidden service: http://{}", service.onion_address());
    }

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            None
        },
        result = &mut server => Some(result),
    };

    if let Some(service) = published {
        service.shutdown().await;
    }

    match server_result {
        Some(result) => {
            result.context("Local server task failed")??;
            bail!("Local server stopped unexpectedly");
        },
        None => {
            let _ = shutdown_tx.send(true);
            server.await.context("Local server task failed")??;
        },
    }

    Ok(())
}

/// Load or create the identity and publish it
///
/// Key file errors are fatal; publication errors leave the site local-only.
async fn start_publication(
    dir: &Path,
    tor: &TorConfig,
    target: LocalTarget,
) -> Result<Option<PublishedService>> {
    let key_path = dir.join(&tor.private_key_file);
    let (identity, generated) = load_or_generate(&key_path, tor.key_type)
        .with_context(|| format!("Failed to load onion key {}", key_path.display()))?;
    if generated {
        info!("Generated new onion key at {}", key_path.display());
    }

    let publisher = ServicePublisher::new(tor.controller.clone(), tor.virtual_port);
    match publisher.publish(identity, target).await {
        Ok(service) => Ok(Some(service)),
        Err(e) => {
            error!("Hidden service not published: {}", e);
            if let Some(code) = e.control_error().and_then(|c| c.status_code()) {
                error!("Tor replied with status {}", code);
            }
            Ok(None)
        },
    }
}
