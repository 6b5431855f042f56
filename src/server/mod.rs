//! Static file HTTP server
//!
//! Serves the public directory over HTTP/1.1 with tower-http's `ServeDir`.
//! Each connection runs in its own task; on shutdown the listener stops
//! accepting and open connections finish their in-flight request before
//! closing.

pub mod static_files;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Bound static file server
pub struct StaticServer {
    listener: TcpListener,
    root: PathBuf,
    files: ServeDir,
}

impl StaticServer {
    /// Bind `host:port`; port 0 picks an ephemeral port
    pub async fn bind(host: &str, port: u16, root: PathBuf) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind to {}:{}", host, port))?;

        Ok(Self {
            listener,
            files: static_files::public_dir(&root),
            root,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept connections until `shutdown` flips or its sender is dropped
    ///
    /// Returns after every open connection has drained.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Serving {:?} on http://{}", self.root, addr);

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Connection from {}", peer);
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            self.files.clone(),
                            shutdown.clone(),
                        ));
                    },
                    Err(e) => {
                        warn!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    },
                },
                _ = shutdown.changed() => break,
            }

            while connections.try_join_next().is_some() {}
        }

        drop(self.listener);
        if !connections.is_empty() {
            info!("Draining {} open connection(s)", connections.len());
        }
        while connections.join_next().await.is_some() {}

        info!("Local server on {} stopped", addr);
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    files: ServeDir,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = TowerToHyperService::new(files);

    let conn = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        },
    };

    if let Err(e) = result {
        debug!("Connection error from {}: {}", peer, e);
    }
}

/// Bind, report the bound address on `bound`, then serve until shutdown
///
/// Used when the publisher must learn an OS-assigned port before it can
/// register the onion service.
pub async fn serve(
    host: String,
    port: u16,
    root: PathBuf,
    bound: oneshot::Sender<SocketAddr>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let server = StaticServer::bind(&host, port, root).await?;
    let addr = server.local_addr()?;
    if bound.send(addr).is_err() {
        debug!("Nobody is waiting for the bound address {}", addr);
    }
    server.run(shutdown).await
}
