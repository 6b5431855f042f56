//! Local destination advertised to the daemon

use crate::error::PublishError;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tracing::debug;

/// Where the daemon should forward onion traffic
#[derive(Debug)]
pub struct LocalTarget {
    host: String,
    port: PortSource,
}

#[derive(Debug)]
enum PortSource {
    Fixed(u16),
    /// Listener reports its bound address once it is up
    Awaiting(oneshot::Receiver<SocketAddr>),
}

impl LocalTarget {
    /// A listener already bound to a known port
    pub fn fixed(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: PortSource::Fixed(port),
        }
    }

    /// A listener that will report its OS-assigned address on `bound`
    pub fn awaiting(host: impl Into<String>, bound: oneshot::Receiver<SocketAddr>) -> Self {
        Self {
            host: host.into(),
            port: PortSource::Awaiting(bound),
        }
    }

    /// Wait until a concrete, non-zero port is known
    pub async fn resolve(self) -> Result<(String, u16), PublishError> {
        let port = match self.port {
            PortSource::Fixed(0) => return Err(PublishError::UnresolvedPort),
            PortSource::Fixed(port) => port,
            PortSource::Awaiting(bound) => {
                debug!("Waiting for local listener to report its port");
                let addr = bound.await.map_err(|_| PublishError::ListenerUnavailable)?;
                if addr.port() == 0 {
                    return Err(PublishError::ListenerUnavailable);
                }
                addr.port()
            },
        };
        Ok((self.host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_port() {
        let target = LocalTarget::fixed("127.0.0.1", 8080);
        assert_eq!(target.resolve().await.unwrap(), ("127.0.0.1".to_string(), 8080));
    }

    #[tokio::test]
    async fn test_fixed_zero_is_unresolved() {
        let target = LocalTarget::fixed("127.0.0.1", 0);
        assert!(matches!(target.resolve().await, Err(PublishError::UnresolvedPort)));
    }

    #[tokio::test]
    async fn test_awaiting_uses_reported_port() {
        let (tx, rx) = oneshot::channel();
        let target = LocalTarget::awaiting("127.0.0.1", rx);

        let resolving = tokio::spawn(target.resolve());
        tx.send("127.0.0.1:43210".parse().unwrap()).unwrap();

        let (host, port) = resolving.await.unwrap().unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 43210);
    }

    #[tokio::test]
    async fn test_awaiting_listener_gone() {
        let (tx, rx) = oneshot::channel::<SocketAddr>();
        drop(tx);
        let target = LocalTarget::awaiting("127.0.0.1", rx);
        assert!(matches!(target.resolve().await, Err(PublishError::ListenerUnavailable)));
    }
}
