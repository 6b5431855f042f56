//! Publication manager
//!
//! connect -> authenticate -> resolve local port -> ADD_ONION, in that
//! order. The first failure is returned tagged with its step, and the
//! control session is closed before returning.

use super::target::LocalTarget;
use crate::config::ControllerConfig;
use crate::crypto::{OnionIdentity, ServiceId};
use crate::error::{PublishError, PublishStep};
use crate::tor::{ControlConnection, ControlSession, OnionKey, PortMapping, SessionState};
use tracing::{debug, info};

/// Publishes identities through one control endpoint
#[derive(Debug, Clone)]
pub struct ServicePublisher {
    controller: ControllerConfig,
    virtual_port: u16,
}

impl ServicePublisher {
    pub fn new(controller: ControllerConfig, virtual_port: u16) -> Self {
        Self {
            controller,
            virtual_port,
        }
    }

    /// Publish `identity` forwarding the virtual port to `target`
    ///
    /// Takes the identity by value: while the returned service lives, the
    /// identity cannot be published again.
    pub async fn publish(
        &self,
        identity: OnionIdentity,
        target: LocalTarget,
    ) -> Result<PublishedService, PublishError> {
        debug!(
            "Publishing {} via {}",
            identity.onion_address(),
            self.controller.address()
        );

        let connection = ControlConnection::connect(&self.controller)
            .await
            .map_err(PublishError::at(PublishStep::Connect))?;

        // authenticate closes the transport itself on failure
        let mut session = connection
            .authenticate(self.controller.password.as_deref())
            .await
            .map_err(PublishError::at(PublishStep::Authenticate))?;

        let (host, port) = match target.resolve().await {
            Ok(resolved) => resolved,
            Err(e) => {
                session.close().await;
                return Err(e);
            },
        };

        let mapping = PortMapping::new(self.virtual_port, host, port);
        let response = match session
            .add_onion(OnionKey::Existing(&identity), std::slice::from_ref(&mapping))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                session.close().await;
                return Err(PublishError::at(PublishStep::AddOnion)(e));
            },
        };

        info!(
            "Hidden service {} forwarding port {} to {}:{}",
            response.service_id.onion_address(),
            mapping.virtual_port,
            mapping.target_host,
            mapping.target_port
        );

        Ok(PublishedService {
            identity,
            session,
            service_id: response.service_id,
            mapping,
        })
    }
}

/// A live publication; owns its identity and control session
pub struct PublishedService {
    identity: OnionIdentity,
    session: ControlSession,
    service_id: ServiceId,
    mapping: PortMapping,
}

impl PublishedService {
    /// Daemon-confirmed service id
    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    /// `<id>.onion`
    pub fn onion_address(&self) -> String {
        self.service_id.onion_address()
    }

    pub fn identity(&self) -> &OnionIdentity {
        &self.identity
    }

    pub fn port_mapping(&self) -> &PortMapping {
        &self.mapping
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Best-effort DEL_ONION, then close the session
    ///
    /// Hands the identity back so it can be published again.
    pub async fn shutdown(mut self) -> OnionIdentity {
        info!("Removing hidden service {}", self.service_id.onion_address());
        self.session.remove_onion_service(&self.service_id).await;
        self.session.close().await;
        self.identity
    }
}

impl std::fmt::Debug for PublishedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedService")
            .field("service_id", &self.service_id)
            .field("mapping", &self.mapping)
            .field("session", &self.session.state())
            .finish()
    }
}
