//! Tor Control Port client
//!
//! Communicates with the local Tor daemon via the control protocol.
//!
//! The session is split by type: [`ControlConnection`] is a connected but
//! unauthenticated session and only offers PROTOCOLINFO and authentication;
//! [`ControlSession`] is authenticated and offers commands. Commands take
//! `&mut self`, so a second command cannot start while a reply is pending.

use super::auth::{self, AuthChallenge, AuthMethod, ProtocolInfo};
use super::reply::{encode_data_block, read_reply, Reply};
use crate::config::ControllerConfig;
use crate::crypto::{KeyType, OnionIdentity, ServiceId};
use crate::error::ControlError;
use crate::util::rand::random_bytes;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Lifecycle of a control session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticating,
    Authenticated,
    Closed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Connected, Authenticating)
                | (Authenticating, Authenticated)
                | (Disconnected | Connected | Authenticating | Authenticated, Closed)
        )
    }

    /// Guarded transition
    pub fn transition(self, next: SessionState) -> Result<SessionState, ControlError> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(ControlError::InvalidState {
                from: self,
                to: next,
            })
        }
    }

    /// States in which bytes may be exchanged with the daemon
    pub fn is_open(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Authenticating | SessionState::Authenticated
        )
    }
}

/// Owned transport plus the state it is in
struct Transport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    state: SessionState,
    in_flight: bool,
    timeout: Option<Duration>,
    peer: String,
}

impl Transport {
    async fn connect(config: &ControllerConfig) -> Result<Self, ControlError> {
        let addr = config.address();
        let timeout = config.timeout();
        debug!("Connecting to Tor control port: {}", addr);

        let stream = with_deadline(timeout, "connect", async {
            TcpStream::connect(&addr)
                .await
                .map_err(|e| ControlError::connection(format!("failed to connect to {}: {}", addr, e)))
        })
        .await?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let mut transport = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            state: SessionState::Disconnected,
            in_flight: false,
            timeout,
            peer: addr,
        };
        transport.advance(SessionState::Connected)?;
        Ok(transport)
    }

    fn advance(&mut self, next: SessionState) -> Result<(), ControlError> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    /// Write one framed command and read its reply
    ///
    /// `shown` is what gets logged in place of the wire text.
    async fn execute(&mut self, wire: &str, shown: &str) -> Result<Reply, ControlError> {
        if !self.state.is_open() {
            return Err(ControlError::Closed);
        }
        if self.in_flight {
            // an earlier exchange was abandoned mid-way; the stream is out of sync
            warn!("Control command started while another awaits its reply, closing session");
            self.close().await;
            return Err(ControlError::CommandInFlight);
        }

        debug!("Sending control command: {}", shown);
        self.in_flight = true;

        let timeout = self.timeout;
        let writer = &mut self.writer;
        let reader = &mut self.reader;
        let result = with_deadline(timeout, shown, async {
            writer
                .write_all(wire.as_bytes())
                .await
                .map_err(|e| ControlError::connection(format!("write failed: {}", e)))?;
            writer
                .flush()
                .await
                .map_err(|e| ControlError::connection(format!("flush failed: {}", e)))?;
            read_reply(reader).await
        })
        .await;

        match result {
            Ok(reply) => {
                self.in_flight = false;
                debug!("Reply {}: {}", reply.status, reply.message());
                Ok(reply)
            },
            Err(e) => {
                warn!("Control exchange with {} failed: {}", self.peer, e);
                self.close().await;
                Err(e)
            },
        }
    }

    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let _ = self.writer.shutdown().await;
        self.state = SessionState::Closed;
        self.in_flight = false;
        debug!("Control connection to {} closed", self.peer);
    }
}

/// Run `fut` under an optional deadline, mapping expiry to a connection error
async fn with_deadline<T, F>(timeout: Option<Duration>, what: &str, fut: F) -> Result<T, ControlError>
where
    F: Future<Output = Result<T, ControlError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            ControlError::connection(format!("timed out after {:?} during {}", limit, what))
        })?,
        None => fut.await,
    }
}

/// Frame a single-line command, refusing embedded line breaks
fn frame(line: &str) -> Result<String, ControlError> {
    if line.contains(['\r', '\n']) {
        return Err(ControlError::InvalidCommand(
            "command line contains a line break".to_string(),
        ));
    }
    Ok(format!("{}\r\n", line))
}

/// Connected, unauthenticated control session
pub struct ControlConnection {
    transport: Transport,
}

impl ControlConnection {
    /// Open the transport to the daemon's control endpoint
    pub async fn connect(config: &ControllerConfig) -> Result<Self, ControlError> {
        let transport = Transport::connect(config).await?;
        info!("Connected to Tor control port at {}", transport.peer);
        Ok(Self { transport })
    }

    pub fn state(&self) -> SessionState {
        self.transport.state
    }

    /// Ask the daemon which authentication methods it accepts
    ///
    /// The daemon answers this only once before authentication.
    pub async fn protocol_info(&mut self) -> Result<ProtocolInfo, ControlError> {
        let reply = self
            .transport
            .execute("PROTOCOLINFO 1\r\n", "PROTOCOLINFO 1")
            .await?
            .into_result()?;
        ProtocolInfo::from_reply(&reply)
    }

    /// Authenticate and upgrade to a [`ControlSession`]
    ///
    /// With a password, only password authentication is attempted. Without
    /// one, the methods advertised by PROTOCOLINFO are tried in the order
    /// SAFECOOKIE, COOKIE, NULL. An empty password counts as none. If the
    /// daemon fails to prove it knows the cookie, nothing else is tried. On
    /// failure the connection is closed.
    pub async fn authenticate(mut self, password: Option<&str>) -> Result<ControlSession, ControlError> {
        self.transport.advance(SessionState::Authenticating)?;

        let outcome = match password.filter(|p| !p.is_empty()) {
            Some(password) => self.authenticate_password(password).await.map(|()| None),
            None => self.authenticate_without_password().await.map(Some),
        };

        match outcome {
            Ok(protocol_info) => {
                self.transport.advance(SessionState::Authenticated)?;
                info!("Authenticated to Tor control port");
                Ok(ControlSession {
                    transport: self.transport,
                    protocol_info,
                })
            },
            Err(e) => {
                self.transport.close().await;
                Err(e)
            },
        }
    }

    async fn authenticate_password(&mut self, password: &str) -> Result<(), ControlError> {
        // hex form avoids quoting rules for arbitrary passwords
        let wire = format!("AUTHENTICATE {}\r\n", hex::encode(password.as_bytes()));
        let reply = self.transport.execute(&wire, "AUTHENTICATE <password>").await?;
        if reply.is_success() {
            debug!("Authenticated with password");
            Ok(())
        } else {
            Err(ControlError::AuthenticationFailure(format!(
                "password rejected ({}): {}",
                reply.status,
                reply.message()
            )))
        }
    }

    async fn authenticate_without_password(&mut self) -> Result<ProtocolInfo, ControlError> {
        let info = self.protocol_info().await?;
        let methods = info.cookie_then_null();
        if methods.is_empty() {
            return Err(ControlError::AuthenticationFailure(format!(
                "no usable method without a password (daemon offers {:?})",
                info.methods
            )));
        }

        let mut failures = Vec::new();
        for method in methods {
            match self.try_method(method, &info).await {
                Ok(()) => {
                    debug!("Authenticated with {:?}", method);
                    return Ok(info);
                },
                Err(MethodError::Failed(e)) => {
                    debug!("{:?} authentication failed: {}", method, e);
                    failures.push(format!("{:?}: {}", method, e));
                },
                Err(MethodError::Untrusted(e)) => {
                    warn!("Refusing to continue authentication: {}", e);
                    return Err(e);
                },
            }
        }

        Err(ControlError::AuthenticationFailure(failures.join("; ")))
    }

    async fn try_method(&mut self, method: AuthMethod, info: &ProtocolInfo) -> Result<(), MethodError> {
        let reply = match method {
            AuthMethod::Null => self.transport.execute("AUTHENTICATE\r\n", "AUTHENTICATE").await?,
            AuthMethod::Cookie => {
                let (path, cookie) = find_cookie(info)?;
                debug!("Using cookie from {:?}", path);
                let wire = format!("AUTHENTICATE {}\r\n", hex::encode(&cookie));
                self.transport.execute(&wire, "AUTHENTICATE <cookie>").await?
            },
            AuthMethod::SafeCookie => {
                let (path, cookie) = find_cookie(info)?;
                debug!("Using cookie from {:?} for SAFECOOKIE", path);
                let proof = self.safecookie_proof(&cookie).await?;
                let wire = format!("AUTHENTICATE {}\r\n", hex::encode(proof));
                self.transport.execute(&wire, "AUTHENTICATE <safecookie>").await?
            },
            AuthMethod::HashedPassword => {
                return Err(ControlError::AuthenticationFailure(
                    "password authentication requires a configured password".to_string(),
                )
                .into())
            },
        };

        if reply.is_success() {
            Ok(())
        } else {
            Err(ControlError::CommandRejected {
                code: reply.status,
                message: reply.message().to_string(),
            }
            .into())
        }
    }

    /// Run AUTHCHALLENGE and return the controller-to-server hash
    ///
    /// A server hash that does not verify means the peer does not hold our
    /// cookie, so the raw cookie must not be offered to it afterwards.
    async fn safecookie_proof(&mut self, cookie: &[u8]) -> Result<Vec<u8>, MethodError> {
        let client_nonce = random_bytes::<32>();
        let wire = format!("AUTHCHALLENGE SAFECOOKIE {}\r\n", hex::encode(client_nonce));
        let reply = self
            .transport
            .execute(&wire, "AUTHCHALLENGE SAFECOOKIE <nonce>")
            .await?
            .into_result()?;

        let challenge = AuthChallenge::from_reply(&reply)?;
        if !auth::verify_server_hash(
            cookie,
            &client_nonce,
            &challenge.server_nonce,
            &challenge.server_hash,
        ) {
            return Err(MethodError::Untrusted(ControlError::AuthenticationFailure(
                "daemon's SAFECOOKIE server hash does not match our cookie".to_string(),
            )));
        }

        Ok(auth::client_hash(cookie, &client_nonce, &challenge.server_nonce))
    }
}

/// Why one authentication method did not succeed
enum MethodError {
    /// The next advertised method may still be tried
    Failed(ControlError),
    /// The daemon failed the SAFECOOKIE check; stop authenticating
    Untrusted(ControlError),
}

impl From<ControlError> for MethodError {
    fn from(e: ControlError) -> Self {
        Self::Failed(e)
    }
}

fn find_cookie(info: &ProtocolInfo) -> Result<(PathBuf, Vec<u8>), ControlError> {
    let mut last_error = None;
    for path in info.cookie_candidates() {
        match auth::read_cookie(&path) {
            Ok(cookie) => return Ok((path, cookie)),
            Err(e) => last_error = Some(format!("{:?}: {}", path, e)),
        }
    }
    Err(ControlError::AuthenticationFailure(format!(
        "no readable cookie file ({})",
        last_error.unwrap_or_else(|| "no candidates".to_string())
    )))
}

/// Key to publish with `ADD_ONION`
#[derive(Debug, Clone, Copy)]
pub enum OnionKey<'a> {
    /// Use this identity's private key
    Existing(&'a OnionIdentity),
    /// Let the daemon generate a key of this type
    New(KeyType),
}

/// Virtual port on the onion side mapped to a local destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub virtual_port: u16,
    pub target_host: String,
    pub target_port: u16,
}

impl PortMapping {
    pub fn new(virtual_port: u16, target_host: impl Into<String>, target_port: u16) -> Self {
        Self {
            virtual_port,
            target_host: target_host.into(),
            target_port,
        }
    }
}

impl fmt::Display for PortMapping {
    /// `virt,host:port` as used in `Port=`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}:{}",
            self.virtual_port, self.target_host, self.target_port
        )
    }
}

/// Response from ADD_ONION command
#[derive(Debug)]
pub struct AddOnionResponse {
    /// The service ID (without .onion suffix)
    pub service_id: ServiceId,
    /// Key generated by the daemon, when one was requested
    pub private_key: Option<OnionIdentity>,
}

/// Authenticated control session
pub struct ControlSession {
    transport: Transport,
    protocol_info: Option<ProtocolInfo>,
}

impl ControlSession {
    pub fn state(&self) -> SessionState {
        self.transport.state
    }

    /// PROTOCOLINFO seen during authentication, if it was needed
    pub fn protocol_info(&self) -> Option<&ProtocolInfo> {
        self.protocol_info.as_ref()
    }

    /// Send one command line and return its successful reply
    pub async fn send_command(&mut self, line: &str) -> Result<Reply, ControlError> {
        let wire = frame(line)?;
        let keyword = line.split(' ').next().unwrap_or(line);
        self.transport.execute(&wire, keyword).await?.into_result()
    }

    /// Send a multi-line command: `+line`, the dot-stuffed body, then `.`
    pub async fn send_multiline(&mut self, line: &str, body: &str) -> Result<Reply, ControlError> {
        let head = frame(line)?;
        let wire = format!("+{}{}", head, encode_data_block(body));
        let keyword = line.split(' ').next().unwrap_or(line);
        self.transport
            .execute(&wire, &format!("+{} <{} byte body>", keyword, body.len()))
            .await?
            .into_result()
    }

    /// Get information about the Tor daemon
    pub async fn get_info(&mut self, keyword: &str) -> Result<String, ControlError> {
        let reply = self.send_command(&format!("GETINFO {}", keyword)).await?;
        reply
            .value(keyword)
            .ok_or_else(|| ControlError::protocol(format!("GETINFO reply missing {}", keyword)))
    }

    /// Register an onion service forwarding `ports` to local destinations
    ///
    /// For an existing key the daemon's ServiceID must match the locally
    /// derived one.
    pub async fn add_onion(
        &mut self,
        key: OnionKey<'_>,
        ports: &[PortMapping],
    ) -> Result<AddOnionResponse, ControlError> {
        if ports.is_empty() {
            return Err(ControlError::InvalidCommand(
                "ADD_ONION needs at least one port mapping".to_string(),
            ));
        }

        let (key_arg, key_shown) = match key {
            OnionKey::Existing(identity) => (
                identity.key_blob(),
                format!("{}:<redacted>", identity.key_type()),
            ),
            OnionKey::New(key_type) => {
                let arg = format!("NEW:{}", key_type.tag());
                (arg.clone(), arg)
            },
        };
        let port_args: String = ports.iter().map(|p| format!(" Port={}", p)).collect();

        let wire = frame(&format!("ADD_ONION {}{}", key_arg, port_args))?;
        info!(
            "Sending ADD_ONION for {}",
            ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let reply = self
            .transport
            .execute(&wire, &format!("ADD_ONION {}{}", key_shown, port_args))
            .await?
            .into_result()?;

        // Response format: "250-ServiceID=<address>" ... "250 OK"
        let reported = reply
            .value("ServiceID")
            .ok_or_else(|| ControlError::protocol("ADD_ONION response missing ServiceID"))?;
        let service_id = ServiceId::parse(&reported).map_err(|e| {
            ControlError::protocol(format!("daemon returned bad ServiceID {:?}: {}", reported, e))
        })?;

        let private_key = match key {
            OnionKey::Existing(identity) => {
                if identity.service_id() != &service_id {
                    return Err(ControlError::protocol(format!(
                        "daemon registered {} but the key derives {}",
                        service_id,
                        identity.service_id()
                    )));
                }
                None
            },
            OnionKey::New(_) => {
                let blob = reply
                    .value("PrivateKey")
                    .ok_or_else(|| ControlError::protocol("ADD_ONION response missing PrivateKey"))?;
                let identity = OnionIdentity::from_key_blob(&blob).map_err(|e| {
                    ControlError::protocol(format!("daemon returned unusable key: {}", e))
                })?;
                if identity.service_id() != &service_id {
                    return Err(ControlError::protocol(format!(
                        "daemon key derives {} but ServiceID is {}",
                        identity.service_id(),
                        service_id
                    )));
                }
                Some(identity)
            },
        };

        info!("Created hidden service: {}", service_id.onion_address());
        Ok(AddOnionResponse {
            service_id,
            private_key,
        })
    }

    /// Remove a previously created onion service
    pub async fn del_onion(&mut self, service_id: &ServiceId) -> Result<(), ControlError> {
        self.send_command(&format!("DEL_ONION {}", service_id)).await?;
        info!("Removed hidden service: {}", service_id);
        Ok(())
    }

    /// Best-effort removal; failures are logged and swallowed
    ///
    /// The daemon drops ephemeral services when the control connection
    /// closes, so a failure here leaves nothing behind.
    pub async fn remove_onion_service(&mut self, service_id: &ServiceId) {
        if let Err(e) = self.del_onion(service_id).await {
            warn!("Failed to remove hidden service {}: {}", service_id, e);
        }
    }

    /// Close the transport; calling again does nothing
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}
