//! Tor daemon interaction
//!
//! Handles Tor ControlPort communication: reply framing, authentication and
//! the onion service commands. Tor is treated as a black box.

pub mod auth;
pub mod control;
pub mod reply;

pub use auth::{AuthMethod, ProtocolInfo};
pub use control::{
    AddOnionResponse, ControlConnection, ControlSession, OnionKey, PortMapping, SessionState,
};
pub use reply::{Reply, StatusClass};
