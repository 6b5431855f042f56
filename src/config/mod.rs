//! Configuration loading and validation
//!
//! Handles `tavern.json` parsing with strict validation.
//! No runtime mutation - configuration is immutable after load.

pub mod file;
mod validation;

pub use file::{load_from_path, write, CONFIG_FILE};
pub use validation::validate;

use crate::crypto::{KeyType, DEFAULT_KEY_FILE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Directory served over HTTP
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Onion publication; absent means serve locally only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tor: Option<TorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            public_dir: default_public_dir(),
            tor: Some(TorConfig::default()),
        }
    }
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

/// Local HTTP listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_local_host")]
    pub host: String,
    /// 0 binds an ephemeral port
    #[serde(default)]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
            port: 0,
        }
    }
}

/// Onion service publication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Key file, relative to the working directory
    #[serde(default = "default_key_file")]
    pub private_key_file: PathBuf,
    /// Type generated when the key file is missing
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
    /// Port clients use on the onion address
    #[serde(default = "default_virtual_port")]
    pub virtual_port: u16,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            private_key_file: default_key_file(),
            key_type: default_key_type(),
            virtual_port: default_virtual_port(),
        }
    }
}

fn default_key_file() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_FILE)
}
fn default_key_type() -> KeyType {
    KeyType::Ed25519V3
}
fn default_virtual_port() -> u16 {
    80
}

/// Tor control port connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// When set, only password authentication is attempted
    #[serde(default)]
    pub password: Option<String>,
    /// Deadline for connecting and for each command; null disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
}

impl ControllerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
            port: default_control_port(),
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    9051
}
fn default_timeout_secs() -> Option<u64> {
    Some(30)
}
