//! Control-port authentication helpers
//!
//! PROTOCOLINFO parsing, SAFECOOKIE challenge hashes, and the order in which
//! methods are attempted.

use super::reply::{parse_key_values, Reply};
use crate::error::ControlError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::PathBuf;

type HmacSha256 = Hmac<Sha256>;

const SERVER_TO_CONTROLLER_KEY: &[u8] = b"Tor safe cookie authentication server-to-controller hash";
const CONTROLLER_TO_SERVER_KEY: &[u8] = b"Tor safe cookie authentication controller-to-server hash";

/// Expected cookie length in bytes
pub const COOKIE_LEN: usize = 32;

/// Common cookie file locations, used when the daemon does not report one
pub const COOKIE_PATHS: &[&str] = &[
    "/run/tor/control.authcookie",
    "/var/run/tor/control.authcookie",
    "/var/lib/tor/control_auth_cookie",
];

/// Authentication methods a daemon may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Null,
    HashedPassword,
    Cookie,
    SafeCookie,
}

impl AuthMethod {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "NULL" => Some(Self::Null),
            "HASHEDPASSWORD" => Some(Self::HashedPassword),
            "COOKIE" => Some(Self::Cookie),
            "SAFECOOKIE" => Some(Self::SafeCookie),
            _ => None,
        }
    }
}

/// Parsed PROTOCOLINFO reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub methods: Vec<AuthMethod>,
    pub cookie_file: Option<PathBuf>,
    pub tor_version: Option<String>,
}

impl ProtocolInfo {
    pub fn from_reply(reply: &Reply) -> Result<Self, ControlError> {
        let mut info = ProtocolInfo::default();
        let mut saw_auth = false;

        for line in &reply.lines {
            if let Some(rest) = line.text.strip_prefix("AUTH ") {
                saw_auth = true;
                for (key, value) in parse_key_values(rest) {
                    match key.as_str() {
                        "METHODS" => {
                            info.methods =
                                value.split(',').filter_map(AuthMethod::from_name).collect();
                        },
                        "COOKIEFILE" => info.cookie_file = Some(PathBuf::from(value)),
                        _ => {},
                    }
                }
            } else if let Some(rest) = line.text.strip_prefix("VERSION ") {
                info.tor_version = parse_key_values(rest)
                    .into_iter()
                    .find(|(k, _)| k == "Tor")
                    .map(|(_, v)| v);
            }
        }

        if !saw_auth {
            return Err(ControlError::protocol("PROTOCOLINFO reply has no AUTH line"));
        }
        Ok(info)
    }

    pub fn supports(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Methods to try without a password, strongest first
    ///
    /// NULL is only attempted when the daemon advertises it.
    pub fn cookie_then_null(&self) -> Vec<AuthMethod> {
        [AuthMethod::SafeCookie, AuthMethod::Cookie, AuthMethod::Null]
            .into_iter()
            .filter(|m| self.supports(*m))
            .collect()
    }

    /// Cookie file candidates: the reported path first, then the usual spots
    pub fn cookie_candidates(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.cookie_file.iter().cloned().collect();
        for path in COOKIE_PATHS {
            let path = PathBuf::from(path);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

/// Read a cookie file and check its length
pub fn read_cookie(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let cookie = std::fs::read(path)?;
    if cookie.len() != COOKIE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("cookie is {} bytes, expected {}", cookie.len(), COOKIE_LEN),
        ));
    }
    Ok(cookie)
}

fn safecookie_hmac(key: &[u8], cookie: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    // new_from_slice accepts keys of any length for HMAC
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(cookie);
    mac.update(client_nonce);
    mac.update(server_nonce);
    mac.finalize().into_bytes().to_vec()
}

/// Hash the daemon must present in its AUTHCHALLENGE reply
pub fn server_hash(cookie: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    safecookie_hmac(SERVER_TO_CONTROLLER_KEY, cookie, client_nonce, server_nonce)
}

/// Hash the controller sends in AUTHENTICATE
pub fn client_hash(cookie: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    safecookie_hmac(CONTROLLER_TO_SERVER_KEY, cookie, client_nonce, server_nonce)
}

/// Verify a server hash in constant time
pub fn verify_server_hash(
    cookie: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
    presented: &[u8],
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(SERVER_TO_CONTROLLER_KEY) else {
        return false;
    };
    mac.update(cookie);
    mac.update(client_nonce);
    mac.update(server_nonce);
    mac.verify_slice(presented).is_ok()
}

/// Parsed `250 AUTHCHALLENGE SERVERHASH=... SERVERNONCE=...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub server_hash: Vec<u8>,
    pub server_nonce: Vec<u8>,
}

impl AuthChallenge {
    pub fn from_reply(reply: &Reply) -> Result<Self, ControlError> {
        let text = reply
            .lines
            .iter()
            .find_map(|l| l.text.strip_prefix("AUTHCHALLENGE "))
            .ok_or_else(|| ControlError::protocol("missing AUTHCHALLENGE line"))?;

        let mut server_hash = None;
        let mut server_nonce = None;
        for (key, value) in parse_key_values(text) {
            match key.as_str() {
                "SERVERHASH" => server_hash = hex::decode(&value).ok(),
                "SERVERNONCE" => server_nonce = hex::decode(&value).ok(),
                _ => {},
            }
        }

        Ok(Self {
            server_hash: server_hash
                .ok_or_else(|| ControlError::protocol("AUTHCHALLENGE missing SERVERHASH"))?,
            server_nonce: server_nonce
                .ok_or_else(|| ControlError::protocol("AUTHCHALLENGE missing SERVERNONCE"))?,
        })
    }
}
