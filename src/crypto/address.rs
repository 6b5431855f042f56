//! Onion service addresses
//!
//! A v3 address is `base32(pubkey || checksum || version)` where
//! `checksum = SHA3-256(".onion checksum" || pubkey || version)[..2]` and
//! `version = 0x03`. A legacy address is the base32 of the first 10 bytes of
//! SHA-1 over the DER-encoded RSA public key.

use data_encoding::BASE32_NOPAD;
use sha1::Sha1;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Suffix of every onion hostname
pub const ONION_SUFFIX: &str = ".onion";

/// Length of a v3 service id in base32 characters
pub const V3_ID_LEN: usize = 56;

/// Length of a legacy service id in base32 characters
pub const LEGACY_ID_LEN: usize = 16;

const CHECKSUM_PREFIX: &[u8] = b".onion checksum";
const V3_VERSION: u8 = 0x03;

/// Address parsing errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base32 encoding")]
    InvalidEncoding,

    #[error("invalid service id length: {0} (expected 16 or 56)")]
    InvalidLength(usize),

    #[error("unsupported onion address version: {0}")]
    InvalidVersion(u8),

    #[error("onion address checksum mismatch")]
    ChecksumMismatch,
}

/// Service id: the onion hostname without the `.onion` suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId(String);

impl ServiceId {
    /// Derive a v3 service id from an Ed25519 public key
    pub fn from_ed25519_public(pubkey: &[u8; 32]) -> Self {
        let checksum = v3_checksum(pubkey);

        let mut addr_bytes = [0u8; 35];
        addr_bytes[..32].copy_from_slice(pubkey);
        addr_bytes[32..34].copy_from_slice(&checksum);
        addr_bytes[34] = V3_VERSION;

        Self(BASE32_NOPAD.encode(&addr_bytes).to_ascii_lowercase())
    }

    /// Derive a legacy service id from a PKCS#1 DER encoded RSA public key
    pub fn from_rsa_public_der(der: &[u8]) -> Self {
        let digest = Sha1::digest(der);
        Self(BASE32_NOPAD.encode(&digest[..10]).to_ascii_lowercase())
    }

    /// Parse a service id, with or without the `.onion` suffix
    ///
    /// v3 ids are checked for version and checksum.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let id = s.trim().to_ascii_lowercase();
        let id = id.strip_suffix(ONION_SUFFIX).unwrap_or(&id);

        let decoded = BASE32_NOPAD
            .decode(id.to_ascii_uppercase().as_bytes())
            .map_err(|_| AddressError::InvalidEncoding)?;

        match id.len() {
            V3_ID_LEN => {
                let pubkey: [u8; 32] = decoded[..32]
                    .try_into()
                    .map_err(|_| AddressError::InvalidLength(id.len()))?;
                if decoded[34] != V3_VERSION {
                    return Err(AddressError::InvalidVersion(decoded[34]));
                }
                if decoded[32..34] != v3_checksum(&pubkey) {
                    return Err(AddressError::ChecksumMismatch);
                }
            },
            LEGACY_ID_LEN => {},
            other => return Err(AddressError::InvalidLength(other)),
        }

        Ok(Self(id.to_string()))
    }

    /// The bare service id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<id>.onion`
    pub fn onion_address(&self) -> String {
        format!("{}{}", self.0, ONION_SUFFIX)
    }

    /// True for 56-character v3 ids
    pub fn is_v3(&self) -> bool {
        self.0.len() == V3_ID_LEN
    }

    /// Public key embedded in a v3 id
    pub fn ed25519_public_key(&self) -> Option<[u8; 32]> {
        if !self.is_v3() {
            return None;
        }
        let decoded = BASE32_NOPAD
            .decode(self.0.to_ascii_uppercase().as_bytes())
            .ok()?;
        decoded[..32].try_into().ok()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn v3_checksum(pubkey: &[u8; 32]) -> [u8; 2] {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(pubkey);
    hasher.update([V3_VERSION]);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}
