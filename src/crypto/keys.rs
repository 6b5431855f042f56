//! Onion service identity keys
//!
//! Two key types are supported, matching the daemon's `ADD_ONION` tags:
//! `ED25519-V3` (64-byte expanded secret key) and `RSA1024` (PKCS#1 DER).
//! The textual form of a key is `TAG:base64`, used both on disk and on the
//! control port.

use super::address::ServiceId;
use crate::error::KeyError;
use crate::util::rand::os_random_bytes;
use base64::{engine::general_purpose::STANDARD, Engine};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Modulus size of legacy keys
pub const RSA_KEY_BITS: usize = 1024;

/// Key algorithm of an onion identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "ED25519-V3", alias = "ed25519")]
    Ed25519V3,
    #[serde(rename = "RSA1024", alias = "rsa")]
    Rsa1024,
}

impl KeyType {
    /// Tag used in key blobs and `ADD_ONION`
    pub fn tag(self) -> &'static str {
        match self {
            Self::Ed25519V3 => "ED25519-V3",
            Self::Rsa1024 => "RSA1024",
        }
    }

    /// Strict lookup of a blob tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ED25519-V3" => Some(Self::Ed25519V3),
            "RSA1024" => Some(Self::Rsa1024),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for KeyType {
    type Err = String;

    /// Accepts the blob tags plus the short names `ed25519` and `rsa`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" | "ed25519-v3" => Ok(Self::Ed25519V3),
            "rsa" | "rsa1024" => Ok(Self::Rsa1024),
            other => Err(format!("invalid key type: {} (use ed25519 or rsa)", other)),
        }
    }
}

enum KeyMaterial {
    Ed25519V3 {
        /// Clamped scalar followed by the signing prefix
        expanded: [u8; 64],
        public: [u8; 32],
    },
    Rsa1024 {
        key: RsaPrivateKey,
        private_der: Vec<u8>,
        public_der: Vec<u8>,
    },
}

/// Long-term key of one onion service plus its cached address
pub struct OnionIdentity {
    material: KeyMaterial,
    service_id: OnceLock<ServiceId>,
}

impl OnionIdentity {
    /// Generate a fresh key
    pub fn generate(key_type: KeyType) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519V3 => {
                let seed = os_random_bytes::<32>()
                    .map_err(|e| KeyError::Generation(format!("entropy source: {}", e)))?;
                Ok(Self::from_seed(&seed))
            },
            KeyType::Rsa1024 => {
                let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                Self::from_rsa(key)
            },
        }
    }

    /// Expand a 32-byte Ed25519 seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let public = SigningKey::from_bytes(seed).verifying_key().to_bytes();

        let digest = Sha512::digest(seed);
        let mut expanded = [0u8; 64];
        expanded.copy_from_slice(&digest);
        clamp(&mut expanded);

        Self::new(KeyMaterial::Ed25519V3 { expanded, public })
    }

    /// Wrap an already expanded Ed25519 secret key
    ///
    /// The public key is recomputed as `a * B` from the scalar half.
    pub fn from_expanded(expanded: [u8; 64]) -> Self {
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&expanded[..32]);
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 63;
        scalar_bytes[31] |= 64;

        let scalar = Scalar::from_bytes_mod_order(scalar_bytes);
        let public = (&scalar * ED25519_BASEPOINT_TABLE).compress().to_bytes();

        Self::new(KeyMaterial::Ed25519V3 { expanded, public })
    }

    /// Wrap an RSA private key
    pub fn from_rsa(key: RsaPrivateKey) -> Result<Self, KeyError> {
        if key.size() * 8 != RSA_KEY_BITS {
            return Err(KeyError::malformed(format!(
                "RSA key must be {} bits, got {}",
                RSA_KEY_BITS,
                key.size() * 8
            )));
        }

        let private_der = key
            .to_pkcs1_der()
            .map_err(|e| KeyError::malformed(format!("cannot encode RSA key: {}", e)))?
            .as_bytes()
            .to_vec();
        let public_der = key
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| KeyError::malformed(format!("cannot encode RSA public key: {}", e)))?
            .as_bytes()
            .to_vec();

        Ok(Self::new(KeyMaterial::Rsa1024 {
            key,
            private_der,
            public_der,
        }))
    }

    /// Parse a `TAG:base64` key blob
    pub fn from_key_blob(blob: &str) -> Result<Self, KeyError> {
        let (tag, data) = blob
            .trim()
            .split_once(':')
            .ok_or_else(|| KeyError::malformed("missing ':' between key type and key data"))?;

        let key_type = KeyType::from_tag(tag)
            .ok_or_else(|| KeyError::malformed(format!("unrecognized key type: {:?}", tag)))?;

        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| KeyError::malformed(format!("invalid base64 key data: {}", e)))?;

        match key_type {
            KeyType::Ed25519V3 => {
                let expanded: [u8; 64] = bytes.try_into().map_err(|b: Vec<u8>| {
                    KeyError::malformed(format!(
                        "ED25519-V3 key must be 64 bytes, got {}",
                        b.len()
                    ))
                })?;
                Ok(Self::from_expanded(expanded))
            },
            KeyType::Rsa1024 => {
                let key = RsaPrivateKey::from_pkcs1_der(&bytes)
                    .map_err(|e| KeyError::malformed(format!("invalid RSA1024 key: {}", e)))?;
                Self::from_rsa(key)
            },
        }
    }

    fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            service_id: OnceLock::new(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::Ed25519V3 { .. } => KeyType::Ed25519V3,
            KeyMaterial::Rsa1024 { .. } => KeyType::Rsa1024,
        }
    }

    /// `TAG:base64` form of the private key
    pub fn key_blob(&self) -> String {
        let data = match &self.material {
            KeyMaterial::Ed25519V3 { expanded, .. } => STANDARD.encode(expanded),
            KeyMaterial::Rsa1024 { private_der, .. } => STANDARD.encode(private_der),
        };
        format!("{}:{}", self.key_type().tag(), data)
    }

    /// Service id derived from the public key, computed once
    pub fn service_id(&self) -> &ServiceId {
        self.service_id.get_or_init(|| match &self.material {
            KeyMaterial::Ed25519V3 { public, .. } => ServiceId::from_ed25519_public(public),
            KeyMaterial::Rsa1024 { public_der, .. } => ServiceId::from_rsa_public_der(public_der),
        })
    }

    /// `<service id>.onion`
    pub fn onion_address(&self) -> String {
        self.service_id().onion_address()
    }

    /// Ed25519 public key, for v3 identities
    pub fn ed25519_public_key(&self) -> Option<[u8; 32]> {
        match &self.material {
            KeyMaterial::Ed25519V3 { public, .. } => Some(*public),
            KeyMaterial::Rsa1024 { .. } => None,
        }
    }

    /// RSA modulus, big-endian, for legacy identities
    pub fn rsa_modulus(&self) -> Option<Vec<u8>> {
        match &self.material {
            KeyMaterial::Rsa1024 { key, .. } => Some(key.n().to_bytes_be()),
            KeyMaterial::Ed25519V3 { .. } => None,
        }
    }
}

impl fmt::Debug for OnionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnionIdentity")
            .field("key_type", &self.key_type())
            .field("service_id", self.service_id())
            .finish_non_exhaustive()
    }
}

fn clamp(expanded: &mut [u8; 64]) {
    expanded[0] &= 248;
    expanded[31] &= 63;
    expanded[31] |= 64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{BigUint, RsaPublicKey};

    // RFC 8032 test 1
    const RFC_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const RFC_PUBKEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
    const RFC_ID: &str = "25njqamcweflpvkl73j4szahhihoc4xt3ktcgjnpaingr5yhkenl5sid";
    const RFC_BLOB: &str = "ED25519-V3:MHyDhk8oM8tCei7xwAoBPP3/J2jZgMCjpSDwBpBN6U+bTwr+KAt0aneGhOdUQlAgV7dHOgPwj5b1o46Sh+Afjw==";

    const RSA_BLOB: &str = "RSA1024:MIICWwIBAAKBgQCv7uIWAf9f3sNdmHUFX9INzc6PsYqjmfR/LO0L/m6RK94ysyD9EslC/Hs9mTYa2wpvj/pEBfqdi8qABJo80KmG2bg5BhIT/dRj48FoLpcLVb4psPG8CuGe5nMLm5Qvp3Uwouvsc2wrMmRffQJBAWF16QN2AHuInTTAjshjBv/7rwIDAQABAoGAGsZqVhsbuIV4iigHtzesCjnGNAw7I0bs9OXrdaXVQfbBLEoivSE8zBsMzoUgvNmVLwFkfzHBwHRj7zPEHXlMM18EJHrTH+XFbB1cVDKB0wBNO8xwNkRiXepPAar22/FrCpvQnrOUShftuIv9+Elwo44mnS/3l8uod/GzuJfAIeECQQDfgQHcMtdlm/0dqWI8vi0P2emKIIXTRdr3ADDgAJCsEZ8S1/7FPK4cSNkgCFFR+1UaOW1PrDUg6gDNtgytVptnAkEAyYNA1zw8AceFqA1olg/2MPEHsXf54pV+uHJknXtRJ0D4GudBTCobZKcJeepFvDVjHD8+x/4Y1KFOtqjW5x44eQJANAx5AGyemL0Q3v15MSggmlZm+pHEWIUmDutudlvrVQbtgpfmbsxIx7F3Tuxg87SSBv9ko285GCcmdMF2hk9q9QJASouXjQfnWvEobIapTfoRpQFFS02Kz1tmSW1n8yoPV2odXjZ2XWqmP5HbW5JiwcEuLODopKtHHEGgEMpc1ZrEYQJAVOz5ECKN1e1XE2WXYIaTW7nAeTtJ9z2q43QNv1fJYSSbKxTdpcg4a0DKHBmbzx6beE6MtDNS4T1ElMLmp6hvqQ==";
    const RSA_MODULUS: &str = "afeee21601ff5fdec35d9875055fd20dcdce8fb18aa399f47f2ced0bfe6e912bde32b320fd12c942fc7b3d99361adb0a6f8ffa4405fa9d8bca80049a3cd0a986d9b839061213fdd463e3c1682e970b55be29b0f1bc0ae19ee6730b9b942fa77530a2ebec736c2b32645f7d0241016175e90376007b889d34c08ec86306fffbaf";
    const RSA_ID: &str = "tspgzz2tccxw37t4";

    fn rfc_seed() -> [u8; 32] {
        hex::decode(RFC_SEED).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_seed_golden_vector() {
        let identity = OnionIdentity::from_seed(&rfc_seed());
        assert_eq!(hex::encode(identity.ed25519_public_key().unwrap()), RFC_PUBKEY);
        assert_eq!(identity.service_id().as_str(), RFC_ID);
        assert_eq!(identity.key_blob(), RFC_BLOB);
    }

    #[test]
    fn test_expanded_key_recovers_public_key() {
        let identity = OnionIdentity::from_key_blob(RFC_BLOB).unwrap();
        assert_eq!(identity.key_type(), KeyType::Ed25519V3);
        assert_eq!(hex::encode(identity.ed25519_public_key().unwrap()), RFC_PUBKEY);
        assert_eq!(identity.service_id().as_str(), RFC_ID);
    }

    #[test]
    fn test_generated_ed25519_address_shape() {
        for _ in 0..8 {
            let identity = OnionIdentity::generate(KeyType::Ed25519V3).unwrap();
            let first = identity.onion_address();
            let id = identity.service_id().as_str();

            assert_eq!(id.len(), 56);
            assert!(id.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')));
            assert!(first.ends_with(".onion"));
            assert_eq!(identity.onion_address(), first, "address must be stable");

            let reloaded = OnionIdentity::from_key_blob(&identity.key_blob()).unwrap();
            assert_eq!(reloaded.service_id(), identity.service_id());
        }
    }

    #[test]
    fn test_rsa_blob_golden_vector() {
        let identity = OnionIdentity::from_key_blob(RSA_BLOB).unwrap();
        assert_eq!(identity.key_type(), KeyType::Rsa1024);
        assert_eq!(identity.service_id().as_str(), RSA_ID);
        assert_eq!(hex::encode(identity.rsa_modulus().unwrap()), RSA_MODULUS);
    }

    #[test]
    fn test_rsa_modulus_golden_vector() {
        let n = BigUint::from_bytes_be(&hex::decode(RSA_MODULUS).unwrap());
        let public = RsaPublicKey::new(n, BigUint::from(65537u32)).unwrap();
        let der = public.to_pkcs1_der().unwrap();
        assert_eq!(ServiceId::from_rsa_public_der(der.as_bytes()).as_str(), RSA_ID);
    }

    #[test]
    fn test_generated_rsa_identity() {
        let identity = OnionIdentity::generate(KeyType::Rsa1024).unwrap();
        assert_eq!(identity.service_id().as_str().len(), 16);
        assert_eq!(identity.rsa_modulus().unwrap().len(), 128);

        let reloaded = OnionIdentity::from_key_blob(&identity.key_blob()).unwrap();
        assert_eq!(reloaded.service_id(), identity.service_id());
    }

    #[test]
    fn test_malformed_blobs() {
        for blob in [
            "no separator",
            "ED25519:AAAA",
            "ED25519-V3:not base64!",
            "ED25519-V3:AAAA",
            "RSA1024:AAAA",
        ] {
            assert!(
                matches!(OnionIdentity::from_key_blob(blob), Err(KeyError::MalformedKey(_))),
                "blob {:?} should be rejected",
                blob
            );
        }
    }

    #[test]
    fn test_key_type_parsing() {
        assert_eq!("ed25519".parse::<KeyType>(), Ok(KeyType::Ed25519V3));
        assert_eq!("RSA".parse::<KeyType>(), Ok(KeyType::Rsa1024));
        assert_eq!("ED25519-V3".parse::<KeyType>(), Ok(KeyType::Ed25519V3));
        assert!("dsa".parse::<KeyType>().is_err());
        assert_eq!(KeyType::from_tag("ed25519"), None);
    }

    #[test]
    fn test_debug_hides_key_material() {
        let identity = OnionIdentity::from_seed(&rfc_seed());
        let debug = format!("{:?}", identity);
        assert!(debug.contains(RFC_ID));
        assert!(!debug.contains("MHyDhk8o"));
    }
}
