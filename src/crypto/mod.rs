//! Onion service identities
//!
//! Key generation, address derivation and key file persistence.
//! Pure computation plus local file I/O - no network access here.

pub mod address;
pub mod keyfile;
pub mod keys;

pub use address::{AddressError, ServiceId, ONION_SUFFIX};
pub use keyfile::{load_or_generate, DEFAULT_KEY_FILE};
pub use keys::{KeyType, OnionIdentity};
