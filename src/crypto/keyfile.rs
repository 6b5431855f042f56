//! Key file persistence
//!
//! A key file holds exactly one `TAG:base64` blob. Writes are atomic and
//! the file is private to the owner on unix.

use super::keys::{KeyType, OnionIdentity};
use crate::error::KeyError;
use crate::util::fs::atomic_write;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Default key file name in the working directory
pub const DEFAULT_KEY_FILE: &str = "onion.key";

/// Load an identity from a key file
pub fn load(path: &Path) -> Result<OnionIdentity, KeyError> {
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => KeyError::FileNotFound(path.to_path_buf()),
        ErrorKind::InvalidData => KeyError::MalformedKeyFile {
            path: path.to_path_buf(),
            reason: "key file is not valid UTF-8".to_string(),
        },
        _ => KeyError::FileIo {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let identity = OnionIdentity::from_key_blob(&contents).map_err(|e| match e {
        KeyError::MalformedKey(reason) => KeyError::MalformedKeyFile {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;

    debug!(
        "Loaded {} key for {} from {:?}",
        identity.key_type(),
        identity.service_id(),
        path
    );
    Ok(identity)
}

/// Atomically write an identity to a key file
pub fn save(identity: &OnionIdentity, path: &Path) -> Result<(), KeyError> {
    atomic_write(path, identity.key_blob().as_bytes(), true).map_err(|e| KeyError::FileIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Saved {} key to {:?}", identity.key_type(), path);
    Ok(())
}

/// Load the key file, generating and saving a fresh key if it is missing
///
/// Returns the identity and whether it was freshly generated. Malformed or
/// unreadable files are errors; only absence triggers generation.
pub fn load_or_generate(path: &Path, key_type: KeyType) -> Result<(OnionIdentity, bool), KeyError> {
    match load(path) {
        Ok(identity) => Ok((identity, false)),
        Err(KeyError::FileNotFound(_)) => {
            info!("No key file at {:?}, generating a new {} key", path, key_type);
            let identity = OnionIdentity::generate(key_type)?;
            save(&identity, path)?;
            Ok((identity, true))
        },
        Err(e) => Err(e),
    }
}
