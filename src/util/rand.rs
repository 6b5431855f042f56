//! Randomization utilities

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate random bytes from the thread-local generator
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; N];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Generate random bytes straight from the OS entropy source
///
/// Used for long-term key material, where an entropy failure must surface
/// as an error rather than a panic.
pub fn os_random_bytes<const N: usize>() -> Result<[u8; N], rand::Error> {
    let mut bytes = [0u8; N];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes)
}
