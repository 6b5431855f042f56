//! Onion command - key file tools

use super::{OnionAction, OnionArgs, OnionNewArgs, OnionShowArgs};
use crate::crypto::{keyfile, KeyType, OnionIdentity, DEFAULT_KEY_FILE};
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Run the onion command
pub fn run_onion(dir: &Path, args: &OnionArgs) -> Result<()> {
    match &args.action {
        OnionAction::New(args) => run_new(dir, args),
        OnionAction::Show(args) => run_show(dir, args),
    }
}

fn key_path(dir: &Path, key: Option<&PathBuf>) -> PathBuf {
    key.cloned().unwrap_or_else(|| dir.join(DEFAULT_KEY_FILE))
}

fn run_new(dir: &Path, args: &OnionNewArgs) -> Result<()> {
    generate_key_file(&key_path(dir, args.key.as_ref()), args.key_type, args.force)?;
    Ok(())
}

fn run_show(dir: &Path, args: &OnionShowArgs) -> Result<()> {
    let path = key_path(dir, args.key.as_ref());
    let identity =
        keyfile::load(&path).with_context(|| format!("Failed to load key file {}", path.display()))?;
    println!("{} ({})", identity.onion_address(), identity.key_type());
    Ok(())
}

/// Generate and save a key, asking before replacing an existing file
///
/// Returns `None` when the user kept the existing key.
pub(crate) fn generate_key_file(
    path: &Path,
    key_type: KeyType,
    force: bool,
) -> Result<Option<OnionIdentity>> {
    if path.exists() && !force {
        let prompt = format!("Overwrite existing {} file? (y/N): ", path.display());
        if !confirm(&prompt)? {
            println!("Keeping existing {}", path.display());
            return Ok(None);
        }
    }

    let identity = OnionIdentity::generate(key_type).context("Failed to generate key")?;
    keyfile::save(&identity, path)
        .with_context(|| format!("Failed to write key file {}", path.display()))?;

    println!("Generated: {}", identity.onion_address());
    Ok(Some(identity))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    read_confirmation(io::stdin().lock())
}

fn read_confirmation<R: BufRead>(mut input: R) -> Result<bool> {
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_confirmation() {
        assert!(read_confirmation(&b"y\n"[..]).unwrap());
        assert!(read_confirmation(&b"  YES \n"[..]).unwrap());
        assert!(!read_confirmation(&b"n\n"[..]).unwrap());
        assert!(!read_confirmation(&b"\n"[..]).unwrap());
        assert!(!read_confirmation(&b""[..]).unwrap());
    }

    #[test]
    fn test_generate_key_file_force_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_KEY_FILE);

        let first = generate_key_file(&path, KeyType::Ed25519V3, true)
            .unwrap()
            .unwrap();
        let second = generate_key_file(&path, KeyType::Ed25519V3, true)
            .unwrap()
            .unwrap();
        assert_ne!(first.service_id(), second.service_id());
        assert_eq!(
            keyfile::load(&path).unwrap().service_id(),
            second.service_id()
        );
    }

    #[test]
    fn test_key_path_default() {
        let dir = Path::new("/srv/site");
        assert_eq!(key_path(dir, None), PathBuf::from("/srv/site/onion.key"));
        let custom = PathBuf::from("/keys/alt.key");
        assert_eq!(key_path(dir, Some(&custom)), custom);
    }
}
