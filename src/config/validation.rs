//! Configuration validation
//!
//! Fail-fast validation of configuration invariants.

use super::{Config, ControllerConfig, TorConfig};
use anyhow::{bail, Result};

/// Validate configuration invariants
pub fn validate(config: &Config) -> Result<()> {
    if config.server.host.is_empty() {
        bail!("server.host cannot be empty");
    }
    if config.public_dir.as_os_str().is_empty() {
        bail!("public_dir cannot be empty");
    }
    if let Some(tor) = &config.tor {
        validate_tor(tor)?;
    }
    Ok(())
}

fn validate_tor(tor: &TorConfig) -> Result<()> {
    validate_controller(&tor.controller)?;

    if tor.private_key_file.as_os_str().is_empty() {
        bail!("tor.private_key_file cannot be empty");
    }
    if tor.virtual_port == 0 {
        bail!("tor.virtual_port cannot be 0");
    }

    Ok(())
}

fn validate_controller(controller: &ControllerConfig) -> Result<()> {
    if controller.host.is_empty() {
        bail!("tor.controller.host cannot be empty");
    }
    if controller.port == 0 {
        bail!("tor.controller.port cannot be 0");
    }
    if controller.timeout_secs == Some(0) {
        bail!("tor.controller.timeout_secs must be positive (use null to disable)");
    }
    if let Some(password) = &controller.password {
        if password.contains(['\r', '\n']) {
            bail!("tor.controller.password cannot contain line breaks");
        }
    }
    Ok(())
}
