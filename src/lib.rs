//! tavern library crate
//!
//! Publishes a static site as a Tor onion service.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface (init, run, onion, version)
//! - [`config`] - Configuration loading and validation
//! - [`crypto`] - Onion identities, service ids and key files
//! - [`tor`] - Tor control port session and replies
//! - [`service`] - Onion service publication
//! - [`server`] - Static file HTTP server
//! - [`error`] - Error types for the library layers
//! - [`util`] - Atomic file writes, randomization

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)] // Format string style preference
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod server;
pub mod service;
pub mod tor;
pub mod util;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
