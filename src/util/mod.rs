//! Utility functions
//!
//! Pure helpers - randomization and file writes.

pub mod fs;
pub mod rand;
