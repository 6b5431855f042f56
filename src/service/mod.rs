//! Onion service publication
//!
//! Ties an identity, an authenticated control session and the local
//! listener's address into one published service. The returned
//! [`PublishedService`] owns all three; dropping it closes the session and
//! the daemon forgets the ephemeral service.

pub mod publisher;
pub mod target;

pub use publisher::{PublishedService, ServicePublisher};
pub use target::LocalTarget;
