//! Read-only Nostr client that aggregates an author's long-form posts and
//! profile from several relays into a normalized feed.

pub mod adapter;
pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod identifier;
pub mod message;
pub mod subscription;
pub mod transport;

pub use adapter::{NormalizedFeed, NormalizedPost};
pub use client::RelayClient;
pub use config::Settings;
pub use error::FetchError;
pub use event::{ProfileMetadata, RawRecord};
pub use identifier::CanonicalAuthorKey;
