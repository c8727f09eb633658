//! Caller-facing fetch operations.

use std::time::Duration;

use tracing::{info, warn};

use crate::{
    adapter::{self, NormalizedFeed},
    aggregator::Aggregator,
    config::Settings,
    error::FetchError,
    event::{ProfileMetadata, KIND_LONG_FORM, KIND_METADATA},
    identifier::{AuthorIdentifier, CanonicalAuthorKey},
    message::RecordFilter,
    transport::{Connector, RelayEndpoint, WsConnector},
};

/// Default host for feed links.
pub const DEFAULT_GATEWAY_HOST: &str = "njump.me";

/// Fetches author content and profiles from a fixed set of relays.
pub struct RelayClient<C = WsConnector> {
    aggregator: Aggregator<C>,
    content_limit: Option<u32>,
    gateway_host: String,
}

impl RelayClient<WsConnector> {
    /// Build a WebSocket-backed client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        RelayClient::new(WsConnector::new(settings.transport()), settings.relays.clone())
            .with_relay_timeout(settings.relay_timeout)
            .with_content_limit(settings.content_limit)
            .with_gateway_host(&settings.gateway_host)
    }
}

impl<C: Connector> RelayClient<C> {
    pub fn new(connector: C, relays: Vec<RelayEndpoint>) -> Self {
        Self {
            aggregator: Aggregator::new(connector, relays),
            content_limit: None,
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
        }
    }

    pub fn with_relay_timeout(mut self, relay_timeout: Duration) -> Self {
        self.aggregator = self.aggregator.with_relay_timeout(relay_timeout);
        self
    }

    pub fn with_content_limit(mut self, limit: Option<u32>) -> Self {
        self.content_limit = limit;
        self
    }

    pub fn with_gateway_host(mut self, host: &str) -> Self {
        self.gateway_host = host.to_string();
        self
    }

    /// Fetch an author's long-form posts as a feed.
    ///
    /// The profile is only queried once at least one post was found.
    pub async fn fetch_content(&self, identifier: &str) -> Result<NormalizedFeed, FetchError> {
        let author = resolve(identifier)?;
        info!(%author, relays = self.aggregator.relays().len(), "fetching long-form content");
        let filter = RecordFilter::new(KIND_LONG_FORM)
            .author(author)
            .limit(self.content_limit);
        let records = self.aggregator.collect_content(&filter).await?;
        info!(%author, posts = records.len(), "content collected");
        let profile = self.query_profile(author).await;
        Ok(adapter::to_feed(&author, &profile, &records, &self.gateway_host))
    }

    /// Fetch an author's newest profile metadata.
    ///
    /// An author without any profile record yields empty metadata.
    pub async fn fetch_profile(&self, identifier: &str) -> Result<ProfileMetadata, FetchError> {
        let author = resolve(identifier)?;
        Ok(self.query_profile(author).await)
    }

    async fn query_profile(&self, author: CanonicalAuthorKey) -> ProfileMetadata {
        info!(%author, "fetching profile");
        let filter = RecordFilter::new(KIND_METADATA).author(author);
        let Some(record) = self.aggregator.select_latest(&filter).await else {
            info!(%author, "no profile found");
            return ProfileMetadata::default();
        };
        match ProfileMetadata::from_record(&record) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(id = %record.id, error = %e, "unparseable profile content");
                ProfileMetadata::default()
            }
        }
    }
}

/// Normalize and decode a caller-supplied identifier. No network access.
pub fn resolve(identifier: &str) -> Result<CanonicalAuthorKey, FetchError> {
    let id = AuthorIdentifier::parse(identifier)?;
    Ok(id.decode()?)
}
