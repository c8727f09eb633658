//! Concurrent fan-out of one query to every configured relay.
//!
//! Each relay gets its own subscription with a call-scoped id, bounded by an
//! independent deadline. All relay futures are joined before returning, and a
//! failing relay only removes its own contribution.

use std::{collections::HashSet, time::Duration};

use futures_util::future::join_all;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    error::FetchError,
    event::RawRecord,
    message::{RecordFilter, SubscriptionQuery},
    subscription::{self, RecordSink},
    transport::{Connector, RelayEndpoint},
};

/// Default per-relay deadline.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// How a single relay's subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { kept: usize },
    Failed,
    TimedOut,
}

pub struct Aggregator<C> {
    connector: C,
    relays: Vec<RelayEndpoint>,
    relay_timeout: Duration,
}

impl<C> Aggregator<C> {
    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn relays(&self) -> &[RelayEndpoint] {
        &self.relays
    }
}

impl<C: Connector> Aggregator<C> {
    pub fn new(connector: C, relays: Vec<RelayEndpoint>) -> Self {
        Self {
            connector,
            relays,
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
        }
    }

    pub fn with_relay_timeout(mut self, relay_timeout: Duration) -> Self {
        self.relay_timeout = relay_timeout;
        self
    }

    /// Run `filter` against every relay concurrently, feeding `sink`.
    ///
    /// Subscription ids are `{label}{relay index}`, unique within the call.
    /// Outcomes are returned in relay order.
    pub async fn run<S: RecordSink>(
        &self,
        label: &str,
        filter: &RecordFilter,
        sink: &S,
    ) -> Vec<RelayOutcome> {
        let tasks = self.relays.iter().enumerate().map(|(idx, relay)| {
            let query = SubscriptionQuery {
                subscription_id: format!("{label}{idx}"),
                filter: filter.clone(),
            };
            let span = info_span!("relay", relay = %relay, sub = %query.subscription_id);
            async move {
                let task = subscription::run(&self.connector, relay, query, sink);
                match timeout(self.relay_timeout, task).await {
                    Ok(Ok(kept)) => RelayOutcome::Completed { kept },
                    Ok(Err(e)) => {
                        warn!(error = %e, "relay excluded");
                        RelayOutcome::Failed
                    }
                    Err(_) => {
                        warn!(
                            timeout_ms = self.relay_timeout.as_millis() as u64,
                            "relay timed out"
                        );
                        RelayOutcome::TimedOut
                    }
                }
            }
            .instrument(span)
        });
        let outcomes = join_all(tasks).await;
        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, RelayOutcome::Completed { .. }))
            .count();
        info!(
            label,
            relays = outcomes.len(),
            completed,
            "aggregate query finished"
        );
        outcomes
    }

    /// Collect deduplicated records of `filter.kind` from all relays.
    ///
    /// Fails with [`FetchError::NoResults`] when no relay produced a record.
    pub async fn collect_content(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let collector = ContentCollector::default();
        self.run("sub", filter, &collector).await;
        let records = collector.into_records();
        if records.is_empty() {
            return Err(FetchError::NoResults);
        }
        Ok(records)
    }

    /// Select the newest record of `filter.kind` across all relays.
    pub async fn select_latest(&self, filter: &RecordFilter) -> Option<RawRecord> {
        let selector = LatestSelector::default();
        self.run("profile", filter, &selector).await;
        selector.into_latest()
    }
}

#[derive(Default)]
struct ContentSet {
    seen: HashSet<String>,
    records: Vec<RawRecord>,
}

/// Keeps the first record seen for each id, in arrival order.
#[derive(Default)]
pub struct ContentCollector {
    inner: Mutex<ContentSet>,
}

impl ContentCollector {
    pub fn into_records(self) -> Vec<RawRecord> {
        self.inner.into_inner().records
    }
}

impl RecordSink for ContentCollector {
    async fn offer(&self, relay: &RelayEndpoint, record: RawRecord) -> bool {
        let mut set = self.inner.lock().await;
        if !set.seen.insert(record.id.clone()) {
            debug!(id = %record.id, %relay, "duplicate record dropped");
            return false;
        }
        debug!(id = %record.id, %relay, "record accepted");
        set.records.push(record);
        true
    }
}

/// Keeps the record with the greatest `created_at`; ties keep the first seen.
#[derive(Default)]
pub struct LatestSelector {
    latest: Mutex<Option<RawRecord>>,
}

impl LatestSelector {
    pub fn into_latest(self) -> Option<RawRecord> {
        self.latest.into_inner()
    }
}

impl RecordSink for LatestSelector {
    async fn offer(&self, relay: &RelayEndpoint, record: RawRecord) -> bool {
        let mut latest = self.latest.lock().await;
        let newer = latest
            .as_ref()
            .map_or(true, |current| record.created_at > current.created_at);
        if newer {
            debug!(
                id = %record.id,
                created_at = record.created_at,
                %relay,
                "newer record selected"
            );
            *latest = Some(record);
        }
        newer
    }
}
