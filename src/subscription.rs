//! Per-relay subscription state machine.
//!
//! A subscription moves `Connecting → Subscribed → Draining → Closed`. The
//! transition function is pure apart from logging, so it can be driven by
//! synthetic frames in tests; [`run`] drives it over a real connection.

use tracing::{debug, error, info, warn};

use crate::{
    error::TransportError,
    event::RawRecord,
    message::{ClientMessage, RelayMessage, SubscriptionQuery},
    transport::{Connector, RelayConnection, RelayEndpoint},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Subscribed,
    /// `CLOSE` sent, waiting for the connection to end.
    Draining,
    Closed,
}

/// Events fed into the state machine.
#[derive(Debug)]
pub enum Input {
    /// The transport connection is open.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// The transport dropped a single unusable frame.
    Discarded(String),
    /// The transport reported the connection closed.
    Closed,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientMessage),
    /// Hand a candidate record to the aggregator.
    Deliver(RawRecord),
    /// Close the transport connection.
    Shutdown,
    /// The subscription is finished.
    Complete,
}

/// Compute the next state and its effects for one input.
pub fn transition(
    state: SubscriptionState,
    query: &SubscriptionQuery,
    input: Input,
) -> (SubscriptionState, Vec<Effect>) {
    use SubscriptionState::*;

    match (state, input) {
        (Closed, _) => (Closed, vec![]),
        (_, Input::Closed) => (Closed, vec![Effect::Complete]),
        (Connecting, Input::Opened) => (
            Subscribed,
            vec![Effect::Send(ClientMessage::req(query))],
        ),
        (state, Input::Opened) => {
            warn!(?state, "unexpected open notification");
            (state, vec![])
        }
        (state, Input::Discarded(reason)) => {
            warn!(%reason, "discarding frame");
            (state, vec![])
        }
        (Connecting, Input::Frame(_)) => {
            debug!("ignoring frame received before subscribing");
            (Connecting, vec![])
        }
        (state, Input::Frame(text)) => on_frame(state, query, &text),
    }
}

fn on_frame(
    state: SubscriptionState,
    query: &SubscriptionQuery,
    text: &str,
) -> (SubscriptionState, Vec<Effect>) {
    let msg = match RelayMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, frame = %truncate(text, 200), "discarding malformed frame");
            return (state, vec![]);
        }
    };
    match msg {
        RelayMessage::Event {
            subscription_id,
            record,
        } => {
            if subscription_id != query.subscription_id {
                debug!(%subscription_id, "ignoring event for another subscription");
            } else if state != SubscriptionState::Subscribed {
                debug!(id = %record.id, "ignoring event after close");
            } else if record.kind != query.filter.kind {
                debug!(id = %record.id, kind = record.kind, "ignoring event of unexpected kind");
            } else {
                return (state, vec![Effect::Deliver(record)]);
            }
            (state, vec![])
        }
        RelayMessage::Eose { subscription_id }
            if subscription_id == query.subscription_id
                && state == SubscriptionState::Subscribed =>
        {
            debug!("end of stored events");
            (
                SubscriptionState::Draining,
                vec![
                    Effect::Send(ClientMessage::close(&query.subscription_id)),
                    Effect::Shutdown,
                ],
            )
        }
        RelayMessage::Eose { subscription_id } => {
            debug!(%subscription_id, "ignoring unmatched end of stored events");
            (state, vec![])
        }
        RelayMessage::Notice(notice) => {
            warn!(%notice, "relay notice");
            (state, vec![])
        }
        RelayMessage::Other(kind) => {
            debug!(%kind, "ignoring unknown message type");
            (state, vec![])
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// State machine for one (relay, query) pair.
#[derive(Debug)]
pub struct SubscriptionEngine {
    query: SubscriptionQuery,
    state: SubscriptionState,
}

impl SubscriptionEngine {
    pub fn new(query: SubscriptionQuery) -> Self {
        Self {
            query,
            state: SubscriptionState::Connecting,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let (next, effects) = transition(self.state, &self.query, input);
        self.state = next;
        effects
    }
}

/// Receives candidate records from running subscriptions.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Offer a record; returns whether it was kept.
    async fn offer(&self, relay: &RelayEndpoint, record: RawRecord) -> bool;
}

/// Run one subscription against one relay until the connection closes.
///
/// Returns the number of records the sink kept. A fatal transport error ends
/// the subscription with that error; records already offered stay offered.
pub async fn run<C, S>(
    connector: &C,
    endpoint: &RelayEndpoint,
    query: SubscriptionQuery,
    sink: &S,
) -> Result<usize, TransportError>
where
    C: Connector,
    S: RecordSink,
{
    let mut engine = SubscriptionEngine::new(query);
    let mut conn = connector.open(endpoint).await?;
    let mut kept = 0;
    let mut input = Input::Opened;
    loop {
        for effect in engine.handle(input) {
            match effect {
                Effect::Send(msg) => conn.send(&msg).await?,
                Effect::Deliver(record) => {
                    if sink.offer(endpoint, record).await {
                        kept += 1;
                    }
                }
                Effect::Shutdown => {
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "close failed");
                    }
                }
                Effect::Complete => {
                    info!(kept, "subscription closed");
                    return Ok(kept);
                }
            }
        }
        input = match conn.receive().await {
            Ok(Some(text)) => Input::Frame(text),
            Ok(None) => Input::Closed,
            Err(e) if !e.is_fatal() => Input::Discarded(e.to_string()),
            Err(e) => {
                error!(error = %e, state = ?engine.state(), "transport failed");
                engine.handle(Input::Closed);
                return Err(e);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{KIND_LONG_FORM, KIND_METADATA},
        message::RecordFilter,
        transport::mock::{Inbound, ScriptedConnector},
    };
    use serde_json::json;
    use std::sync::Mutex;

    fn query() -> SubscriptionQuery {
        SubscriptionQuery {
            subscription_id: "sub0".into(),
            filter: RecordFilter::new(KIND_LONG_FORM),
        }
    }

    fn event_frame(sub: &str, id: &str, kind: u32) -> String {
        json!(["EVENT", sub, {"id": id, "kind": kind, "created_at": 1}]).to_string()
    }

    fn subscribed() -> SubscriptionEngine {
        let mut engine = SubscriptionEngine::new(query());
        engine.handle(Input::Opened);
        engine
    }

    #[test]
    fn open_sends_request() {
        let mut engine = SubscriptionEngine::new(query());
        assert_eq!(engine.state(), SubscriptionState::Connecting);
        let effects = engine.handle(Input::Opened);
        assert_eq!(effects, vec![Effect::Send(ClientMessage::req(&query()))]);
        assert_eq!(engine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn matching_event_is_delivered() {
        let mut engine = subscribed();
        let effects = engine.handle(Input::Frame(event_frame("sub0", "aa", KIND_LONG_FORM)));
        match effects.as_slice() {
            [Effect::Deliver(rec)] => assert_eq!(rec.id, "aa"),
            other => panic!("unexpected effects {other:?}"),
        }
        assert_eq!(engine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn foreign_subscription_and_wrong_kind_are_ignored() {
        let mut engine = subscribed();
        assert!(engine
            .handle(Input::Frame(event_frame("other", "aa", KIND_LONG_FORM)))
            .is_empty());
        assert!(engine
            .handle(Input::Frame(event_frame("sub0", "bb", KIND_METADATA)))
            .is_empty());
        assert_eq!(engine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn eose_sends_close_and_drains() {
        let mut engine = subscribed();
        assert!(engine
            .handle(Input::Frame(json!(["EOSE", "other"]).to_string()))
            .is_empty());
        let effects = engine.handle(Input::Frame(json!(["EOSE", "sub0"]).to_string()));
        assert_eq!(
            effects,
            vec![
                Effect::Send(ClientMessage::close("sub0")),
                Effect::Shutdown
            ]
        );
        assert_eq!(engine.state(), SubscriptionState::Draining);

        // Late events are not delivered once draining.
        assert!(engine
            .handle(Input::Frame(event_frame("sub0", "cc", KIND_LONG_FORM)))
            .is_empty());
        assert_eq!(engine.handle(Input::Closed), vec![Effect::Complete]);
        assert_eq!(engine.state(), SubscriptionState::Closed);
        assert!(engine.handle(Input::Closed).is_empty());
    }

    #[test]
    fn junk_frames_do_not_change_state() {
        let mut engine = subscribed();
        for frame in [
            "garbage",
            "{}",
            r#"["AUTH","challenge"]"#,
            r#"["NOTICE","rate limited"]"#,
            r#"["EVENT","sub0",42]"#,
        ] {
            assert!(engine.handle(Input::Frame(frame.into())).is_empty());
            assert_eq!(engine.state(), SubscriptionState::Subscribed);
        }
        assert!(engine.handle(Input::Discarded("too big".into())).is_empty());
        assert_eq!(engine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn closure_before_eose_completes() {
        let mut engine = subscribed();
        assert_eq!(engine.handle(Input::Closed), vec![Effect::Complete]);
        assert_eq!(engine.state(), SubscriptionState::Closed);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[derive(Default)]
    struct VecSink(Mutex<Vec<RawRecord>>);

    impl RecordSink for VecSink {
        async fn offer(&self, _relay: &RelayEndpoint, record: RawRecord) -> bool {
            self.0.lock().unwrap().push(record);
            true
        }
    }

    #[tokio::test]
    async fn run_drives_full_exchange() {
        let url = "wss://a.example/";
        let connector = ScriptedConnector::default().relay(url, |sub, _| {
            vec![
                Inbound::Text(r#"["NOTICE","hello"]"#.into()),
                Inbound::Text(event_frame(sub, "aa", KIND_LONG_FORM)),
                Inbound::Error(TransportError::Frame("oversized".into())),
                Inbound::Text(event_frame(sub, "bb", KIND_LONG_FORM)),
                Inbound::Text(json!(["EOSE", sub]).to_string()),
            ]
        });
        let endpoint = RelayEndpoint::parse(url).unwrap();
        let sink = VecSink::default();
        let kept = run(&connector, &endpoint, query(), &sink).await.unwrap();
        assert_eq!(kept, 2);
        let ids: Vec<_> = sink.0.lock().unwrap().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["aa", "bb"]);
        assert_eq!(
            connector.sent_to(url),
            vec![ClientMessage::req(&query()), ClientMessage::close("sub0")]
        );
    }

    #[tokio::test]
    async fn run_reports_fatal_transport_error() {
        let url = "wss://b.example/";
        let connector = ScriptedConnector::default().relay(url, |sub, _| {
            vec![
                Inbound::Text(event_frame(sub, "aa", KIND_LONG_FORM)),
                Inbound::Error(TransportError::Connect("reset".into())),
            ]
        });
        let endpoint = RelayEndpoint::parse(url).unwrap();
        let sink = VecSink::default();
        assert!(run(&connector, &endpoint, query(), &sink).await.is_err());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_reports_refused_connection() {
        let url = "wss://c.example/";
        let connector = ScriptedConnector::default().refusing(url);
        let endpoint = RelayEndpoint::parse(url).unwrap();
        let err = run(&connector, &endpoint, query(), &VecSink::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
