//! Wire messages exchanged with relays.
//!
//! Client to relay: `["REQ", sub, filter]`, `["CLOSE", sub]`.
//! Relay to client: `["EVENT", sub, record]`, `["EOSE", sub]`, `["NOTICE", msg]`.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{error::ProtocolError, event::RawRecord, identifier::CanonicalAuthorKey};

/// Filter parameters of one logical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Kind the query targets; records of other kinds are dropped.
    pub kind: u32,
    pub author: Option<CanonicalAuthorKey>,
    pub limit: Option<u32>,
}

impl RecordFilter {
    pub fn new(kind: u32) -> Self {
        Self {
            kind,
            author: None,
            limit: None,
        }
    }

    pub fn author(mut self, key: CanonicalAuthorKey) -> Self {
        self.author = Some(key);
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Encode as a Nostr filter object.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut filter = Map::new();
        filter.insert("kinds".into(), json!([self.kind]));
        if let Some(author) = &self.author {
            filter.insert("authors".into(), json!([author.to_hex()]));
        }
        if let Some(limit) = self.limit {
            filter.insert("limit".into(), Value::Number(limit.into()));
        }
        filter
    }
}

/// A filter bound to a subscription id on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionQuery {
    pub subscription_id: String,
    pub filter: RecordFilter,
}

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req {
        subscription_id: String,
        filter: RecordFilter,
    },
    Close {
        subscription_id: String,
    },
}

impl ClientMessage {
    pub fn req(query: &SubscriptionQuery) -> Self {
        ClientMessage::Req {
            subscription_id: query.subscription_id.clone(),
            filter: query.filter.clone(),
        }
    }

    pub fn close(subscription_id: &str) -> Self {
        ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        }
    }

    /// Serialize to the JSON array text sent over the wire.
    pub fn to_json(&self) -> String {
        let value = match self {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => Value::Array(vec![
                Value::String("REQ".into()),
                Value::String(subscription_id.clone()),
                Value::Object(filter.to_json()),
            ]),
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        };
        value.to_string()
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        record: RawRecord,
    },
    Eose {
        subscription_id: String,
    },
    Notice(String),
    /// A well-formed array whose leading discriminator is not handled here
    /// (`OK`, `AUTH`, `CLOSED`, ...).
    Other(String),
}

impl RelayMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let val: Value = serde_json::from_str(text)?;
        let arr = val
            .as_array()
            .ok_or_else(|| ProtocolError::Shape("not an array".into()))?;
        let kind = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Shape("missing discriminator".into()))?;
        match kind {
            "EVENT" => {
                let subscription_id = str_at(arr, 1)?;
                let record_val = arr
                    .get(2)
                    .ok_or_else(|| ProtocolError::Shape("EVENT without record".into()))?;
                let record = record_from_value(record_val)?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    record,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: str_at(arr, 1)?,
            }),
            "NOTICE" => Ok(RelayMessage::Notice(
                arr.get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )),
            other => Ok(RelayMessage::Other(other.to_string())),
        }
    }
}

fn record_from_value(val: &Value) -> Result<RawRecord, ProtocolError> {
    if !val.is_object() {
        return Err(ProtocolError::Shape("record is not an object".into()));
    }
    Ok(RawRecord::deserialize(val)?)
}

fn str_at(arr: &[Value], idx: usize) -> Result<String, ProtocolError> {
    arr.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::Shape(format!("expected string at position {idx}")))
}
