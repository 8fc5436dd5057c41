//! Event notifications delivered to the control loop

use serde_json::Value;
use std::fmt;

/// Kinds of node events the auto-miner listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new latest block was accepted
    LatestBlock,
    /// A new pending transaction entered the pool
    PendingTransaction,
}

impl EventKind {
    /// Every kind, in subscription order
    pub const ALL: [EventKind; 2] = [EventKind::LatestBlock, EventKind::PendingTransaction];

    /// `eth_subscribe` topic for this kind
    pub fn subscription_topic(&self) -> &'static str {
        match self {
            EventKind::LatestBlock => "newHeads",
            EventKind::PendingTransaction => "newPendingTransactions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LatestBlock => "latest-block",
            EventKind::PendingTransaction => "pending-transaction",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event notification
///
/// The payload is a wakeup only. The control loop re-reads live state and
/// does not act on `error` or `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: EventKind,
    /// Set when the event could not be decoded
    pub error: Option<String>,
    /// Block hash or transaction hash; empty when unknown
    pub id: String,
}

impl Notification {
    pub fn new(kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            error: None,
            id: id.into(),
        }
    }

    pub fn failed(kind: EventKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: Some(error.into()),
            id: String::new(),
        }
    }

    /// Build a notification from an `eth_subscription` result payload.
    ///
    /// `newHeads` pushes a header object, `newPendingTransactions` pushes a
    /// hash string (or a full transaction object when the node is asked for
    /// full bodies).
    pub fn from_payload(kind: EventKind, payload: &Value) -> Self {
        let hash = match payload {
            Value::String(hash) => Some(hash.as_str()),
            Value::Object(fields) => fields.get("hash").and_then(Value::as_str),
            _ => None,
        };

        match hash {
            Some(hash) => Self::new(kind, hash),
            None => Self::failed(kind, format!("{} event without hash: {}", kind, payload)),
        }
    }
}
