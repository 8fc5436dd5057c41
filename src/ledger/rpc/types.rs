//! JSON-RPC 2.0 message types

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_PENDING_TRANSACTIONS: &str = "eth_pendingTransactions";
pub const METHOD_MINING: &str = "eth_mining";
pub const METHOD_MINER_START: &str = "miner_start";
pub const METHOD_MINER_STOP: &str = "miner_stop";
pub const METHOD_SUBSCRIBE: &str = "eth_subscribe";

/// Method name of server-pushed subscription notices
pub const METHOD_SUBSCRIPTION: &str = "eth_subscription";

/// Outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: T,
}

impl<T> JsonRpcRequest<T> {
    pub fn new(id: u64, method: impl Into<String>, params: T) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error object returned by the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response to one of our requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Split into the result value or the node's error. A missing or null
    /// result is returned as `Value::Null`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Push notification for an active subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionNotice {
    pub method: String,
    pub params: SubscriptionParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// Anything the node can send us
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Notice(SubscriptionNotice),
    Response(JsonRpcResponse),
}

impl Incoming {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
