//! JSON-RPC over WebSocket
//!
//! Talks to a geth-style dev node:
//! - `eth_pendingTransactions` - pending pool contents
//! - `eth_mining` - miner flag
//! - `miner_start` / `miner_stop` - miner control
//! - `eth_subscribe` - `newHeads` and `newPendingTransactions` pushes

pub mod client;
pub mod types;

pub use client::{RpcClient, RpcError};
pub use types::{
    Incoming, JsonRpcError, JsonRpcRequest, JsonRpcResponse, SubscriptionNotice,
    SubscriptionParams,
};
