//! Ledger module: the node-side services the auto-miner consumes
//!
//! The control loop never owns node state. It reads the pending transaction
//! count and the mining flag, asks the miner to start or stop, and listens
//! for events. Each of those is a trait here so the loop can be driven by a
//! live node or a test double.
//!
//! # Services
//! - [`TxPool`] - pending transaction count
//! - [`MiningService`] - mining flag, start/stop requests
//! - [`EventSource`] - `LatestBlock` and `PendingTransaction` notifications
//!
//! [`RpcClient`] implements all three against a geth-style JSON-RPC node.

pub mod event;
pub mod rpc;

use std::future::Future;
use std::num::NonZeroU32;
use thiserror::Error;
use tokio::sync::mpsc;

pub use event::{EventKind, Notification};
pub use rpc::{RpcClient, RpcError};

/// Errors raised by ledger collaborators
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the node's transaction pool
pub trait TxPool {
    /// Number of transactions waiting to be mined
    fn pending_count(&self) -> impl Future<Output = Result<usize, LedgerError>> + Send;
}

/// Control over the node's miner
///
/// Start and stop are idempotent on the node side: starting a running miner
/// or stopping an idle one is a no-op there.
pub trait MiningService {
    /// Whether the miner is currently running
    fn is_mining(&self) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Ask the node to start mining with `threads` workers
    fn start_mining(
        &self,
        threads: NonZeroU32,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Ask the node to stop mining
    fn stop_mining(&self) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

/// Event subscriptions
pub trait EventSource {
    /// Deliver every `kind` event into `sink`, in arrival order.
    ///
    /// The subscription lives until the source shuts down or the receiving
    /// side of `sink` is dropped.
    fn subscribe(
        &self,
        kind: EventKind,
        sink: mpsc::Sender<Notification>,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;
}
