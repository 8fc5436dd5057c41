//! Mining reconciler
//!
//! Compares what the node is doing with what it should be doing and issues
//! at most one corrective command. Holds no state besides the thread count;
//! every call re-reads the node.

use crate::ledger::{LedgerError, MiningService, TxPool};
use log::{debug, info};
use std::fmt;
use std::num::NonZeroU32;

/// Status line emitted by a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Work is pending and mining was requested
    Mining { pending: usize, threads: NonZeroU32 },
    /// The pool is empty and mining was stopped
    Idle,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Mining { .. } => write!(f, "== Pending transactions! Mining..."),
            Status::Idle => write!(f, "== No transactions! Mining stopped."),
        }
    }
}

/// Starts mining when transactions are pending, stops it when none are
pub struct Reconciler<L> {
    ledger: L,
    threads: NonZeroU32,
}

impl<L> Reconciler<L>
where
    L: TxPool + MiningService,
{
    pub fn new(ledger: L, threads: NonZeroU32) -> Self {
        Self { ledger, threads }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Bring the miner in line with the pending pool.
    ///
    /// Returns the status line that was logged, or `None` when the miner was
    /// already running with work pending. Collaborator failures are returned
    /// as-is without retry.
    pub async fn reconcile(&self) -> Result<Option<Status>, LedgerError> {
        let pending = self.ledger.pending_count().await?;

        if pending > 0 {
            if self.ledger.is_mining().await? {
                debug!("{} pending transaction(s), already mining", pending);
                return Ok(None);
            }

            let status = Status::Mining {
                pending,
                threads: self.threads,
            };
            info!("{}", status);
            self.ledger.start_mining(self.threads).await?;
            Ok(Some(status))
        } else {
            // stop_mining is a no-op on an idle miner
            self.ledger.stop_mining().await?;
            let status = Status::Idle;
            info!("{}", status);
            Ok(Some(status))
        }
    }
}
