//! Event-driven control loop
//!
//! Both event subscriptions feed a single inbox owned by one task, so
//! reconciliations never overlap. Notifications are wakeups only: each one
//! triggers exactly one reconciliation against live node state.

use crate::config::AutomineConfig;
use crate::control::reconciler::Reconciler;
use crate::ledger::{EventKind, EventSource, LedgerError, MiningService, Notification, TxPool};
use log::{debug, error, info};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

/// Maximum number of notifications buffered ahead of the reconciler
pub const INBOX_CAPACITY: usize = 256;

/// Control loop errors
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to subscribe to {kind} events: {source}")]
    Subscribe {
        kind: EventKind,
        #[source]
        source: LedgerError,
    },
    #[error("All event subscriptions closed")]
    EventsClosed,
}

/// Drives a [`Reconciler`] from node events
pub struct Controller<L> {
    reconciler: Reconciler<L>,
}

impl<L> Controller<L>
where
    L: TxPool + MiningService + EventSource,
{
    pub fn new(ledger: L, config: &AutomineConfig) -> Self {
        Self {
            reconciler: Reconciler::new(ledger, config.threads),
        }
    }

    /// Subscribe, reconcile once, then reconcile on every notification
    /// until `shutdown` resolves.
    ///
    /// A failed reconciliation is logged and the loop keeps going. The loop
    /// ends with [`ControlError::EventsClosed`] if every subscription closes.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ControlError>
    where
        F: Future<Output = ()>,
    {
        let (inbox_tx, mut inbox) = mpsc::channel::<Notification>(INBOX_CAPACITY);

        for kind in EventKind::ALL {
            self.reconciler
                .ledger()
                .subscribe(kind, inbox_tx.clone())
                .await
                .map_err(|source| ControlError::Subscribe { kind, source })?;
            info!("Subscribed to {} events", kind);
        }
        // Only the subscriptions hold senders from here on
        drop(inbox_tx);

        self.reconcile_logged("startup").await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Auto-miner shutting down");
                    return Ok(());
                }
                next = inbox.recv() => match next {
                    Some(notification) => {
                        debug!(
                            "{} event id={:?} error={:?}",
                            notification.kind, notification.id, notification.error
                        );
                        self.reconcile_logged(notification.kind.as_str()).await;
                    }
                    None => return Err(ControlError::EventsClosed),
                },
            }
        }
    }

    async fn reconcile_logged(&self, trigger: &str) {
        if let Err(e) = self.reconciler.reconcile().await {
            error!("Reconcile after {} failed: {}", trigger, e);
        }
    }
}
