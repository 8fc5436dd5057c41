//! dev-automine: mine on a dev node only while there is work to mine
//!
//! This crate watches a development node and toggles its miner:
//! - Subscribes to new-block and new-pending-transaction events
//! - Re-reads the pending transaction count on every event
//! - Starts mining with a configured thread count when work is pending
//! - Stops mining when the pool is empty
//!
//! Node access goes through the traits in [`ledger`], so the control loop can
//! run against a live node over JSON-RPC or against an in-memory fake.
//!
//! # Example
//!
//! ```rust,no_run
//! use dev_automine::config::AutomineConfig;
//! use dev_automine::control::Controller;
//! use dev_automine::ledger::RpcClient;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AutomineConfig::default();
//! let client = RpcClient::connect(&config).await?;
//!
//! // Reconcile now, then on every block and pending transaction until Ctrl-C
//! let controller = Controller::new(client, &config);
//! controller
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod ledger;

// Re-export commonly used types
pub use config::{AutomineConfig, ConfigError};
pub use control::{ControlError, Controller, Reconciler, Status};
pub use ledger::{
    EventKind, EventSource, LedgerError, MiningService, Notification, RpcClient, RpcError, TxPool,
};
