//! Control module: decides whether the node should be mining

pub mod controller;
pub mod reconciler;

pub use controller::{ControlError, Controller, INBOX_CAPACITY};
pub use reconciler::{Reconciler, Status};
