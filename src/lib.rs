//! `tasksync`: keep tasks mirrored between two task services.
//!
//! One reconciliation engine drives four tools that differ only in their
//! [`policy::SyncPolicy`]: priority/label sync, project mirror,
//! completion-triggered recurrence, and starred-item consolidation.

pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod policy;
pub mod scheduler;
pub mod store;
pub mod util;

pub use error::{ErrorCode, Result, StructuredError, SyncError};
