//! Activity Log Module
//!
//! Append-only audit trail of operator-visible events.

pub mod log;

pub use log::{ActivityLog, ActivityLogEntry, Status};
