//! Fleetmedic engine - diagnosis, audit, log correlation and healing for
//! Ansible-managed fleets.
//!
//! Every component talks to hosts through [`executor::RemoteExecutor`] and
//! returns a serialisable report. Remote failures stay inside the report;
//! only caller mistakes come back as [`error::MedicError`].

pub mod auto_heal;
pub mod baseline;
pub mod config;
pub mod correlation;
pub mod diagnose;
pub mod error;
pub mod executor;
pub mod facts;
pub mod health;
pub mod log_hunter;
pub mod log_patterns;
pub mod monitor;
pub mod network_matrix;
pub mod performance;
pub mod security;
pub mod service;

pub use error::{MedicError, Result};

/// Local time in RFC 3339, used for report timestamps
pub fn timestamp_now() -> String {
    chrono::Local::now().to_rfc3339()
}
