//! Reachability probe for the primary endpoint
//!
//! A probe opens a connection and releases it immediately. Every failure
//! (refused, auth, timeout) collapses into [`HealthStatus::Down`] because the
//! caller only decides between "back up" and "alert".

mod probe;

pub use probe::{CheckError, HealthProbe, HealthStatus};
