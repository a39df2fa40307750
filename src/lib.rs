//! Watchdog for a PostgreSQL primary/replica pair
//!
//! Probes the primary on a fixed interval, takes a logical backup whenever it
//! is reachable, compares row counts against the replica, and mails the
//! operator about outages and backup outcomes.

pub mod backup;
pub mod config;
pub mod db;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod replica;

#[cfg(test)]
pub(crate) mod testing;
