//! Periodic reconciliation of expiring intentions.
//!
//! Each pass marks due intentions expired, sends the owner a single
//! expiration notice and, once the plan's retention period has elapsed,
//! deletes every blob the intention references and then the intention row.

pub mod config;
pub mod db;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod reconciliation;
pub mod services;
