//! Portgate API client
//!
//! - [`ApiClient`]: typed HTTP client with bearer-token sessions
//! - [`TurnMonitor`]: polls the ticket change feed and keeps a live [`Board`]

pub mod client;
pub mod monitor;

pub use client::{ApiClient, TicketChanges};
pub use monitor::{Board, TurnMonitor, DEFAULT_INTERVAL_SECS};
