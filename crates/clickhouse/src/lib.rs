//! ClickHouse persistence for envelopes.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod schema;

pub use client::*;
pub use config::*;
pub use insert::{insert_events, EventRow, EventStore};
