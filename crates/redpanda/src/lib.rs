//! Redpanda transport for admitted events and dead letters.

#![recursion_limit = "256"]

pub mod client;
pub mod config;
pub mod consumer;
pub mod health;
pub mod producer;
pub mod topics;
pub mod transport;

pub use config::*;
pub use consumer::*;
pub use producer::*;
pub use topics::*;
pub use transport::*;
