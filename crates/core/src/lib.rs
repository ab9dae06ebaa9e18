//! Core types, validation, and error taxonomy for the ingestion gateway.

pub mod auth;
pub mod credits;
pub mod deadline;
pub mod error;
pub mod events;
pub mod limits;
pub mod retry;
pub mod schema;

pub use auth::*;
pub use credits::*;
pub use deadline::with_deadline;
pub use error::{AuthErrorCode, Dependency, Error, ErrorKind, Result, StoreFailure};
pub use events::*;
pub use retry::{retry_with_backoff, RetryPolicy};
