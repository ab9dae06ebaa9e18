//! HTTP API layer for the ingestion gateway.

pub mod admission;
pub mod context;
pub mod extractors;
pub mod response;
pub mod routes;
pub mod state;

pub use admission::AdmissionController;
pub use context::ContextEnricher;
pub use routes::router;
pub use state::AppState;
