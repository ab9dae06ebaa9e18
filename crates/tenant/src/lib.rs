//! Tenant-facing state: API key bindings and credit accounting.

pub mod config;
pub mod identity;
pub mod ledger;
pub mod reconcile;
pub mod reset;
pub mod rpc;

pub use config::TenantConfig;
pub use identity::IdentityCache;
pub use ledger::CreditLedger;
pub use reconcile::{CreditReconciler, ReconcileReport};
pub use reset::{next_reset_after, MonthlyReset};
pub use rpc::{IdentityRpc, LedgerRpc, TenantServiceClient};
