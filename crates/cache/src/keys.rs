//! Cache key layout shared with the tenant service.

use std::fmt::Display;

/// `apikey:<key>` holds the application id bound to the key.
pub const API_KEY_PREFIX: &str = "apikey:";
/// `app:creditLimit:<app>` holds the period's credit limit.
pub const CREDIT_LIMIT_PREFIX: &str = "app:creditLimit:";
/// `app:creditUtilization:<app>` holds credits used this period.
pub const CREDIT_USAGE_PREFIX: &str = "app:creditUtilization:";
/// `app:deltaCreditUtilization:<app>` holds usage not yet reported to the ledger.
pub const CREDIT_DELTA_PREFIX: &str = "app:deltaCreditUtilization:";

pub fn api_key(key: impl Display) -> String {
    format!("{API_KEY_PREFIX}{key}")
}

pub fn credit_limit(app_id: impl Display) -> String {
    format!("{CREDIT_LIMIT_PREFIX}{app_id}")
}

pub fn credit_usage(app_id: impl Display) -> String {
    format!("{CREDIT_USAGE_PREFIX}{app_id}")
}

pub fn credit_delta(app_id: impl Display) -> String {
    format!("{CREDIT_DELTA_PREFIX}{app_id}")
}

/// Application id encoded in a delta key.
pub fn app_id_from_delta(key: &str) -> Option<&str> {
    key.strip_prefix(CREDIT_DELTA_PREFIX)
        .filter(|id| !id.is_empty())
}

/// The three counters backing one application's credits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditKeys {
    pub limit: String,
    pub usage: String,
    pub delta: String,
}

impl CreditKeys {
    pub fn for_app(app_id: impl Display) -> Self {
        Self {
            limit: credit_limit(&app_id),
            usage: credit_usage(&app_id),
            delta: credit_delta(&app_id),
        }
    }
}
