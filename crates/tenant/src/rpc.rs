//! Tenant service collaborators: identity resolution and the durable credit ledger.

use std::time::Duration;

use async_trait::async_trait;
use engine_core::{
    with_deadline, CreditInfo, Dependency, Error, ParsedApiKey, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TenantConfig;

/// Resolves API keys to the application they are bound to.
#[async_trait]
pub trait IdentityRpc: Send + Sync {
    /// `None` when the key is not bound to any application.
    async fn resolve_application_id(&self, api_key: &ParsedApiKey) -> Result<Option<Uuid>>;
}

/// The system of record for credit limits and usage.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_credit_info(&self, app_id: Uuid) -> Result<CreditInfo>;

    /// Add `amount` to the application's recorded usage.
    async fn increment_credits(&self, app_id: Uuid, amount: i64) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveKeyRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveKeyResponse {
    application_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct IncrementCreditsRequest {
    amount: i64,
}

/// HTTP client for the tenant service.
#[derive(Clone)]
pub struct TenantServiceClient {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl TenantServiceClient {
    pub fn new(config: &TenantConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build tenant HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
            timeout: config.request_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a transport-level reqwest failure onto the dependency's error.
fn request_error(dependency: Dependency, operation: &str, timeout: Duration, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::timeout(dependency, operation, timeout);
    }
    let message = format!("{operation} failed: {e}");
    match dependency {
        Dependency::Identity => Error::identity(message),
        _ => Error::ledger(message),
    }
}

#[async_trait]
impl IdentityRpc for TenantServiceClient {
    async fn resolve_application_id(&self, api_key: &ParsedApiKey) -> Result<Option<Uuid>> {
        let url = self.url("/internal/api-keys/resolve");
        let key = api_key.to_string();
        debug!(url = %url, "Resolving API key");

        with_deadline(Dependency::Identity, "resolve_application_id", self.timeout, async {
            let response = self
                .http_client
                .post(&url)
                .json(&ResolveKeyRequest { api_key: &key })
                .send()
                .await
                .map_err(|e| {
                    request_error(Dependency::Identity, "resolve_application_id", self.timeout, e)
                })?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                let status = response.status();
                warn!(status = %status, "Identity service returned error");
                return Err(Error::identity(format!("identity service returned {status}")));
            }

            let body: ResolveKeyResponse = response
                .json()
                .await
                .map_err(|e| Error::identity(format!("invalid identity response: {e}")))?;
            Ok(body.application_id)
        })
        .await
    }
}

#[async_trait]
impl LedgerRpc for TenantServiceClient {
    async fn get_credit_info(&self, app_id: Uuid) -> Result<CreditInfo> {
        let url = self.url(&format!("/internal/applications/{app_id}/credits"));

        with_deadline(Dependency::Ledger, "get_credit_info", self.timeout, async {
            let response = self
                .http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| request_error(Dependency::Ledger, "get_credit_info", self.timeout, e))?;

            if !response.status().is_success() {
                let status = response.status();
                warn!(%app_id, status = %status, "Ledger returned error for credit info");
                return Err(Error::ledger(format!("ledger returned {status} for {app_id}")));
            }

            response
                .json::<CreditInfo>()
                .await
                .map_err(|e| Error::ledger(format!("invalid credit info response: {e}")))
        })
        .await
    }

    async fn increment_credits(&self, app_id: Uuid, amount: i64) -> Result<()> {
        let url = self.url(&format!("/internal/applications/{app_id}/credits/increment"));

        with_deadline(Dependency::Ledger, "increment_credits", self.timeout, async {
            let response = self
                .http_client
                .post(&url)
                .json(&IncrementCreditsRequest { amount })
                .send()
                .await
                .map_err(|e| {
                    request_error(Dependency::Ledger, "increment_credits", self.timeout, e)
                })?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::ledger(format!(
                    "ledger returned {status} incrementing {app_id} by {amount}"
                )));
            }
            Ok(())
        })
        .await
    }
}
