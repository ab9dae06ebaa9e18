//! Admission controller: validate, authenticate, check quota, enrich, publish, charge.
//!
//! Each step short-circuits. Credit is charged only after the transport
//! acknowledged the envelope, so a failed publish never costs the tenant.

use std::sync::Arc;
use std::time::Instant;

use engine_core::{
    schema::{validate_event_size, validate_user_event},
    Context, Envelope, Error, ErrorKind, ParsedApiKey, RawUserEvent, Result,
};
use redpanda::EventPublisher;
use telemetry::Metrics;
use tenant_client::{CreditLedger, IdentityCache};
use tracing::{debug, info, warn};

pub struct AdmissionController {
    identity: Arc<IdentityCache>,
    ledger: Arc<CreditLedger>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
}

impl AdmissionController {
    pub fn new(
        identity: Arc<IdentityCache>,
        ledger: Arc<CreditLedger>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            identity,
            ledger,
            publisher,
            metrics,
        }
    }

    /// Admit one event from a raw request body.
    pub async fn admit_body(
        &self,
        body: &[u8],
        api_key: &ParsedApiKey,
        context: Option<Context>,
    ) -> Result<Envelope> {
        let decoded = validate_event_size(body).and_then(|()| {
            serde_json::from_slice::<RawUserEvent>(body)
                .map_err(|e| Error::validation(format!("invalid event body: {e}")))
        });

        match decoded {
            Ok(raw) => self.admit(raw, api_key, context).await,
            Err(e) => {
                self.metrics.events_received.inc();
                self.record_rejection(&e);
                Err(e)
            }
        }
    }

    /// Admit one event. Returns the published envelope.
    pub async fn admit(
        &self,
        raw: RawUserEvent,
        api_key: &ParsedApiKey,
        context: Option<Context>,
    ) -> Result<Envelope> {
        let start = Instant::now();
        self.metrics.events_received.inc();

        let result = self.run(raw, api_key, context).await;
        self.metrics.admission_latency_ms.observe(start.elapsed());

        match &result {
            Ok(envelope) => {
                self.metrics.events_accepted.inc();
                debug!(
                    app_id = %envelope.app_id(),
                    event_id = %envelope.id,
                    latency_ms = %start.elapsed().as_millis(),
                    "Event admitted"
                );
            }
            Err(e) => self.record_rejection(e),
        }
        result
    }

    async fn run(
        &self,
        raw: RawUserEvent,
        api_key: &ParsedApiKey,
        context: Option<Context>,
    ) -> Result<Envelope> {
        let user_event = validate_user_event(raw)?;
        let app_id = user_event.app_id;

        self.identity.authenticate(api_key, app_id).await?;
        self.ledger.check_quota(app_id).await?;

        let envelope = Envelope::wrap(user_event, context);

        let publish_start = Instant::now();
        self.publisher.publish(&envelope).await?;
        self.metrics.publish_latency_ms.observe(publish_start.elapsed());

        self.ledger.charge_accepted(app_id).await;
        Ok(envelope)
    }

    fn record_rejection(&self, err: &Error) {
        match err.kind() {
            ErrorKind::Validation => {
                self.metrics.rejected_validation.inc();
                debug!(error = %err, "Rejected invalid event");
            }
            ErrorKind::Auth => {
                self.metrics.rejected_auth.inc();
                info!(code = err.error_code(), "Rejected unauthenticated event");
            }
            ErrorKind::Quota => {
                self.metrics.rejected_quota.inc();
                info!(error = %err, "Rejected event over quota");
            }
            ErrorKind::Unavailable | ErrorKind::Internal => {
                self.metrics.rejected_unavailable.inc();
                warn!(
                    code = err.error_code(),
                    timed_out = err.timed_out(),
                    error = %err,
                    "Admission failed on a dependency"
                );
            }
        }
    }
}
