//! Broker connection setup shared by producer, consumers, and health checks.

use std::sync::Arc;

use engine_core::{Error, Result};
use rskafka::client::{
    partition::{PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use tracing::info;

use crate::config::RedpandaConfig;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connect to the cluster. TLS and SASL are enabled when credentials are configured.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if let Some((username, password)) = config.sasl_credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(username, password)));
    }

    let client = builder
        .build()
        .await
        .map_err(|e| Error::transport(format!("failed to connect to Redpanda: {e}")))?;

    info!(brokers = %config.broker_string(), "Connected to Redpanda");
    Ok(client)
}

/// Partition client for `topic`.
pub async fn partition_client(
    client: &Client,
    topic: &str,
    partition: i32,
) -> Result<Arc<PartitionClient>> {
    client
        .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
        .await
        .map(Arc::new)
        .map_err(|e| Error::transport(format!("failed to open {topic}/{partition}: {e}")))
}
