//! ClickHouse health checks and schema setup.

use clickhouse::Client;
use engine_core::Result;
use tracing::{debug, error, info};

use crate::client::ClickHouseClient;
use crate::insert::{store_error, EventStore};
use crate::schema::all_statements;

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> Result<()> {
    match client.ping().await {
        Ok(()) => {
            debug!("ClickHouse connection healthy");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            Err(e)
        }
    }
}

/// Create the database and event table if they do not exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let config = client.config();

    // The target database may not exist yet, so DDL runs without one selected.
    let mut server = Client::default().with_url(&config.url);
    if let Some(ref user) = config.username {
        server = server.with_user(user);
    }
    if let Some(ref pass) = config.password {
        server = server.with_password(pass);
    }

    for ddl in all_statements(&config.database) {
        server
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| store_error("schema", e))?;
    }

    info!(table = %config.event_table(), "ClickHouse schema initialized");
    Ok(())
}
