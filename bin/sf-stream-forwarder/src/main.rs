//! StreamForward Change-Stream Forwarder
//!
//! Lambda handler invoked with key-value store change-stream batches. INSERT
//! records from configured tables are flattened and published to EventBridge,
//! one producer profile per source table.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SF_LOG_FORMAT` | `text` | Log output: `text` or `json` |
//! | `RUST_LOG` | `info` | Log level |
//!
//! Producer, bus and batching settings are described in `sf-config`.

use std::sync::Arc;

use anyhow::{Context, Result};
use lambda_runtime::{service_fn, LambdaEvent};
use tracing::{error, info, warn};

use sf_common::logging::{self, LogFormat};
use sf_common::ChangeStreamBatch;
use sf_config::ForwarderConfig;
use sf_dispatch::{BatchDispatcher, BatchDispatcherConfig, EventBridgePublisher};
use sf_stream::PipelineDriver;

const LOG_FORMAT_VAR: &str = "SF_LOG_FORMAT";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    let raw_format = env_or(LOG_FORMAT_VAR, "text");
    let log_format = raw_format.parse::<LogFormat>();
    logging::init(log_format.clone().unwrap_or_default());
    if let Err(e) = log_format {
        warn!("{}, falling back to text", e);
    }

    info!("Starting StreamForward change-stream forwarder");

    let driver = match build_driver().await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            error!("Forwarder initialisation failed: {:#}", e);
            return Err(e.into());
        }
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<ChangeStreamBatch>| {
        let driver = Arc::clone(&driver);
        async move { handle_event(&driver, event).await }
    }))
    .await
}

/// Load configuration once per cold start and wire the pipeline
async fn build_driver() -> Result<PipelineDriver> {
    let config = ForwarderConfig::load().context("loading forwarder configuration")?;
    let profiles = Arc::new(config.profile_set().context("building client profiles")?);

    for profile in profiles.iter() {
        info!(
            "Profile {}: table {} -> bus {} ({} / {})",
            profile.name,
            profile.table_fragment(),
            profile.destination_bus_name,
            profile.source_name,
            profile.detail_type
        );
    }

    let publisher = Arc::new(EventBridgePublisher::from_env().await);
    info!("EventBridge publisher initialized");

    let dispatcher = BatchDispatcher::new(
        publisher,
        BatchDispatcherConfig {
            chunk_limit: config.chunk_limit,
            publish_timeout: config.publish_timeout(),
        },
    );

    Ok(PipelineDriver::new(profiles, dispatcher))
}

async fn handle_event(
    driver: &PipelineDriver,
    event: LambdaEvent<ChangeStreamBatch>,
) -> Result<(), lambda_runtime::Error> {
    let (batch, context) = event.into_parts();
    info!(
        "Invocation {} received {} change records",
        context.request_id,
        batch.len()
    );

    match driver.handle(&batch).await {
        Ok(summary) => {
            info!(
                "Invocation {} done: {} events accepted, {} rejected, {} records skipped",
                context.request_id,
                summary.accepted(),
                summary.rejected(),
                summary.skipped.total()
            );
            Ok(())
        }
        Err(e) => {
            error!("Invocation {} failed: {}", context.request_id, e);
            Err(e.into())
        }
    }
}
