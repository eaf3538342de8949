//! NIDS classifier - main entry point
//!
//! Consumes traffic records from NATS, classifies each one with the loaded
//! model bundle, and publishes a verdict per record.

use anyhow::{Context, Result};
use futures::StreamExt;
use nids_classifier::{
    config::{AppConfig, LogFormat, LoggingConfig},
    consumer::{decode_submission, RecordConsumer},
    metrics::{ClassifierMetrics, MetricsReporter},
    producer::VerdictProducer,
    service::DetectionService,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    info!("Starting NIDS classifier");

    // Missing or inconsistent artifacts abort startup
    let service = DetectionService::load(&config.model.bundle_dir, config.model.onnx_threads)
        .with_context(|| format!("Failed to load model bundle {}", config.model.bundle_dir))?;
    info!(
        model = %service.model_id(),
        schema = %service.schema(),
        features = service.encoder().feature_count(),
        convention = ?service.invoker().convention(),
        "Detection service ready"
    );

    let metrics = Arc::new(ClassifierMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RecordConsumer::new(client.clone(), &config.nats.record_subject);
    let producer = VerdictProducer::new(client.clone(), &config.nats.verdict_subject);
    info!(
        records = %consumer.subject(),
        verdicts = %producer.subject(),
        "Starting record processing loop"
    );

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut subscription = consumer.subscribe().await?;

    // Records are handled one at a time in arrival order.
    loop {
        tokio::select! {
            message = subscription.next() => {
                let Some(message) = message else {
                    warn!("Record subscription closed");
                    break;
                };
                handle_payload(&service, &producer, &metrics, &message.payload).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Classifier shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn handle_payload(
    service: &DetectionService,
    producer: &VerdictProducer,
    metrics: &ClassifierMetrics,
    payload: &[u8],
) {
    let submission = match decode_submission(payload) {
        Ok(submission) => submission,
        Err(e) => {
            metrics.record_decode_failure();
            warn!(error = %e, "Failed to deserialize record");
            return;
        }
    };

    let start_time = Instant::now();
    let verdict = service.verdict(&submission);
    let processing_time = start_time.elapsed();
    metrics.record_verdict(processing_time, &verdict);

    debug!(
        verdict_id = %verdict.verdict_id,
        record_id = ?verdict.record_id,
        label = ?verdict.label(),
        processing_time_us = processing_time.as_micros(),
        "Record processed"
    );

    if let Err(e) = producer.publish(&verdict).await {
        error!(verdict_id = %verdict.verdict_id, error = %e, "Failed to publish verdict");
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nids_classifier={}", logging.level)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}
