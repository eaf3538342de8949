//! Test Record Producer
//!
//! Generates connection records in the `selected` schema and publishes them
//! to NATS for exercising the classifier.

use nids_classifier::types::record::{RecordSubmission, TrafficRecord};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
    record_counter: u64,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            record_counter: 0,
        }
    }

    fn next_id(&mut self) -> Option<String> {
        self.record_counter += 1;
        Some(format!("rec_{:012}", self.record_counter))
    }

    /// Generate an ordinary established connection
    fn generate_normal(&mut self) -> RecordSubmission {
        let record_id = self.next_id();
        let service = self.random_choice(&["http", "smtp", "domain_u", "ftp_data", "private"]);
        let protocol = if service == "domain_u" { "udp" } else { "tcp" };

        let record = TrafficRecord::new()
            .with("protocol_type", protocol)
            .with("service", service)
            .with("flag", "SF")
            .with("count", self.rng.gen_range(1..20) as f64)
            .with("srv_count", self.rng.gen_range(1..20) as f64)
            .with("src_bytes", self.rng.gen_range(100..2000) as f64)
            .with("dst_bytes", self.rng.gen_range(0..20000) as f64)
            .with("logged_in", if protocol == "tcp" { 1.0 } else { 0.0 })
            .with("same_srv_rate", self.rng.gen_range(0.8..=1.0))
            .with("dst_host_count", self.rng.gen_range(1..255) as f64)
            .with("dst_host_same_src_port_rate", self.rng.gen_range(0.0..0.1))
            .with("dst_host_srv_diff_host_rate", self.rng.gen_range(0.0..0.1));

        RecordSubmission { record_id, record }
    }

    /// Generate a SYN-flood style half-open connection
    fn generate_attack(&mut self) -> RecordSubmission {
        let record_id = self.next_id();
        let service = self.random_choice(&["private", "http", "telnet", "finger", "other"]);

        let record = TrafficRecord::new()
            .with("protocol_type", "tcp")
            .with("service", service)
            .with("flag", self.random_choice(&["S0", "REJ", "RSTO"]))
            .with("count", self.rng.gen_range(100..511) as f64)
            .with("srv_count", self.rng.gen_range(1..30) as f64)
            .with("src_bytes", 0.0)
            .with("dst_bytes", 0.0)
            .with("logged_in", 0.0)
            .with("same_srv_rate", self.rng.gen_range(0.0..0.1))
            .with("dst_host_count", 255.0)
            .with("dst_host_same_src_port_rate", self.rng.gen_range(0.0..0.05))
            .with("dst_host_srv_diff_host_rate", 0.0);

        RecordSubmission { record_id, record }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("record_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Record Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("traffic.records");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let attack_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.2f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        attack_rate = attack_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, attack_rate, delay_ms).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} records...", count);

    let mut normal_count = 0;
    let mut attack_count = 0;

    for i in 0..count {
        let submission = if rng.gen_bool(attack_rate) {
            attack_count += 1;
            generator.generate_attack()
        } else {
            normal_count += 1;
            generator.generate_normal()
        };

        let payload = serde_json::to_vec(&submission)?;
        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} records ({} normal, {} attack)",
                i + 1,
                count,
                normal_count,
                attack_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;

    info!(
        "Completed! Published {} records ({} normal, {} attack)",
        count, normal_count, attack_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, attack_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let submission = if rng.gen_bool(attack_rate) {
            generator.generate_attack()
        } else {
            generator.generate_normal()
        };

        let json = serde_json::to_string_pretty(&submission)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample record {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
