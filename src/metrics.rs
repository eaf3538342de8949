//! Classification counters and latency statistics.

use crate::types::verdict::{Label, Outcome, Prediction, Verdict};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the classifier
pub struct ClassifierMetrics {
    /// Records that produced a label
    pub records_classified: AtomicU64,
    pub anomalies: AtomicU64,
    pub normals: AtomicU64,
    /// Payloads that could not be decoded as a record
    pub decode_failures: AtomicU64,
    /// Rejected records by error kind
    rejections: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Anomaly score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ClassifierMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            records_classified: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            normals: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            rejections: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a classified record
    pub fn record_classification(&self, processing_time: Duration, prediction: &Prediction) {
        self.records_classified.fetch_add(1, Ordering::Relaxed);
        match prediction.label {
            Label::Anomaly => self.anomalies.fetch_add(1, Ordering::Relaxed),
            Label::Normal => self.normals.fetch_add(1, Ordering::Relaxed),
        };

        self.push_time(processing_time);

        if let Some(score) = prediction.score {
            let bucket = (score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
            if let Ok(mut buckets) = self.score_buckets.write() {
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a rejected record
    pub fn record_rejection(&self, processing_time: Duration, kind: &str) {
        self.push_time(processing_time);
        if let Ok(mut by_kind) = self.rejections.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the outcome carried by a published verdict
    pub fn record_verdict(&self, processing_time: Duration, verdict: &Verdict) {
        match &verdict.outcome {
            Outcome::Classified { label, score } => self.record_classification(
                processing_time,
                &Prediction {
                    label: *label,
                    score: *score,
                },
            ),
            Outcome::Rejected { kind, .. } => self.record_rejection(processing_time, kind),
        }
    }

    /// Record a payload that could not be decoded
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn push_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.5),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (records per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_classified.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get counts per 0.1-wide score bucket
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get rejection counts by error kind
    pub fn get_rejections(&self) -> HashMap<String, u64> {
        self.rejections
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Total rejected records
    pub fn total_rejections(&self) -> u64 {
        self.get_rejections().values().sum()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let classified = self.records_classified.load(Ordering::Relaxed);
        let anomalies = self.anomalies.load(Ordering::Relaxed);
        let normals = self.normals.load(Ordering::Relaxed);
        let anomaly_rate = if classified > 0 {
            (anomalies as f64 / classified as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let rejections = self.get_rejections();

        info!(
            classified = classified,
            anomalies = anomalies,
            normals = normals,
            anomaly_rate = format!("{:.1}%", anomaly_rate),
            rejected = self.total_rejections(),
            decode_failures = self.decode_failures.load(Ordering::Relaxed),
            throughput = format!("{:.1} rec/s", self.get_throughput()),
            "Classifier summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        for (kind, count) in &rejections {
            info!(kind = %kind, count = count, "Rejections");
        }

        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        if total > 0 {
            for (i, &count) in score_dist.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "score {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
    }
}

impl Default for ClassifierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic summary reporter
pub struct MetricsReporter {
    metrics: Arc<ClassifierMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a reporter logging a summary every `interval_secs`
    pub fn new(metrics: Arc<ClassifierMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
