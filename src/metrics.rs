//! Performance metrics and statistics tracking for the case engine service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

use crate::engine::AnalysisReport;
use crate::types::case::RiskLevel;

/// How a summary request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryOutcome {
    Generated,
    Fallback,
    Failed,
}

impl SummaryOutcome {
    fn label(&self) -> &'static str {
        match self {
            SummaryOutcome::Generated => "generated",
            SummaryOutcome::Fallback => "fallback",
            SummaryOutcome::Failed => "failed",
        }
    }
}

/// Metrics collector for the service
pub struct PipelineMetrics {
    /// Batches analyzed
    pub batches_processed: AtomicU64,
    /// Transactions across all batches
    pub transactions_processed: AtomicU64,
    /// Transactions flagged anomalous
    pub anomalies_flagged: AtomicU64,
    /// Cases produced
    pub cases_detected: AtomicU64,
    /// Cases by risk level
    cases_by_level: RwLock<HashMap<RiskLevel, u64>>,
    /// Summary requests by outcome
    summaries: RwLock<HashMap<SummaryOutcome, u64>>,
    /// Batch analysis times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Case risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            transactions_processed: AtomicU64::new(0),
            anomalies_flagged: AtomicU64::new(0),
            cases_detected: AtomicU64::new(0),
            cases_by_level: RwLock::new(HashMap::new()),
            summaries: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record an analyzed batch
    pub fn record_batch(&self, processing_time: Duration, report: &AnalysisReport) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.transactions_processed
            .fetch_add(report.transactions as u64, Ordering::Relaxed);
        self.anomalies_flagged
            .fetch_add(report.anomalies as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a detected case
    pub fn record_case(&self, risk_score: f64, level: RiskLevel) {
        self.cases_detected.fetch_add(1, Ordering::Relaxed);

        let bucket = (risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
        if let Ok(mut by_level) = self.cases_by_level.write() {
            *by_level.entry(level).or_insert(0) += 1;
        }
    }

    /// Record a summary request
    pub fn record_summary(&self, outcome: SummaryOutcome) {
        if let Ok(mut summaries) = self.summaries.write() {
            *summaries.entry(outcome).or_insert(0) += 1;
        }
    }

    /// Get batch processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Transactions per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn get_cases_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.cases_by_level
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_summary_count(&self, outcome: SummaryOutcome) -> u64 {
        self.summaries
            .read()
            .ok()
            .and_then(|m| m.get(&outcome).copied())
            .unwrap_or(0)
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let tx_count = self.transactions_processed.load(Ordering::Relaxed);
        let anomalies = self.anomalies_flagged.load(Ordering::Relaxed);
        let cases = self.cases_detected.load(Ordering::Relaxed);
        let anomaly_rate = if tx_count > 0 {
            (anomalies as f64 / tx_count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let by_level = self.get_cases_by_level();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             FRAUD CASE ENGINE - METRICS SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batches: {:>8}  │  Transactions: {:>8}  │  {:>6.1} tx/s ║",
            batches, tx_count, throughput
        );
        info!(
            "║ Anomalies: {:>8} ({:>5.1}%)  │  Cases: {:>8}            ║",
            anomalies, anomaly_rate, cases
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batch Time (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        let summaries: Vec<String> = [
            SummaryOutcome::Generated,
            SummaryOutcome::Fallback,
            SummaryOutcome::Failed,
        ]
        .iter()
        .map(|o| format!("{}={}", o.label(), self.get_summary_count(*o)))
        .collect();
        info!("║ Summaries: {}", summaries.join(" "));
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Cases by Risk Level:                                         ║");
        for level in [RiskLevel::Critical, RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            let count = by_level.get(&level).copied().unwrap_or(0);
            let pct = if cases > 0 {
                (count as f64 / cases as f64) * 100.0
            } else {
                0.0
            };
            info!(
                "║   {:10}: {:>6} ({:>5.1}%)                                ║",
                format!("{:?}", level),
                count,
                pct
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Case Risk Distribution:                                      ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
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

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
