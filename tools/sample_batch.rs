//! Sample Batch Producer
//!
//! Generates a synthetic transaction batch (ordinary traffic plus a small
//! ring of suspicious transactions sharing one device and IP) and publishes
//! it to the engine's batch subject.

use chrono::{Duration as ChronoDuration, Utc};
use fraud_case_engine::{Case, Transaction};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

const CHANNELS: [&str; 4] = ["POS", "WEB", "MOBILE", "ATM"];

/// Synthetic transaction generator
struct BatchGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
}

impl BatchGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.transaction_counter += 1;
        format!("tx_{:012}", self.transaction_counter)
    }

    /// Ordinary purchase by one of many customers
    fn generate_legitimate(&mut self) -> Transaction {
        let id = self.next_id();
        let customer = self.rng.gen_range(1..200);
        let timestamp = Utc::now() - ChronoDuration::minutes(self.rng.gen_range(0..600));

        Transaction::new(
            id,
            format!("CUST-{:04}", customer),
            format!("ACC-{:04}", customer),
            format!("M-{:03}", self.rng.gen_range(1..300)),
            (self.rng.gen_range(5.0..250.0_f64) * 100.0).round() / 100.0,
            timestamp,
            self.random_choice(&CHANNELS),
        )
        .with_device(format!("dev_{:08x}", self.rng.gen::<u32>()))
        .with_ip(self.random_ip())
        .with_country(self.random_choice(&["US", "UK", "CA", "DE", "FR"]))
        .with_currency(self.random_choice(&["USD", "EUR", "GBP", "CAD"]))
    }

    /// Large purchases spread over several accounts but one device and IP
    fn generate_ring(&mut self, size: usize) -> Vec<Transaction> {
        let device = format!("dev_{:08x}", self.rng.gen::<u32>());
        let ip = self.random_ip();
        let now = Utc::now();

        (0..size)
            .map(|i| {
                let id = self.next_id();
                let mule = 900 + i;
                Transaction::new(
                    id,
                    format!("CUST-{:04}", mule),
                    format!("ACC-{:04}", mule),
                    "M-GIFTCARDS",
                    (self.rng.gen_range(2_000.0..9_000.0_f64) * 100.0).round() / 100.0,
                    now - ChronoDuration::minutes(i as i64),
                    "WEB",
                )
                .with_device(device.clone())
                .with_ip(ip.clone())
                .with_country("RU")
            })
            .collect()
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn generate_batch(&mut self, size: usize, ring_size: usize) -> Vec<Transaction> {
        let ring_size = ring_size.min(size);
        let mut batch: Vec<Transaction> = (0..size - ring_size)
            .map(|_| self.generate_legitimate())
            .collect();
        batch.extend(self.generate_ring(ring_size));
        batch
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_batch=info".parse()?),
        )
        .init();

    info!("Starting Sample Batch Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions.batch");
    let batch_size: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(500);
    let ring_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(5);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        batch_size,
        ring_size,
        "Configuration loaded"
    );

    let mut generator = BatchGenerator::new();
    let batch = generator.generate_batch(batch_size, ring_size);

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&batch);
        }
    };

    let payload = serde_json::to_vec(&batch)?;
    let request = client.request(subject.to_string(), payload.into());

    match tokio::time::timeout(Duration::from_secs(30), request).await {
        Ok(Ok(reply)) => match serde_json::from_slice::<Vec<Case>>(&reply.payload) {
            Ok(cases) => {
                info!("Engine reported {} cases", cases.len());
                for case in &cases {
                    info!(
                        case_id = %case.case_id,
                        customer_id = %case.customer_id,
                        transactions = case.transactions.len(),
                        risk_score = format!("{:.3}", case.risk_score),
                        "Case"
                    );
                }
            }
            Err(_) => warn!(
                reply = %String::from_utf8_lossy(&reply.payload),
                "Engine replied with an error"
            ),
        },
        Ok(Err(e)) => warn!(error = %e, "Batch request failed"),
        Err(_) => warn!("No reply from engine within 30s"),
    }

    info!(
        "Completed! Published {} transactions ({} in the suspicious ring)",
        batch.len(),
        ring_size.min(batch_size)
    );

    Ok(())
}

fn run_dry_mode(batch: &[Transaction]) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");
    println!("{}", serde_json::to_string_pretty(batch)?);
    Ok(())
}
