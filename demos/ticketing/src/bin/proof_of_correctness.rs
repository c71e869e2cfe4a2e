//! Load-correctness harness for the ticketing server.
//!
//! Fires `TOTAL_REQUESTS` purchases at `POST /buy_ticket` with at most
//! `WORKERS` in flight, then checks that exactly `EXPECTED_STOCK` tickets were
//! sold. A 503 is retried by the client with its own backoff; 200 and 410
//! are final.
//!
//! Run against a freshly started server (stock reset on start):
//!
//! ```text
//! cargo run --bin ticketing &
//! cargo run --bin proof_of_correctness
//! ```
//!
//! Exits with a non-zero status if the server oversold or undersold.

use anyhow::Context;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Harness settings, read from the environment.
#[derive(Debug, Clone)]
struct Settings {
    target_url: String,
    total_requests: usize,
    workers: usize,
    client_retries: u32,
    retry_base_delay: Duration,
    request_timeout: Duration,
    expected_stock: usize,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            target_url: std::env::var("TARGET_URL")
                .unwrap_or_else(|_| "http://localhost:8000/buy_ticket".to_string()),
            total_requests: env_or("TOTAL_REQUESTS", 200),
            workers: env_or("WORKERS", 50),
            client_retries: env_or("CLIENT_RETRIES", 2),
            retry_base_delay: Duration::from_millis(env_or("CLIENT_RETRY_DELAY_MS", 50)),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 3)),
            expected_stock: env_or("EXPECTED_STOCK", 100),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Final result of one simulated buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Sold,
    SoldOut,
    Busy,
    Failed,
}

#[derive(Debug, Default)]
struct Tally {
    sold: usize,
    sold_out: usize,
    busy: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Sold => self.sold += 1,
            Verdict::SoldOut => self.sold_out += 1,
            Verdict::Busy => self.busy += 1,
            Verdict::Failed => self.failed += 1,
        }
    }
}

/// One buyer: purchase, retrying 503 up to `client_retries` times.
async fn buy(client: &reqwest::Client, settings: &Settings) -> Verdict {
    let mut attempt = 0;
    loop {
        let status = match client.post(&settings.target_url).send().await {
            Ok(response) => response.status(),
            Err(_) => return Verdict::Failed,
        };

        match status {
            StatusCode::OK => return Verdict::Sold,
            StatusCode::GONE => return Verdict::SoldOut,
            StatusCode::SERVICE_UNAVAILABLE if attempt < settings.client_retries => {
                tokio::time::sleep(settings.retry_base_delay * 2_u32.pow(attempt)).await;
                attempt += 1;
            },
            StatusCode::SERVICE_UNAVAILABLE => return Verdict::Busy,
            _ => return Verdict::Failed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Arc::new(Settings::from_env());

    println!(
        "Launching {} purchases against {} ({} in flight)",
        settings.total_requests, settings.target_url, settings.workers
    );

    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
    let started = Instant::now();

    let handles = (0..settings.total_requests).map(|_| {
        let client = client.clone();
        let settings = Arc::clone(&settings);
        let permits = Arc::clone(&permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Verdict::Failed;
            };
            buy(&client, &settings).await
        })
    });

    let mut tally = Tally::default();
    for result in futures::future::join_all(handles).await {
        tally.record(result.unwrap_or(Verdict::Failed));
    }
    let elapsed = started.elapsed();

    println!("Completed in {:.2}s", elapsed.as_secs_f64());
    println!("  200 sold:      {}", tally.sold);
    println!("  410 sold out:  {}", tally.sold_out);
    println!("  503 busy:      {}", tally.busy);
    println!("  errors:        {}", tally.failed);

    let expected = settings.expected_stock;
    if tally.sold == expected {
        println!("SUCCESS: exactly {expected} tickets sold");
        Ok(())
    } else if tally.sold > expected {
        anyhow::bail!("OVERSOLD: {} tickets sold, stock was {expected}", tally.sold)
    } else {
        anyhow::bail!(
            "UNDERSOLD: {} tickets sold, stock was {expected} ({} busy, {} errors)",
            tally.sold,
            tally.busy,
            tally.failed
        )
    }
}
