//! Performance benchmarks for the BandHub server
//!
//! Measures latency and throughput of reads and owner-checked writes. The
//! server executes every command on one thread, so the concurrent numbers
//! show how much a busy client slows everyone else down.

use bandhub::{BandDraft, Client};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[derive(Parser, Debug)]
#[command(author, version, about = "BandHub benchmark", long_about = None)]
struct Args {
    /// Address of a running server
    #[arg(long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Operations per single-client benchmark
    #[arg(long, default_value_t = 2000)]
    operations: usize,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Latency at quantile `q` of an already sorted sample, in milliseconds
fn quantile_ms(sorted: &[Duration], q: f64) -> f64 {
    let rank = ((sorted.len() as f64 * q) as usize).min(sorted.len().saturating_sub(1));
    sorted.get(rank).copied().map(millis).unwrap_or(0.0)
}

/// Timings gathered for one benchmark run
struct Report {
    label: String,
    operations: usize,
    elapsed: Duration,
    samples: Vec<Duration>,
}

impl Report {
    fn new(label: impl Into<String>, operations: usize, elapsed: Duration, mut samples: Vec<Duration>) -> Self {
        samples.sort_unstable();
        Self {
            label: label.into(),
            operations,
            elapsed,
            samples,
        }
    }

    fn mean_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().copied().map(millis).sum::<f64>() / self.samples.len() as f64
    }

    fn print(&self) {
        println!("--- {} ---", self.label);
        println!(
            "{} requests in {:.2}s ({:.0} req/s)",
            self.operations,
            self.elapsed.as_secs_f64(),
            self.operations as f64 / self.elapsed.as_secs_f64()
        );
        println!(
            "latency ms: mean {:.2}, p50 {:.2}, p95 {:.2}, p99 {:.2}",
            self.mean_ms(),
            quantile_ms(&self.samples, 0.50),
            quantile_ms(&self.samples, 0.95),
            quantile_ms(&self.samples, 0.99)
        );
        println!();
    }
}

/// Connect and log in as a benchmark user, registering it on first use
async fn connect_as(server_addr: &str, username: &str) -> Result<Client, Box<dyn std::error::Error + Send + Sync>> {
    let mut client = Client::connect(server_addr).await?;
    if !client.login(username, "bench").await?.is_success() {
        let response = client.register(username, "bench").await?;
        if !response.is_success() {
            return Err(response.message.into());
        }
    }
    Ok(client)
}

fn bench_band(i: usize) -> BandDraft {
    BandDraft::new(format!("bench_band_{}", i), i as f64, 0.0, (i % 50 + 1) as i64, (i % 7) as i64)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    println!("benchmarking {}", args.server);

    let mut attempts = 0;
    while let Err(err) = Client::connect(&args.server).await {
        attempts += 1;
        if attempts == 50 {
            return Err(format!("no server at {}: {}", args.server, err).into());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    run_single_client_benchmarks(&args.server, args.operations).await?;
    run_concurrent_benchmarks(&args.server).await?;

    // leave the collection as we found it
    let mut client = connect_as(&args.server, "bench_single").await?;
    client.clear().await?;
    client.close().await?;

    Ok(())
}

async fn run_single_client_benchmarks(server_addr: &str, operations: usize) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("single client");

    let add_results = benchmark_add_operations(server_addr, operations).await?;
    add_results.print();

    let load_results = benchmark_load_operations(server_addr, operations / 10).await?;
    load_results.print();

    Ok(())
}

async fn run_concurrent_benchmarks(server_addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("concurrent clients");

    for num_clients in [10, 50] {
        let results = benchmark_concurrent_operations(server_addr, num_clients, 200).await?;
        results.print();
    }

    Ok(())
}

async fn benchmark_add_operations(server_addr: &str, num_operations: usize) -> Result<Report, Box<dyn std::error::Error + Send + Sync>> {
    let mut client = connect_as(server_addr, "bench_single").await?;
    let mut latencies = Vec::with_capacity(num_operations);

    let start = Instant::now();

    for i in 0..num_operations {
        let op_start = Instant::now();
        client.add(bench_band(i)).await?;
        latencies.push(op_start.elapsed());
    }

    let total_duration = start.elapsed();
    client.close().await?;

    Ok(Report::new("add", num_operations, total_duration, latencies))
}

async fn benchmark_load_operations(server_addr: &str, num_operations: usize) -> Result<Report, Box<dyn std::error::Error + Send + Sync>> {
    let mut client = Client::connect(server_addr).await?;
    let mut latencies = Vec::with_capacity(num_operations);

    let start = Instant::now();

    for _ in 0..num_operations {
        let op_start = Instant::now();
        let _bands = client.load().await?;
        latencies.push(op_start.elapsed());
    }

    let total_duration = start.elapsed();
    client.close().await?;

    Ok(Report::new("load", num_operations, total_duration, latencies))
}

async fn benchmark_concurrent_operations(
    server_addr: &str,
    num_clients: usize,
    ops_per_client: usize,
) -> Result<Report, Box<dyn std::error::Error + Send + Sync>> {
    let semaphore = Arc::new(Semaphore::new(num_clients));
    let mut handles = Vec::new();
    let mut all_latencies = Vec::new();

    let start = Instant::now();

    for client_id in 0..num_clients {
        let semaphore = Arc::clone(&semaphore);
        let server_addr = server_addr.to_string();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.map_err(|e| format!("Semaphore error: {}", e))?;
            let username = format!("bench_client_{}", client_id);
            let mut client = connect_as(&server_addr, &username)
                .await
                .map_err(|e| format!("Connect error: {}", e))?;
            let mut latencies = Vec::with_capacity(ops_per_client);

            for i in 0..ops_per_client {
                let op_start = Instant::now();
                client.add(bench_band(i)).await.map_err(|e| format!("Add error: {}", e))?;
                latencies.push(op_start.elapsed());
            }

            client.clear().await.map_err(|e| format!("Clear error: {}", e))?;
            client.close().await.map_err(|e| format!("Close error: {}", e))?;
            Ok::<Vec<Duration>, String>(latencies)
        });

        handles.push(handle);
    }

    for handle in handles {
        let latencies = handle.await.map_err(|e| format!("Join error: {}", e))?.map_err(|e| format!("Task error: {}", e))?;
        all_latencies.extend(latencies);
    }

    let total_duration = start.elapsed();
    let total_operations = num_clients * ops_per_client;

    Ok(Report::new(format!("add, {} concurrent clients", num_clients), total_operations, total_duration, all_latencies))
}
