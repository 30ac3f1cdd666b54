//! Basic usage examples for Pool

use esox_resourcepool::{Listener, Pool, PoolConfiguration, Resource, ResourceSignals, Subscription};
use std::time::Duration;

/// A pretend worker process: ready once started, ready again after each job.
struct Worker {
    signals: ResourceSignals,
}

impl Worker {
    fn start() -> Self {
        let signals = ResourceSignals::new();
        let ready = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ready.emit_ready();
        });
        Worker { signals }
    }

    fn run_job(&self, name: &str) {
        println!("   running {}", name);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signals.emit_ready();
        });
    }
}

#[async_trait::async_trait]
impl Resource for Worker {
    type Error = std::io::Error;

    fn on_ready(&self, listener: Listener) -> Subscription {
        self.signals.on_ready(listener)
    }

    fn on_failed(&self, listener: Listener) -> Subscription {
        self.signals.on_failed(listener)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        println!("   worker closed");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Basic Examples ===\n");

    // Example 1: Allocate and release
    allocate_and_release().await;

    // Example 2: Reuse of idle workers
    reuse().await;

    // Example 3: Metrics and health
    metrics_and_health().await;
}

async fn allocate_and_release() {
    println!("1. Allocate and Release:");
    let pool = Pool::new(Worker::start, PoolConfiguration::new().with_max_count(2));

    let worker = pool.allocate().await.unwrap();
    println!("   Got worker {}", worker.id());
    worker.run_job("job-a");

    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("   Idle after job: {}\n", pool.state().idle);
}

async fn reuse() {
    println!("2. Reuse:");
    let pool = Pool::new(Worker::start, PoolConfiguration::new().with_max_count(2));

    let first = pool.allocate().await.unwrap();
    first.run_job("job-b");
    let second = pool.allocate().await.unwrap();
    println!(
        "   Same worker reused: {} (created {})\n",
        first.same_resource(&second),
        pool.get_metrics().total_created
    );
}

async fn metrics_and_health() {
    println!("3. Metrics and Health:");
    let pool = Pool::new(Worker::start, PoolConfiguration::new().with_max_count(1));

    let worker = pool.allocate().await.unwrap();
    let health = pool.get_health_status();
    println!("   Healthy: {}", health.is_healthy());
    for warning in &health.warnings {
        println!("   Warning: {}", warning);
    }
    worker.run_job("job-c");

    tokio::time::sleep(Duration::from_millis(20)).await;
    for (key, value) in pool.export_metrics() {
        println!("   {} = {}", key, value);
    }
    println!();
}
