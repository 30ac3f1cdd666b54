//! Async usage examples: concurrency, timeouts and failing resources

use esox_resourcepool::{
    Listener, LogLevel, Pool, PoolConfiguration, Resource, ResourceSignals, Subscription,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

static STARTED: AtomicUsize = AtomicUsize::new(0);

/// Every third connection fails while connecting.
struct Connection {
    number: usize,
    signals: ResourceSignals,
}

impl Connection {
    fn connect() -> Self {
        let number = STARTED.fetch_add(1, Ordering::Relaxed);
        let signals = ResourceSignals::new();
        let outcome = signals.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            if number % 3 == 2 {
                outcome.emit_failed();
            } else {
                outcome.emit_ready();
            }
        });
        Connection { number, signals }
    }

    async fn query(&self) {
        sleep(Duration::from_millis(25)).await;
        self.signals.emit_ready();
    }
}

#[async_trait::async_trait]
impl Resource for Connection {
    type Error = String;

    fn on_ready(&self, listener: Listener) -> Subscription {
        self.signals.on_ready(listener)
    }

    fn on_failed(&self, listener: Listener) -> Subscription {
        self.signals.on_failed(listener)
    }

    async fn close(&self) -> Result<(), String> {
        Err(format!("connection {} was already gone", self.number))
    }
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Async Examples ===\n");

    // Example 1: Concurrent access
    concurrent_access().await;

    // Example 2: Request timeout
    request_timeout().await;
}

async fn concurrent_access() {
    println!("1. Concurrent Access:");

    let config = PoolConfiguration::new()
        .with_max_count(3)
        .with_log_sink(Arc::new(|level: LogLevel, message: &str| {
            if level == LogLevel::Error {
                println!("   [{}] {}", level, message);
            }
        }));
    let pool = Pool::new(Connection::connect, config);

    let mut handles = vec![];
    for i in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            match pool.allocate().await {
                Ok(conn) => {
                    println!("   Task {} got connection {}", i, conn.number);
                    conn.query().await;
                }
                Err(e) => println!("   Task {} failed: {}", i, e),
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    println!("   Final state: {:?}\n", pool.state());
}

async fn request_timeout() {
    println!("2. Request Timeout:");

    let config = PoolConfiguration::new()
        .with_max_count(1)
        .with_request_timeout(Duration::from_millis(100));
    let pool = Pool::new(Connection::connect, config);

    let _held = loop {
        if let Ok(conn) = pool.allocate().await {
            break conn;
        }
    };

    match pool.allocate().await {
        Ok(_) => println!("   Got connection"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}
