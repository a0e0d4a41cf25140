// src/concurrency.rs
//
// Batch worker pool (spec §5): a bounded channel feeds a fixed pool of
// workers that each pull one address at a time and run it through the
// orchestrator, so a batch larger than `worker_concurrency` queues rather
// than spawning one task per address. Grounded on this codebase's
// load-shedder module's shape (atomics-backed stats alongside the
// processing loop) — narrowed from priority-tiered admission control to a
// plain bounded producer/consumer pool, since nothing in this spec calls
// for shedding low-priority work under load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::domain::{Address, RiskReport};
use crate::engine::orchestrator::Orchestrator;

/// §5: "batch per-address 30s wall-clock".
const PER_ADDRESS_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    worker_concurrency: usize,
    channel_capacity: usize,
    completed: AtomicU64,
    timed_out: AtomicU64,
}

impl BatchRunner {
    /// `channel_capacity` is proportional to `max_batch_size` per §5's
    /// backpressure requirement — large enough that a full batch doesn't
    /// block on enqueue, small enough it still bounds memory for very large
    /// batches fed incrementally by a caller.
    pub fn new(orchestrator: Arc<Orchestrator>, worker_concurrency: usize, max_batch_size: usize) -> Self {
        BatchRunner {
            orchestrator,
            worker_concurrency: worker_concurrency.max(1),
            channel_capacity: max_batch_size.max(1),
            completed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        }
    }

    /// Runs every address in `addresses` through the orchestrator, fanned
    /// out across `worker_concurrency` workers. Results are returned in
    /// completion order, not input order — callers that need input order
    /// should key off the `Address` in each result.
    pub async fn run(&self, addresses: Vec<Address>) -> Vec<(Address, Result<RiskReport>)> {
        let (tx, rx) = mpsc::channel::<Address>(self.channel_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(Address, Result<RiskReport>)>();

        let mut workers = Vec::with_capacity(self.worker_concurrency);
        for _ in 0..self.worker_concurrency {
            let rx = Arc::clone(&rx);
            let orchestrator = Arc::clone(&self.orchestrator);
            let result_tx = result_tx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(address) = next else { break };
                    let outcome = match tokio::time::timeout(PER_ADDRESS_TIMEOUT, orchestrator.analyze(&address)).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(address = address.as_str(), "analysis timed out");
                            Err(crate::errors::RiskError::Cancelled.into())
                        }
                    };
                    let _ = result_tx.send((address, outcome));
                }
            }));
        }
        drop(result_tx);

        let total = addresses.len();
        for address in addresses {
            if tx.send(address).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some((address, outcome)) = result_rx.recv().await {
            if outcome.is_err() {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            self.completed.fetch_add(1, Ordering::Relaxed);
            results.push((address, outcome));
        }

        for worker in workers {
            let _ = worker.await;
        }

        results
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::CommunityStore;
    use crate::config::Config;
    use crate::fetcher::Fetcher;
    use crate::label_registry::LabelRegistry;
    use crate::state::cache::Cache;

    async fn test_runner(worker_concurrency: usize) -> BatchRunner {
        let config = Config::default();
        let cache = Arc::new(Cache::new(std::env::temp_dir().join("riskloom-concurrency-test"), 0));
        let fetcher = Fetcher::new(&config, "http://127.0.0.1:0", cache);
        let registry = LabelRegistry::new();
        let orchestrator = Arc::new(Orchestrator::new(config, fetcher, registry, None::<Arc<CommunityStore>>));
        BatchRunner::new(orchestrator, worker_concurrency, 10)
    }

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    #[tokio::test]
    async fn processes_every_address_exactly_once() {
        let runner = test_runner(2).await;
        let addresses = vec![addr(1), addr(2), addr(3), addr(4)];
        let results = runner.run(addresses.clone()).await;
        assert_eq!(results.len(), addresses.len());
        assert_eq!(runner.completed(), addresses.len() as u64);
    }

    #[tokio::test]
    async fn empty_batch_produces_empty_results() {
        let runner = test_runner(2).await;
        let results = runner.run(Vec::new()).await;
        assert!(results.is_empty());
    }
}
