//! Generic handle registry for running background workers.
//!
//! Both pod workers and instance sync workers are registered here under
//! their own `DashMap`; the registry only knows how to start, stop, count
//! and enumerate handles; it has no opinion on what a worker does.
//!
//! Grounded on the teacher's `DashMap`-backed connection/worker bookkeeping
//! in `web3_proxy/src/rpcs/blockchain.rs` and the shutdown-broadcast
//! pattern in `web3_proxy/src/app_stats_old.rs`; the add/remove/count
//! surface mirrors `AddPodWorker`/`RemovePodWorker`/`CountWorkers` from
//! `internal/manager/rpaasInstanceSyncWorker.go`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::RegistryError;

/// A handle to a spawned background task. `id()` must be stable for the
/// lifetime of the worker; it is the registry's lookup key.
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;

    /// Signals the worker to stop. Does not block on shutdown completing —
    /// callers that need that use the worker's own join handle, if any.
    fn stop(&self);
}

/// Keyed collection of live workers plus a shutdown broadcast all newly
/// spawned workers should subscribe to, so the whole registry can be torn
/// down in one call.
pub struct Registry<W: Worker + ?Sized> {
    workers: DashMap<String, Arc<W>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<W: Worker + ?Sized> Registry<W> {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = broadcast::channel(1);
        Self {
            workers: DashMap::new(),
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn broadcast_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn insert(&self, worker: Arc<W>) {
        self.workers.insert(worker.id().to_string(), worker);
    }

    pub fn get(&self, id: &str) -> Option<Arc<W>> {
        self.workers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and stops the worker, if present.
    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        match self.workers.remove(id) {
            Some((_, worker)) => {
                worker.stop();
                Ok(())
            }
            None => Err(RegistryError::PodNotFound(id.to_string())),
        }
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.workers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<W>)) {
        for entry in self.workers.iter() {
            f(entry.value());
        }
    }
}

impl<W: Worker + ?Sized> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct StubWorker {
        id: String,
        stopped: Arc<Mutex<bool>>,
    }

    impl Worker for StubWorker {
        fn id(&self) -> &str {
            &self.id
        }
        fn stop(&self) {
            *self.stopped.lock() = true;
        }
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let registry: Registry<StubWorker> = Registry::new();
        let stopped = Arc::new(Mutex::new(false));
        let worker = Arc::new(StubWorker {
            id: "pod-1".to_string(),
            stopped: Arc::clone(&stopped),
        });

        registry.insert(Arc::clone(&worker));
        assert_eq!(registry.count(), 1);
        assert!(registry.get("pod-1").is_some());

        registry.remove("pod-1").unwrap();
        assert_eq!(registry.count(), 0);
        assert!(*stopped.lock());
    }

    #[test]
    fn remove_missing_errors() {
        let registry: Registry<StubWorker> = Registry::new();
        let err = registry.remove("nope").unwrap_err();
        assert!(matches!(err, RegistryError::PodNotFound(id) if id == "nope"));
    }

    #[test]
    fn ids_lists_all_registered_workers() {
        let registry: Registry<StubWorker> = Registry::new();
        for i in 0..3 {
            registry.insert(Arc::new(StubWorker {
                id: format!("pod-{i}"),
                stopped: Arc::new(Mutex::new(false)),
            }));
        }
        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec!["pod-0", "pod-1", "pod-2"]);
    }
}
