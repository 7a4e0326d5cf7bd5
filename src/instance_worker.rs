//! One background task per rpaas instance: owns a pool of pod workers and
//! drives the periodic aggregation tick.
//!
//! Grounded on `internal/manager/rpaasInstanceSyncWorker.go`'s
//! `processTick`: fan out a read to every pod worker for a zone
//! concurrently (`join_all` over one future per pod, mirroring the
//! original's `go func() { ... }()` per pod), aggregate the zone's
//! snapshots against the carried `FullZoneState`, report the result, and
//! — when `persist_aggregated_data` is set — write the aggregated zone
//! back to every pod.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::aggregator::aggregate;
use crate::metrics::{InstanceLabels, Metrics};
use crate::model::{FullZoneState, InstanceReport, Zone};
use crate::pod_worker::PodWorkerHandle;
use crate::registry::{Registry, Worker};

pub struct InstanceSyncWorker {
    instance_name: String,
    zones: Vec<String>,
    pod_workers: Arc<Registry<PodWorkerHandle>>,
    full_zone_state: RwLock<HashMap<String, FullZoneState>>,
    metrics: Arc<Metrics>,
    tick_interval: Duration,
    warn_zone_collection_time: Duration,
    warn_zone_aggregation_time: Duration,
    persist_aggregated_data: bool,
    report_tx: mpsc::Sender<InstanceReport>,
    stop_tx: mpsc::Sender<()>,
}

impl Worker for InstanceSyncWorker {
    fn id(&self) -> &str {
        &self.instance_name
    }

    fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

impl InstanceSyncWorker {
    pub fn pod_workers(&self) -> &Arc<Registry<PodWorkerHandle>> {
        &self.pod_workers
    }

    async fn process_tick(&self) {
        let started = Instant::now();
        let mut failed_any = false;

        for zone_name in &self.zones {
            let mut pods = Vec::new();
            self.pod_workers.for_each(|w| pods.push(Arc::clone(w)));

            let collection_started = Instant::now();
            let reads = join_all(pods.iter().map(|pod| {
                let pod = Arc::clone(pod);
                let zone_name = zone_name.clone();
                async move { pod.read(&zone_name).await }
            }))
            .await;
            let collection_elapsed = collection_started.elapsed();
            if collection_elapsed > self.warn_zone_collection_time {
                warn!(
                    instance = %self.instance_name,
                    zone = %zone_name,
                    elapsed_ms = collection_elapsed.as_millis(),
                    "slow zone collection across pods"
                );
            }

            let mut snapshots: Vec<Zone> = Vec::new();
            for result in reads {
                match result {
                    Some(zone) => snapshots.push(zone),
                    None => failed_any = true,
                }
            }

            if snapshots.is_empty() {
                debug!(instance = %self.instance_name, zone = %zone_name, "no pod reported this zone this tick");
                continue;
            }

            let prior = {
                let state = self.full_zone_state.read().await;
                state.get(zone_name).cloned().unwrap_or_default()
            };

            let aggregation_started = Instant::now();
            let (aggregated, new_state) = aggregate(&snapshots, &prior);
            let aggregation_elapsed = aggregation_started.elapsed();
            if aggregation_elapsed > self.warn_zone_aggregation_time {
                warn!(
                    instance = %self.instance_name,
                    zone = %zone_name,
                    elapsed_ms = aggregation_elapsed.as_millis(),
                    "slow zone aggregation"
                );
            }

            self.metrics
                .rate_limit_entries
                .get_or_create(&InstanceLabels { instance: self.instance_name.clone() })
                .inc_by(aggregated.entries.len() as u64);

            {
                let mut state = self.full_zone_state.write().await;
                state.insert(zone_name.clone(), new_state);
            }

            if self.persist_aggregated_data {
                self.pod_workers.for_each(|w| {
                    let w = Arc::clone(w);
                    let zone = aggregated.clone();
                    tokio::spawn(async move {
                        w.write(zone).await;
                    });
                });
            }

            let _ = self
                .report_tx
                .send(InstanceReport {
                    instance_name: self.instance_name.clone(),
                    zones: vec![aggregated],
                })
                .await;
        }

        let labels = InstanceLabels { instance: self.instance_name.clone() };
        self.metrics
            .aggregation_duration
            .get_or_create(&labels)
            .observe(started.elapsed().as_secs_f64());
        if failed_any {
            self.metrics.aggregation_failures.get_or_create(&labels).inc();
        }
        self.metrics
            .active_workers
            .get_or_create(&labels)
            .set(self.pod_workers.count() as i64);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    instance_name: String,
    zones: Vec<String>,
    pod_workers: Arc<Registry<PodWorkerHandle>>,
    metrics: Arc<Metrics>,
    tick_interval: Duration,
    warn_zone_collection_time: Duration,
    warn_zone_aggregation_time: Duration,
    persist_aggregated_data: bool,
    report_tx: mpsc::Sender<InstanceReport>,
    mut shutdown: broadcast::Receiver<()>,
) -> Arc<InstanceSyncWorker> {
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    let worker = Arc::new(InstanceSyncWorker {
        instance_name: instance_name.clone(),
        zones,
        pod_workers,
        full_zone_state: RwLock::new(HashMap::new()),
        metrics,
        tick_interval,
        warn_zone_collection_time,
        warn_zone_aggregation_time,
        persist_aggregated_data,
        report_tx,
        stop_tx,
    });

    let task_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        let mut ticker = interval(task_worker.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    task_worker.process_tick().await;
                }
                _ = stop_rx.recv() => {
                    info!(instance = %instance_name, "instance sync worker stopping");
                    break;
                }
                _ = shutdown.recv() => {
                    info!(instance = %instance_name, "instance sync worker stopping on shutdown");
                    break;
                }
            }
        }
    });

    worker
}
