//! One background task per pod: owns that pod's [`PodClient`] and the
//! watermark used to ask only for entries newer than the last round.
//!
//! Grounded on `internal/manager/rpaasPodWorker.go`: `ReadZoneChan` /
//! `WriteZoneChan` / `StopChan` become `mpsc` channels here; `RoundSmallestLast`
//! is the minimum monotonic `last` seen across reads, tracked here (not by
//! the caller) and recovered from each decoded entry's wall-clock `last` via
//! [`to_monotonic`], since the codec converts to wall clock before the zone
//! ever reaches this worker. A read slower than `warn_zone_read_time` is
//! logged at `warn` rather than treated as an error, matching the
//! original's `config.Spec.WarnZoneReadTime` check. Each read is dispatched
//! to a helper task (`go func() { ... }()` in the original) so the worker
//! loop stays responsive to writes/stop/shutdown while a read is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::metrics::{Metrics, PodLabels};
use crate::model::{to_monotonic, Zone};
use crate::pod_client::PodClient;
use crate::registry::Worker;

/// Request to read a zone from this pod. The watermark used is the
/// worker's own tracked minimum, not supplied by the caller.
pub struct ReadRequest {
    pub zone: String,
    pub reply: mpsc::Sender<ZoneResult>,
}

/// Request to push an aggregated zone back to this pod.
pub struct WriteRequest {
    pub zone: Zone,
}

/// Outcome of a read, delivered on the shared per-instance result channel.
/// `None` zone content signals the read failed; the instance sync worker
/// treats a failed pod as simply absent from this round's snapshot set,
/// per `aggregate`'s "entries present on no pod vanish" behavior.
pub struct ZoneResult {
    pub pod_id: String,
    pub zone: Option<Zone>,
}

pub struct PodWorkerHandle {
    id: String,
    read_tx: mpsc::Sender<ReadRequest>,
    write_tx: mpsc::Sender<WriteRequest>,
    stop_tx: mpsc::Sender<()>,
}

impl Worker for PodWorkerHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

impl PodWorkerHandle {
    pub async fn read(&self, zone: &str) -> Option<Zone> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        if self
            .read_tx
            .send(ReadRequest {
                zone: zone.to_string(),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.recv().await.and_then(|r| r.zone)
    }

    pub async fn write(&self, zone: Zone) {
        let _ = self.write_tx.send(WriteRequest { zone }).await;
    }
}

/// Spawns the pod worker task and returns a handle for the registry.
///
/// `warn_zone_read_time` matches the Go original's per-worker configured
/// threshold; `shutdown` is the instance-wide broadcast receiver so a
/// single call can stop every pod worker alongside its sync worker.
pub fn spawn(
    pod_id: String,
    instance_name: String,
    client: PodClient,
    metrics: Arc<Metrics>,
    warn_zone_read_time: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> PodWorkerHandle {
    let (read_tx, mut read_rx) = mpsc::channel::<ReadRequest>(16);
    let (write_tx, mut write_rx) = mpsc::channel::<WriteRequest>(16);
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    let handle = PodWorkerHandle {
        id: pod_id.clone(),
        read_tx,
        write_tx,
        stop_tx,
    };

    let round_smallest_last: Arc<Mutex<Option<i64>>> = Arc::new(Mutex::new(None));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(req) = read_rx.recv() => {
                    let client = client.clone();
                    let metrics = Arc::clone(&metrics);
                    let pod_id = pod_id.clone();
                    let instance_name = instance_name.clone();
                    let round_smallest_last = Arc::clone(&round_smallest_last);

                    tokio::spawn(async move {
                        let watermark = *round_smallest_last.lock();
                        let labels = PodLabels {
                            instance: instance_name,
                            pod: pod_id.clone(),
                            zone: req.zone.clone(),
                        };

                        let started = Instant::now();
                        let result = client.fetch(&req.zone, watermark).await;
                        let elapsed = started.elapsed();

                        metrics
                            .pod_read_latency
                            .get_or_create(&labels)
                            .observe(elapsed.as_secs_f64());
                        metrics.pod_read_operations.get_or_create(&labels).inc();

                        if elapsed > warn_zone_read_time {
                            warn!(pod = %pod_id, zone = %req.zone, elapsed_ms = elapsed.as_millis(), "slow pod read");
                        }

                        let zone = match result {
                            Ok(zone) => {
                                let round_min = zone
                                    .entries
                                    .iter()
                                    .map(|e| to_monotonic(e.last, &zone.header))
                                    .min();
                                if let Some(round_min) = round_min {
                                    let mut smallest = round_smallest_last.lock();
                                    *smallest = Some(match *smallest {
                                        Some(prev) => prev.min(round_min),
                                        None => round_min,
                                    });
                                }
                                Some(zone)
                            }
                            Err(err) => {
                                warn!(pod = %pod_id, zone = %req.zone, error = %err, "pod read failed");
                                None
                            }
                        };
                        let _ = req.reply.send(ZoneResult { pod_id, zone }).await;
                    });
                }
                Some(req) = write_rx.recv() => {
                    if let Err(err) = client.push(&req.zone).await {
                        warn!(pod = %pod_id, zone = %req.zone.name, error = %err, "pod write failed");
                    }
                }
                _ = stop_rx.recv() => {
                    debug!(pod = %pod_id, "pod worker stopping");
                    break;
                }
                _ = shutdown.recv() => {
                    debug!(pod = %pod_id, "pod worker stopping on instance shutdown");
                    break;
                }
            }
        }
    });

    handle
}
