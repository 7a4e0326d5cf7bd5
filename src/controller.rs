//! Admission API: the surface the outside world uses to declare which
//! instances and pods exist. No Kubernetes reconcile loop is implemented —
//! `controllers/controller.go`'s CRD watch is explicitly out of scope;
//! this is the in-process equivalent of its `AddPodWorker`/
//! `RemovePodWorker` calls, reachable over HTTP.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::config::Config;
use crate::error::{PodClientError, RegistryError};
use crate::instance_worker::{self, InstanceSyncWorker};
use crate::metrics::Metrics;
use crate::model::InstanceReport;
use crate::pod_client::{PodClient, PodClientConfig};
use crate::pod_worker::{self, PodWorkerHandle};
use crate::registry::Registry;

/// Everything the HTTP layer needs to serve admission requests and
/// read-outs: the instance registry plus the shared pieces every instance
/// worker is built from.
pub struct Controller {
    instances: Registry<InstanceSyncWorker>,
    metrics: Arc<Metrics>,
    config: Config,
    pod_client_config: PodClientConfig,
    report_tx: mpsc::Sender<InstanceReport>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Controller {
    pub fn new(config: Config, metrics: Arc<Metrics>, report_tx: mpsc::Sender<InstanceReport>) -> Self {
        let (shutdown_tx, _rx) = broadcast::channel(1);
        let pod_client_config = PodClientConfig {
            admin_port: config.admin_port,
            request_timeout: config.pod_request_timeout,
            ..PodClientConfig::default()
        };
        Self {
            instances: Registry::new(),
            metrics,
            config,
            pod_client_config,
            report_tx,
            shutdown_tx,
        }
    }

    pub fn instances(&self) -> &Registry<InstanceSyncWorker> {
        &self.instances
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Registers a new instance with no pods yet; pods are added with
    /// [`Controller::add_pod`].
    pub fn add_instance(&self, instance_name: &str, zones: Vec<String>) {
        let pod_workers = Arc::new(Registry::<PodWorkerHandle>::new());
        let worker = instance_worker::spawn(
            instance_name.to_string(),
            zones,
            pod_workers,
            Arc::clone(&self.metrics),
            self.config.controller_interval,
            self.config.warn_zone_collection_time,
            self.config.warn_zone_aggregation_time,
            self.config.persist_aggregated_data,
            self.report_tx.clone(),
            self.shutdown_tx.subscribe(),
        );
        self.instances.insert(worker);
        info!(instance = instance_name, "instance registered");
    }

    pub fn remove_instance(&self, instance_name: &str) -> Result<(), RegistryError> {
        self.instances.remove(instance_name)
    }

    /// Adds a pod to an already-registered instance, spawning its worker.
    pub fn add_pod(&self, instance_name: &str, pod_id: &str, pod_ip: &str) -> Result<(), PodClientError> {
        let instance = self
            .instances
            .get(instance_name)
            .ok_or_else(|| PodClientError::InvalidAddress(format!("unknown instance {instance_name:?}")))?;

        let client = PodClient::new(pod_ip, &self.pod_client_config)?;
        let handle = pod_worker::spawn(
            pod_id.to_string(),
            instance_name.to_string(),
            client,
            Arc::clone(&self.metrics),
            self.config.warn_zone_read_time,
            self.shutdown_tx.subscribe(),
        );
        instance.pod_workers().insert(Arc::new(handle));
        info!(instance = instance_name, pod = pod_id, "pod registered");
        Ok(())
    }

    /// Removes a pod from an instance. When that was the instance's last
    /// pod, the instance sync worker is torn down along with it, matching
    /// the original's pod-count-driven worker lifecycle.
    pub fn remove_pod(&self, instance_name: &str, pod_id: &str) -> Result<(), RegistryError> {
        let instance = self
            .instances
            .get(instance_name)
            .ok_or_else(|| RegistryError::InstanceNotFound(instance_name.to_string()))?;
        instance.pod_workers().remove(pod_id)?;

        if instance.pod_workers().count() == 0 {
            info!(instance = instance_name, "last pod removed, tearing down instance worker");
            self.instances.remove(instance_name)?;
        }
        Ok(())
    }

    pub fn top_k(&self) -> usize {
        self.config.max_top_offenders_report
    }

    pub fn http_addr(&self) -> std::net::SocketAddr {
        self.config.http_addr
    }

    pub fn shutdown_all(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Gives the caller a moment for in-flight ticks to settle before the
/// process exits. Mirrors the teacher's broadcast-then-drain shutdown
/// pattern in `web3_proxy/src/app_stats_old.rs`.
pub async fn graceful_shutdown_delay() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
