//! Prometheus metrics, grounded on `internal/manager/metrics.go`'s exact
//! metric names and label sets, re-expressed with `prometheus-client`'s
//! `Family`/label-struct idiom.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PodLabels {
    pub instance: String,
    pub pod: String,
    pub zone: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct InstanceLabels {
    pub instance: String,
}

/// Every metric the control plane exports, registered once at startup and
/// shared (via `Arc`) across pod workers, instance sync workers and the
/// HTTP `/metrics` handler.
pub struct Metrics {
    pub registry: Registry,
    pub pod_read_latency: Family<PodLabels, Histogram>,
    pub pod_read_operations: Family<PodLabels, Counter>,
    pub aggregation_duration: Family<InstanceLabels, Histogram>,
    pub aggregation_failures: Family<InstanceLabels, Counter>,
    pub active_workers: Family<InstanceLabels, Gauge>,
    pub rate_limit_entries: Family<InstanceLabels, Counter>,
    pub repository_memory_bytes: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let pod_read_latency = Family::<PodLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0].into_iter())
        });
        registry.register(
            "rpaas_nginx_pod_read_request_latency_seconds",
            "Latency of a single pod admin-port read, by instance/pod/zone",
            pod_read_latency.clone(),
        );

        let pod_read_operations = Family::<PodLabels, Counter>::default();
        registry.register(
            "rpaas_nginx_pod_read_operations_total",
            "Count of pod admin-port reads, by instance/pod/zone",
            pod_read_operations.clone(),
        );

        let aggregation_duration = Family::<InstanceLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0].into_iter())
        });
        registry.register(
            "rpaas_instance_rate_limit_aggregation_duration_seconds",
            "Duration of one aggregation tick, by instance",
            aggregation_duration.clone(),
        );

        let aggregation_failures = Family::<InstanceLabels, Counter>::default();
        registry.register(
            "rpaas_instance_aggregation_failures_total",
            "Count of ticks in which at least one pod read failed, by instance",
            aggregation_failures.clone(),
        );

        let active_workers = Family::<InstanceLabels, Gauge>::default();
        registry.register(
            "rpaas_active_workers_count",
            "Number of live pod workers, by instance",
            active_workers.clone(),
        );

        let rate_limit_entries = Family::<InstanceLabels, Counter>::default();
        registry.register(
            "rpaas_rate_limit_entries_total",
            "Count of rate-limit entries aggregated, by instance",
            rate_limit_entries.clone(),
        );

        let repository_memory_bytes = Gauge::default();
        registry.register(
            "rpaas_zone_data_repository_memory_bytes",
            "Approximate memory held by the top-K read-out repository",
            repository_memory_bytes.clone(),
        );

        Self {
            registry,
            pod_read_latency,
            pod_read_operations,
            aggregation_duration,
            aggregation_failures,
            active_workers,
            rate_limit_entries,
            repository_memory_bytes,
        }
    }

    /// Renders the Prometheus text exposition format for `GET /metrics`.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics
            .active_workers
            .get_or_create(&InstanceLabels { instance: "inst-a".into() })
            .set(3);

        let rendered = metrics.encode().unwrap();
        assert!(rendered.contains("rpaas_active_workers_count"));
        assert!(rendered.contains("inst-a"));
    }
}
