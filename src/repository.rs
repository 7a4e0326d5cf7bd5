//! Read-out store: holds the latest aggregated view per instance and
//! serves it back as a top-K-by-excess JSON list.
//!
//! Grounded on `internal/repository/zone_data_repository.go`: one `Data{
//! printable_key, zone, last, excess }` record per entry, `TopKByExcess`
//! applied at read time, and a periodically refreshed memory gauge (there
//! `runtime.ReadMemStats`, here an estimate from the held record count —
//! Rust has no stable stdlib equivalent of `ReadMemStats`, so the gauge
//! tracks a proxy for memory pressure instead of an exact figure).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics::Metrics;
use crate::model::{InstanceReport, TopKRecord};
use crate::topk::top_k_by_excess;

const BYTES_PER_RECORD_ESTIMATE: u64 = 96;

/// Latest known top-K-eligible records per instance, refreshed once per
/// tick. Reads never block on a tick in progress — `DashMap` gives readers
/// a consistent snapshot of whatever was last written.
pub struct Repository {
    top_k: usize,
    by_instance: DashMap<String, Vec<TopKRecord>>,
    metrics: Arc<Metrics>,
}

impl Repository {
    pub fn new(top_k: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            top_k,
            by_instance: DashMap::new(),
            metrics,
        }
    }

    fn ingest(&self, report: InstanceReport) {
        let mut records = Vec::new();
        for zone in &report.zones {
            for entry in &zone.entries {
                records.push(TopKRecord {
                    key: crate::model::printable_key(&entry.key, &zone.header.key_kind),
                    zone: zone.name.clone(),
                    last: entry.last,
                    excess: entry.excess,
                });
            }
        }

        let top = top_k_by_excess(records, self.top_k);
        self.by_instance.insert(report.instance_name, top);

        let total_records: usize = self.by_instance.iter().map(|e| e.value().len()).sum();
        self.metrics
            .repository_memory_bytes
            .set(total_records as i64 * BYTES_PER_RECORD_ESTIMATE as i64);
    }

    pub fn report(&self, instance_name: &str) -> Option<Vec<TopKRecord>> {
        self.by_instance.get(instance_name).map(|e| e.value().clone())
    }

    pub fn instances(&self) -> Vec<String> {
        self.by_instance.iter().map(|e| e.key().clone()).collect()
    }
}

/// Drives `Repository::ingest` from the instance workers' shared report
/// channel until the channel closes (all instance workers gone).
pub async fn run(repository: Arc<Repository>, mut report_rx: mpsc::Receiver<InstanceReport>) {
    while let Some(report) = report_rx.recv().await {
        debug!(instance = %report.instance_name, "ingesting instance report");
        repository.ingest(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyKind, RateLimitEntry, RateLimitHeader, Zone};

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new())
    }

    #[test]
    fn ingest_then_report_round_trips_top_k() {
        let repo = Repository::new(1, metrics());
        let report = InstanceReport {
            instance_name: "inst-a".to_string(),
            zones: vec![Zone {
                name: "z1".to_string(),
                header: RateLimitHeader {
                    key_kind: KeyKind::RemoteAddress,
                    now_ms: 0,
                    now_monotonic_ms: 0,
                },
                entries: vec![
                    RateLimitEntry { key: b"a".to_vec(), last: 1, excess: 5 },
                    RateLimitEntry { key: b"b".to_vec(), last: 1, excess: 9 },
                ],
            }],
        };

        repo.ingest(report);
        let top = repo.report("inst-a").unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "b");
    }

    #[test]
    fn report_for_unknown_instance_is_none() {
        let repo = Repository::new(10, metrics());
        assert!(repo.report("missing").is_none());
    }
}
