//! Top-K selection by excess, for the read-out repository.
//!
//! Grounded on `internal/repository/min_heap.go`'s `TopKByExcess`: if the
//! input already fits within `k`, return it unchanged; otherwise keep a
//! min-heap of size `k` and evict the smallest whenever a larger excess
//! arrives. `internal/repository/sort_heap.go`'s quicksort/int-heap code is
//! dead weight in the original and has no counterpart here.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::model::TopKRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ByExcess(TopKRecord);

impl Ord for ByExcess {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.excess.cmp(&other.0.excess)
    }
}

impl PartialOrd for ByExcess {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Returns up to `k` records with the largest `excess`, descending. Ties are
/// broken by input order (first-seen wins a tie at the cutoff), matching
/// the original's stable heap-eviction behavior closely enough for a
/// read-out endpoint.
pub fn top_k_by_excess(data: Vec<TopKRecord>, k: usize) -> Vec<TopKRecord> {
    if data.len() <= k {
        let mut out = data;
        out.sort_by(|a, b| b.excess.cmp(&a.excess));
        return out;
    }
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<ByExcess>> = BinaryHeap::with_capacity(k);
    for record in data {
        if heap.len() < k {
            heap.push(Reverse(ByExcess(record)));
        } else if let Some(Reverse(ByExcess(smallest))) = heap.peek() {
            if record.excess > smallest.excess {
                heap.pop();
                heap.push(Reverse(ByExcess(record)));
            }
        }
    }

    let mut out: Vec<TopKRecord> = heap.into_iter().map(|Reverse(ByExcess(r))| r).collect();
    out.sort_by(|a, b| b.excess.cmp(&a.excess));
    out
}
