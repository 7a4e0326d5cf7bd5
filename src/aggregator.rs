//! Cross-pod delta aggregation: the heart of the system.
//!
//! Per-pod counters leak/decay independently; what is globally meaningful
//! is the delta in each pod's view between rounds, summed across pods and
//! added to the last agreed-upon global total. `max(last)` preserves the
//! most recent event; clamping the final sum at zero absorbs counter
//! resets (pod restarts) without overshooting downward. Entries observed
//! on no pod this round are dropped, matching the proxy's own eviction
//! behavior.
//!
//! Grounded on `internal/aggregator/aggregator.go` of the original
//! implementation; the `completeAggregator.go` draft (which divides
//! negative deltas by pod count) is a divergent, superseded variant and is
//! not implemented.

use crate::model::{printable_key, FullZoneKey, FullZoneState, RateLimitEntry, Zone};

/// `(per_pod_snapshots, prior_full_zone_state) -> (aggregated_zone,
/// new_full_zone_state)`.
///
/// `per_pod_snapshots` must be non-empty — callers short-circuit on an
/// empty snapshot set rather than invoking this (see the instance sync
/// worker's tick procedure); calling with an empty slice is a programmer
/// error.
pub fn aggregate(per_pod_snapshots: &[Zone], prior: &FullZoneState) -> (Zone, FullZoneState) {
    assert!(
        !per_pod_snapshots.is_empty(),
        "aggregate() invoked with no pod snapshots"
    );

    let mut agg: FullZoneState = FullZoneState::new();

    for snapshot in per_pod_snapshots {
        for entry in &snapshot.entries {
            let printable = printable_key(&entry.key, &snapshot.header.key_kind);
            let full_key = FullZoneKey {
                zone: snapshot.name.clone(),
                key: printable,
            };

            let prior_excess = prior.get(&full_key).map(|e| e.excess).unwrap_or(0);

            let slot = agg.entry(full_key).or_insert_with(|| RateLimitEntry {
                key: entry.key.clone(),
                excess: 0,
                last: 0,
            });

            let delta = entry.excess.saturating_sub(prior_excess);
            slot.excess = slot.excess.saturating_add(delta);
            slot.last = slot.last.max(entry.last);
        }
    }

    for (full_key, slot) in agg.iter_mut() {
        let prior_excess = prior.get(full_key).map(|e| e.excess).unwrap_or(0);
        slot.excess = slot.excess.saturating_add(prior_excess);
        if slot.excess < 0 {
            slot.excess = 0;
        }
    }

    let header = per_pod_snapshots[0].header.clone();
    let zone = Zone {
        name: per_pod_snapshots[0].name.clone(),
        header,
        entries: agg.values().cloned().collect(),
    };

    (zone, agg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyKind, RateLimitHeader};

    fn header() -> RateLimitHeader {
        RateLimitHeader {
            key_kind: KeyKind::RemoteAddress,
            now_ms: 400,
            now_monotonic_ms: 40,
        }
    }

    fn zone(entries: Vec<(&str, i64, i64)>) -> Zone {
        Zone {
            name: "z1".to_string(),
            header: header(),
            entries: entries
                .into_iter()
                .map(|(k, last, excess)| RateLimitEntry {
                    key: k.as_bytes().to_vec(),
                    last,
                    excess,
                })
                .collect(),
        }
    }

    fn find<'a>(zone: &'a Zone, key: &str) -> &'a RateLimitEntry {
        zone.entries
            .iter()
            .find(|e| e.key == key.as_bytes())
            .unwrap_or_else(|| panic!("no entry for {key}"))
    }

    #[test]
    fn s1_no_prior_state() {
        let pod_a = zone(vec![("k1", 10, 5), ("k2", 20, 10)]);
        let pod_b = zone(vec![("k1", 15, 7), ("k3", 25, 12)]);
        let prior = FullZoneState::new();

        let (agg, new_state) = aggregate(&[pod_a, pod_b], &prior);

        assert_eq!(agg.entries.len(), 3);
        assert_eq!(find(&agg, "k1"), &RateLimitEntry { key: b"k1".to_vec(), last: 15, excess: 12 });
        assert_eq!(find(&agg, "k2"), &RateLimitEntry { key: b"k2".to_vec(), last: 20, excess: 10 });
        assert_eq!(find(&agg, "k3"), &RateLimitEntry { key: b"k3".to_vec(), last: 25, excess: 12 });
        assert_eq!(new_state.len(), 3);
    }

    #[test]
    fn s2_with_prior_state() {
        let pod_a = zone(vec![("k1", 20, 15), ("k2", 40, 15)]);
        let pod_b = zone(vec![("k1", 30, 11), ("k3", 50, 17)]);

        let mut prior = FullZoneState::new();
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k1".into() },
            RateLimitEntry { key: b"k1".to_vec(), last: 15, excess: 12 },
        );
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k2".into() },
            RateLimitEntry { key: b"k2".to_vec(), last: 20, excess: 10 },
        );
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k3".into() },
            RateLimitEntry { key: b"k3".to_vec(), last: 25, excess: 12 },
        );

        let (agg, _) = aggregate(&[pod_a, pod_b], &prior);

        assert_eq!(find(&agg, "k1").excess, 14);
        assert_eq!(find(&agg, "k1").last, 30);
        assert_eq!(find(&agg, "k2").excess, 15);
        assert_eq!(find(&agg, "k3").excess, 17);
    }

    #[test]
    fn s3_clamps_to_zero() {
        let pod_a = zone(vec![("k3", 65, 2)]);
        let pod_b = zone(vec![("k3", 50, 2)]);

        let mut prior = FullZoneState::new();
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k3".into() },
            RateLimitEntry { key: b"k3".to_vec(), last: 25, excess: 12 },
        );

        let (agg, new_state) = aggregate(&[pod_a, pod_b], &prior);

        assert_eq!(find(&agg, "k3").excess, 0);
        assert_eq!(find(&agg, "k3").last, 65);
        assert_eq!(
            new_state
                .get(&FullZoneKey { zone: "z1".into(), key: "k3".into() })
                .unwrap()
                .excess,
            0
        );
    }

    #[test]
    fn s4_consecutive_rounds_converge() {
        let pod_a = zone(vec![("k1", 10, 5), ("k2", 20, 10)]);
        let pod_b = zone(vec![("k1", 15, 7), ("k3", 25, 12)]);
        let (first_agg, first_state) = aggregate(&[pod_a, pod_b], &FullZoneState::new());

        // Second round: both pods report exactly the first round's result.
        let pod_a2 = first_agg.clone();
        let pod_b2 = first_agg.clone();
        let (second_agg, second_state) = aggregate(&[pod_a2, pod_b2], &first_state);

        assert_eq!(second_agg.entries.len(), first_agg.entries.len());
        for entry in &first_agg.entries {
            let key = String::from_utf8(entry.key.clone()).unwrap();
            assert_eq!(find(&second_agg, &key), entry);
        }
        assert_eq!(second_state, first_state);
    }

    #[test]
    fn entry_present_on_only_some_pods_still_gets_delta_from_prior() {
        // k2 only reported by pod A this round; prior state for k2 must
        // survive untouched by pod B's absence.
        let pod_a = zone(vec![("k1", 10, 5), ("k2", 20, 3)]);
        let pod_b = zone(vec![("k1", 12, 6)]);

        let mut prior = FullZoneState::new();
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k2".into() },
            RateLimitEntry { key: b"k2".to_vec(), last: 15, excess: 2 },
        );

        let (agg, _) = aggregate(&[pod_a, pod_b], &prior);
        // delta = 3 - 2 = 1; absolute = 2 + 1 = 3
        assert_eq!(find(&agg, "k2").excess, 3);
    }

    #[test]
    fn entries_absent_this_round_vanish_from_new_state() {
        let pod_a = zone(vec![("k1", 10, 5)]);
        let mut prior = FullZoneState::new();
        prior.insert(
            FullZoneKey { zone: "z1".into(), key: "k2".into() },
            RateLimitEntry { key: b"k2".to_vec(), last: 15, excess: 2 },
        );

        let (agg, new_state) = aggregate(&[pod_a], &prior);
        assert!(agg.entries.iter().all(|e| e.key != b"k2"));
        assert!(!new_state.contains_key(&FullZoneKey { zone: "z1".into(), key: "k2".into() }));
    }

    #[test]
    #[should_panic(expected = "no pod snapshots")]
    fn panics_on_empty_snapshots() {
        let _ = aggregate(&[], &FullZoneState::new());
    }
}
