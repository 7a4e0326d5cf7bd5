//! Core data model: zones, entries, headers and the keys that tie rounds
//! of aggregation together.
//!
//! Types here are plain values with no I/O; they are shared by the codec,
//! the aggregator, and the top-K repository.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Opaque bytes identifying a rate-limited entity, as delivered by a pod.
pub type Key = Vec<u8>;

/// How a pod's admin port reports the identity of a rate-limited key.
///
/// `Other` preserves any key kind the proxy might report that we don't know
/// about yet, rather than failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyKind {
    BinaryRemoteAddress,
    RemoteAddress,
    Other(String),
}

impl KeyKind {
    pub const BINARY_REMOTE_ADDRESS: &'static str = "$binary_remote_addr";
    pub const REMOTE_ADDRESS: &'static str = "$remote_addr";

    pub fn as_str(&self) -> &str {
        match self {
            KeyKind::BinaryRemoteAddress => Self::BINARY_REMOTE_ADDRESS,
            KeyKind::RemoteAddress => Self::REMOTE_ADDRESS,
            KeyKind::Other(s) => s,
        }
    }
}

impl From<&str> for KeyKind {
    fn from(s: &str) -> Self {
        match s {
            Self::BINARY_REMOTE_ADDRESS => KeyKind::BinaryRemoteAddress,
            Self::REMOTE_ADDRESS => KeyKind::RemoteAddress,
            other => KeyKind::Other(other.to_string()),
        }
    }
}

impl From<String> for KeyKind {
    fn from(s: String) -> Self {
        KeyKind::from(s.as_str())
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchors the monotonic<->wall-clock conversion for every entry in a
/// pod's response to a single zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeader {
    pub key_kind: KeyKind,
    pub now_ms: i64,
    pub now_monotonic_ms: i64,
}

/// One rate-limit record. `last`'s clock domain is monotonic on the wire
/// and inside a pod worker's own bookkeeping, wall-clock from
/// [`crate::codec::decode_zone`] onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub key: Key,
    pub last: i64,
    pub excess: i64,
}

/// A named bag of entries for a single rate-limit rule, as produced by one
/// pod in one tick (or, after aggregation, the globally reconciled view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    pub header: RateLimitHeader,
    pub entries: Vec<RateLimitEntry>,
}

/// Converts a wire (monotonic) `last` into wall-clock time.
pub fn to_wall_clock(last_mono: i64, header: &RateLimitHeader) -> i64 {
    header.now_ms - (header.now_monotonic_ms - last_mono)
}

/// Converts a wall-clock `last` back into the monotonic domain, relative
/// to `header`. Inverse of [`to_wall_clock`].
pub fn to_monotonic(last_wall: i64, header: &RateLimitHeader) -> i64 {
    header.now_monotonic_ms - (header.now_ms - last_wall)
}

/// `printable_key(raw_bytes, key_kind)`: dotted IPv4/IPv6 text when
/// `key_kind` is `binary_remote_address`, else the raw bytes interpreted
/// as a string.
///
/// Deliberately deferred to aggregation/report time — whether a key is an
/// IP depends on the header reported alongside it, not on the key bytes
/// themselves.
pub fn printable_key(raw: &[u8], key_kind: &KeyKind) -> String {
    match key_kind {
        KeyKind::BinaryRemoteAddress => match raw.len() {
            4 => {
                let octets: [u8; 4] = raw.try_into().expect("checked len == 4");
                Ipv4Addr::from(octets).to_string()
            }
            16 => {
                let octets: [u8; 16] = raw.try_into().expect("checked len == 16");
                Ipv6Addr::from(octets).to_string()
            }
            _ => String::from_utf8_lossy(raw).into_owned(),
        },
        KeyKind::RemoteAddress | KeyKind::Other(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// `(zone_name, printable_key)` — identifies an entity across aggregation
/// rounds, independent of which pod reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullZoneKey {
    pub zone: String,
    pub key: String,
}

/// Previous round's aggregated `{last, excess}` for one entity, keyed by
/// [`FullZoneKey`]. Owned per-zone by the instance sync worker.
pub type FullZoneState = std::collections::HashMap<FullZoneKey, RateLimitEntry>;

/// Pair `(instance_name, [aggregated_zone])` emitted once per tick.
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub instance_name: String,
    pub zones: Vec<Zone>,
}

/// One flattened record surfaced by the top-K repository.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TopKRecord {
    pub key: String,
    pub zone: String,
    pub last: i64,
    pub excess: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_key_formats_ipv4() {
        let raw = [192u8, 168, 1, 1];
        assert_eq!(
            printable_key(&raw, &KeyKind::BinaryRemoteAddress),
            "192.168.1.1"
        );
    }

    #[test]
    fn printable_key_formats_ipv6() {
        let raw = Ipv6Addr::LOCALHOST.octets();
        assert_eq!(
            printable_key(&raw, &KeyKind::BinaryRemoteAddress),
            "::1"
        );
    }

    #[test]
    fn printable_key_falls_back_to_string_for_other_kinds() {
        assert_eq!(
            printable_key(b"alice", &KeyKind::RemoteAddress),
            "alice"
        );
        assert_eq!(
            printable_key(b"alice", &KeyKind::Other("custom".into())),
            "alice"
        );
    }

    #[test]
    fn monotonic_round_trip() {
        let header = RateLimitHeader {
            key_kind: KeyKind::RemoteAddress,
            now_ms: 1000,
            now_monotonic_ms: 500,
        };
        let wall = to_wall_clock(450, &header);
        assert_eq!(wall, 950);
        assert_eq!(to_monotonic(wall, &header), 450);
    }

    #[test]
    fn key_kind_roundtrips_unknown_values() {
        let kind = KeyKind::from("$something_else");
        assert_eq!(kind, KeyKind::Other("$something_else".to_string()));
        assert_eq!(kind.as_str(), "$something_else");
    }
}
