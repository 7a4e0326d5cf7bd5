//! Admin wire codec.
//!
//! The GET payload is a concatenation of self-describing MessagePack
//! values, not a wrapping envelope: one header array followed by zero or
//! more entry arrays, read back to back until end of stream. The POST
//! payload is a single outer array whose first element is the header and
//! whose remaining elements are entries.

use serde::{Deserialize, Serialize};

use crate::error::PodClientError;
use crate::model::{to_monotonic, to_wall_clock, KeyKind, RateLimitEntry, RateLimitHeader, Zone};

#[derive(Serialize, Deserialize)]
struct WireHeader(String, i64, i64);

#[derive(Serialize, Deserialize)]
struct WireEntry(#[serde(with = "serde_bytes")] Vec<u8>, i64, i64);

/// Decodes a GET response body into a [`Zone`].
///
/// If the stream ends immediately after the header, returns a zone with no
/// entries. Every entry's `last` is rewritten from monotonic to wall clock
/// using the header, per the decode contract.
pub fn decode_zone(name: &str, body: &[u8]) -> Result<Zone, PodClientError> {
    let mut de = rmp_serde::Deserializer::new(body);

    let header: WireHeader = Deserialize::deserialize(&mut de)?;
    let header = RateLimitHeader {
        key_kind: KeyKind::from(header.0),
        now_ms: header.1,
        now_monotonic_ms: header.2,
    };

    let mut entries = Vec::new();
    loop {
        match WireEntry::deserialize(&mut de) {
            Ok(entry) => {
                let last_wall = to_wall_clock(entry.1, &header);
                entries.push(RateLimitEntry {
                    key: entry.0,
                    last: last_wall,
                    excess: entry.2,
                });
            }
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref io_err))
                if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(Zone {
        name: name.to_string(),
        header,
        entries,
    })
}

/// Encodes a [`Zone`] for a push: a single outer array, header first, then
/// one entry array per record, each entry's `last` converted back to
/// monotonic relative to the header.
pub fn encode_zone(zone: &Zone) -> Result<Vec<u8>, PodClientError> {
    let header = WireHeader(
        zone.header.key_kind.as_str().to_string(),
        zone.header.now_ms,
        zone.header.now_monotonic_ms,
    );

    let mut values: Vec<rmpv::Value> = Vec::with_capacity(zone.entries.len() + 1);
    values.push(rmpv::ext::to_value(&header).map_err(|e| PodClientError::Encode(e.to_string()))?);

    for entry in &zone.entries {
        let last_mono = to_monotonic(entry.last, &zone.header);
        let wire_entry = WireEntry(entry.key.clone(), last_mono, entry.excess);
        values.push(
            rmpv::ext::to_value(&wire_entry).map_err(|e| PodClientError::Encode(e.to_string()))?,
        );
    }

    let outer = rmpv::Value::Array(values);
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &outer)
        .map_err(|e| PodClientError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyKind;

    fn sample_header_bytes(key: &str, now: i64, now_mono: i64) -> Vec<u8> {
        let header = WireHeader(key.to_string(), now, now_mono);
        rmp_serde::to_vec(&header).unwrap()
    }

    fn sample_entry_bytes(key: &[u8], last: i64, excess: i64) -> Vec<u8> {
        let entry = WireEntry(key.to_vec(), last, excess);
        rmp_serde::to_vec(&entry).unwrap()
    }

    #[test]
    fn decode_header_only_yields_empty_zone() {
        let body = sample_header_bytes("$remote_addr", 1000, 500);
        let zone = decode_zone("z1", &body).unwrap();
        assert_eq!(zone.name, "z1");
        assert_eq!(zone.header.key_kind, KeyKind::RemoteAddress);
        assert!(zone.entries.is_empty());
    }

    #[test]
    fn decode_concatenated_stream() {
        let mut body = sample_header_bytes("$remote_addr", 1000, 500);
        body.extend(sample_entry_bytes(b"k1", 450, 5));
        body.extend(sample_entry_bytes(b"k2", 480, 7));

        let zone = decode_zone("z1", &body).unwrap();
        assert_eq!(zone.entries.len(), 2);
        assert_eq!(zone.entries[0].key, b"k1");
        assert_eq!(zone.entries[0].last, 950); // 1000 - (500 - 450)
        assert_eq!(zone.entries[1].last, 980);
    }

    #[test]
    fn monotonic_round_trip_through_decode_then_encode() {
        let mut body = sample_header_bytes("$remote_addr", 1000, 500);
        body.extend(sample_entry_bytes(b"k1", 450, 5));

        let zone = decode_zone("z1", &body).unwrap();
        let encoded = encode_zone(&zone).unwrap();

        // Re-decode the outer array by hand: first element header, rest entries.
        let value: rmpv::Value = rmpv::decode::read_value(&mut &encoded[..]).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        let entry_arr = arr[1].as_array().unwrap();
        assert_eq!(entry_arr[1].as_i64().unwrap(), 450); // last_mono round-trips byte-for-byte
    }

    #[test]
    fn decode_propagates_malformed_entry() {
        let mut body = sample_header_bytes("$remote_addr", 1000, 500);
        body.push(0xc1); // reserved/never-used marker: guaranteed invalid
        let result = decode_zone("z1", &body);
        assert!(result.is_err());
    }
}
