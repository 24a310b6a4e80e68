//! Last-resort synthetic assessment.
//!
//! The index is derived from a stable hash of the coordinate's geohash cell, so the
//! same place always shows the same level. The hash is FNV-1a, whose output must not
//! change between toolchain releases.

use chrono::Utc;

use crate::geo;
use crate::types::{Coordinate, Freshness, RiskAssessment, RiskSource};

/// Upper bound (exclusive) of generated indices; spans every danger class.
const MAX_MOCK_INDEX: u64 = 60;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Produce a deterministic, mock-tagged assessment. Never fails.
pub fn assess(coord: &Coordinate) -> RiskAssessment {
    RiskAssessment::from_valid_index(
        mock_index(coord),
        Utc::now(),
        RiskSource::Mock,
        Freshness::Mock,
    )
}

/// Index in `[0, 60)` with two decimals of resolution.
pub fn mock_index(coord: &Coordinate) -> f64 {
    let hash = fnv1a(geo::cell_key(coord).as_bytes());
    (hash % (MAX_MOCK_INDEX * 100)) as f64 / 100.0
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskLevel;

    #[test]
    fn test_fnv1a_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_same_coordinate_same_level() {
        let coord = Coordinate::new(55.95, -3.19).unwrap();
        let a = assess(&coord);
        let b = assess(&coord);
        assert_eq!(a.level(), b.level());
        assert_eq!(a.numeric_index(), b.numeric_index());
    }

    #[test]
    fn test_tagged_as_mock() {
        let a = assess(&Coordinate::new(0.0, 0.0).unwrap());
        assert_eq!(a.source(), RiskSource::Mock);
        assert_eq!(a.freshness(), Freshness::Mock);
    }

    #[test]
    fn test_index_in_range() {
        for (lat, lon) in [(0.0, 0.0), (89.9, 179.9), (-45.5, 12.25), (51.5, -0.12)] {
            let index = mock_index(&Coordinate::new(lat, lon).unwrap());
            assert!((0.0..60.0).contains(&index), "index {} out of range", index);
        }
    }

    #[test]
    fn test_varies_across_places() {
        let levels: std::collections::HashSet<RiskLevel> = (0..40)
            .map(|i| {
                let coord =
                    Coordinate::new(-60.0 + i as f64 * 3.0, -170.0 + i as f64 * 8.0).unwrap();
                assess(&coord).level()
            })
            .collect();
        assert!(levels.len() > 1);
    }
}
