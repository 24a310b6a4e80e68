//! Spatial helpers: geohash cell keys and the regional coverage polygon.

use crate::types::Coordinate;

/// Cache cell precision. Five characters is roughly a 4.9 km x 4.9 km cell.
pub const CACHE_PRECISION: usize = 5;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Region served by the regional provider, as (longitude, latitude) vertices.
/// Covers Great Britain and Northern Ireland with a coastal margin.
const REGION_POLYGON: &[(f64, f64)] = &[
    (-8.2, 49.9),
    (1.9, 50.9),
    (1.9, 53.0),
    (-1.5, 56.0),
    (-0.5, 61.0),
    (-9.0, 61.0),
    (-8.2, 54.0),
];

/// Encode a coordinate as a geohash of `precision` characters.
pub fn geohash(coord: &Coordinate, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut bit_count = 0;
    let mut even = true;

    while hash.len() < precision {
        // Even bits refine longitude, odd bits latitude
        let (range, value) = if even {
            (&mut lon_range, coord.longitude)
        } else {
            (&mut lat_range, coord.latitude)
        };
        let mid = (range.0 + range.1) / 2.0;
        bits <<= 1;
        if value >= mid {
            bits |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;

        bit_count += 1;
        if bit_count == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    hash
}

/// Geohash cell used to key cached assessments.
pub fn cell_key(coord: &Coordinate) -> String {
    geohash(coord, CACHE_PRECISION)
}

/// Whether the regional provider covers this point.
pub fn is_in_region(coord: &Coordinate) -> bool {
    point_in_polygon(coord.longitude, coord.latitude, REGION_POLYGON)
}

/// Even-odd ray casting.
fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for (i, &(xi, yi)) in polygon.iter().enumerate() {
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}
