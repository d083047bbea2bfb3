//! Geographic helpers
//!
//! Great-circle distance, degree-space distance and coordinate quantization.

/// Mean Earth radius (metres)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in metres
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1r = lat1.to_radians();
    let lat2r = lat2.to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Euclidean distance in degree space (candidate ranking only)
pub fn degree_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = lat1 - lat2;
    let dlon = lon1 - lon2;
    (dlat * dlat + dlon * dlon).sqrt()
}

/// Both axes strictly inside the epsilon box
pub fn within_box(lat1: f64, lon1: f64, lat2: f64, lon2: f64, epsilon_deg: f64) -> bool {
    (lat1 - lat2).abs() < epsilon_deg && (lon1 - lon2).abs() < epsilon_deg
}

/// `round(coord * 10^precision)`, the grid cell used for distinct-location counts
pub fn quantize(coord: f64, precision: u32) -> i64 {
    let scale = 10f64.powi(precision as i32);
    (coord * scale).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 50.0, "got {}", d);
        assert_eq!(haversine_m(37.0, -122.0, 37.0, -122.0), 0.0);
    }

    #[test]
    fn test_quantize_rounds_half_away() {
        assert_eq!(quantize(37.00004, 4), 370_000);
        assert_eq!(quantize(37.00006, 4), 370_001);
        assert_eq!(quantize(-122.05, 4), -1_220_500);
    }

    #[test]
    fn test_box_is_strict() {
        assert!(within_box(37.0, -122.0, 37.0009, -122.0009, 0.001));
        assert!(!within_box(37.0, -122.0, 37.0015, -122.0, 0.001));
    }
}
