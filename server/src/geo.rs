//! Planar distance approximation (Glossary: "Planar distance").
//!
//! The teacher's grid-cell sizing used a single constant (111 km/°) with no
//! longitude compression, which over-estimates east-west distance away from
//! the equator. spec.md §9 Open Question (a) leaves the choice between
//! preserving this (compatible) and correcting it (more accurate, changes
//! `nearby` result sets) to the implementer. DESIGN.md records the decision:
//! this implementation preserves the original constant for compatibility
//! with spec.md §8 scenario S6's literal numbers.

const KM_PER_DEGREE: f64 = 111.0;

/// Approximate planar distance in kilometres between two lat/lng points.
/// `sqrt((Δlat·111)² + (Δlng·111)²)` — deliberately ignores longitude
/// compression at higher latitudes (see module docs).
pub fn planar_distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat1 - lat2) * KM_PER_DEGREE;
    let d_lng = (lng1 - lng2) * KM_PER_DEGREE;
    (d_lat * d_lat + d_lng * d_lng).sqrt()
}

/// Minimum movement distance in kilometres equivalent to `min_m` metres,
/// used by the dead-zone gate (§4.B `D_min`).
pub fn meters_to_km(m: f64) -> f64 {
    m / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(planar_distance_km(12.97, 77.59, 12.97, 77.59), 0.0);
    }

    #[test]
    fn one_degree_lat_is_111km() {
        let d = planar_distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_s6_half_km_and_three_km_distinguish_at_one_km_radius() {
        // spec.md §8 S6: vehicles at ~0.5km and ~3km from (0,0); radius=1 must
        // include only the first.
        let near = planar_distance_km(0.0, 0.0, 0.0045, 0.0);
        let far = planar_distance_km(0.0, 0.0, 0.027, 0.0);
        assert!(near <= 1.0);
        assert!(far > 1.0);
    }
}
