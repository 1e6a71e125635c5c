// 🌐 Geometry Primitives - distance, projection, buffers
// Foundation used by reconciliation, matching, and the buffer overlay.
//
// Storage coordinates are geographic (longitude = x, latitude = y, degrees).
// All area and buffer math happens in an equal-area projection (meters);
// geographic coordinates must never be used directly for areas or buffers.

use geo::{Coord, LineString, MapCoords, MultiPolygon, Polygon};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Earth radius for great-circle distance, in miles.
pub const EARTH_RADIUS_MI: f64 = 3963.0;

pub const FEET_PER_MILE: f64 = 5280.0;

/// Mean Earth radius for the equal-area projection, in meters.
const PROJECTION_RADIUS_M: f64 = 6_371_008.8;

/// Vertex count for circular buffer polygons. At 64 segments the polygon
/// area is within 0.2% of the true disk area.
const CIRCLE_SEGMENTS: usize = 64;

// ============================================================================
// GREAT-CIRCLE DISTANCE
// ============================================================================

/// Haversine distance between two (latitude, longitude) pairs, in miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rlat1 = lat1.to_radians();
    let rlat2 = lat2.to_radians();
    let half_dlat = (rlat2 - rlat1) / 2.0;
    let half_dlon = (lon2.to_radians() - lon1.to_radians()) / 2.0;

    let h = half_dlat.sin().powi(2) + rlat1.cos() * rlat2.cos() * half_dlon.sin().powi(2);

    2.0 * EARTH_RADIUS_MI * h.sqrt().asin()
}

/// Haversine distance in feet, for match-cutoff comparisons.
pub fn haversine_feet(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_miles(lat1, lon1, lat2, lon2) * FEET_PER_MILE
}

// ============================================================================
// EQUAL-AREA PROJECTION
// ============================================================================

/// Sinusoidal projection of one geographic coordinate (degrees) into
/// equal-area meters, centered on the reference longitude `lon0` (degrees).
///
/// Centering matters: the sinusoidal shear term grows with the longitude
/// offset from the central meridian, so projecting far from `lon0` turns
/// circles of ground distance into ellipses. With `lon0` inside the region
/// the projection is both area-preserving and locally distance-preserving,
/// which is what the buffer overlay requires.
pub fn project_coord(c: Coord<f64>, lon0: f64) -> Coord<f64> {
    let lat = c.y.to_radians();
    let lon = (c.x - lon0).to_radians();
    Coord {
        x: PROJECTION_RADIUS_M * lon * lat.cos(),
        y: PROJECTION_RADIUS_M * lat,
    }
}

/// Project a store point given as (latitude, longitude).
pub fn project_point(latitude: f64, longitude: f64, lon0: f64) -> Coord<f64> {
    project_coord(
        Coord {
            x: longitude,
            y: latitude,
        },
        lon0,
    )
}

pub fn project_polygon(polygon: &Polygon<f64>, lon0: f64) -> Polygon<f64> {
    polygon.map_coords(|c| project_coord(c, lon0))
}

pub fn project_multi_polygon(mp: &MultiPolygon<f64>, lon0: f64) -> MultiPolygon<f64> {
    mp.map_coords(|c| project_coord(c, lon0))
}

// ============================================================================
// BUFFER CONSTRUCTION
// ============================================================================

/// Circular buffer polygon of `radius_m` meters around a projected center.
pub fn circle(center: Coord<f64>, radius_m: f64) -> Polygon<f64> {
    let mut ring = Vec::with_capacity(CIRCLE_SEGMENTS + 1);
    for i in 0..=CIRCLE_SEGMENTS {
        let theta = 2.0 * std::f64::consts::PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
        ring.push((
            center.x + radius_m * theta.cos(),
            center.y + radius_m * theta.sin(),
        ));
    }
    Polygon::new(LineString::from(ring), vec![])
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn test_haversine_zero_distance() {
        let d = haversine_miles(41.881, -87.623, 41.881, -87.623);
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude on a 3963-mile sphere is R * pi / 180.
        let expected = EARTH_RADIUS_MI * std::f64::consts::PI / 180.0;
        let d = haversine_miles(41.0, -87.6, 42.0, -87.6);
        assert!((d - expected).abs() < 1e-6, "got {d}, expected {expected}");
    }

    #[test]
    fn test_haversine_symmetry() {
        let d1 = haversine_miles(41.88, -87.62, 41.95, -87.70);
        let d2 = haversine_miles(41.95, -87.70, 41.88, -87.62);
        assert!((d1 - d2).abs() < 1e-12);
    }

    #[test]
    fn test_feet_conversion() {
        let miles = haversine_miles(41.88, -87.62, 41.95, -87.70);
        let feet = haversine_feet(41.88, -87.62, 41.95, -87.70);
        assert!((feet - miles * 5280.0).abs() < 1e-9);
    }

    #[test]
    fn test_circle_area_close_to_disk() {
        let radius = 804.67;
        let buffer = circle(Coord { x: 0.0, y: 0.0 }, radius);
        let disk_area = std::f64::consts::PI * radius * radius;

        let relative_error = (buffer.unsigned_area() - disk_area).abs() / disk_area;
        assert!(relative_error < 0.005, "relative error {relative_error}");
    }

    #[test]
    fn test_projection_preserves_area() {
        // Small lat/lon rectangle near Chicago; true spherical area is
        // R^2 * dlon * (sin(lat2) - sin(lat1)).
        let (lat1, lat2) = (41.80_f64, 41.81_f64);
        let (lon1, lon2) = (-87.70_f64, -87.69_f64);

        let rect = Polygon::new(
            LineString::from(vec![
                (lon1, lat1),
                (lon2, lat1),
                (lon2, lat2),
                (lon1, lat2),
                (lon1, lat1),
            ]),
            vec![],
        );

        let dlon = (lon2 - lon1).to_radians();
        let true_area = PROJECTION_RADIUS_M * PROJECTION_RADIUS_M
            * dlon
            * (lat2.to_radians().sin() - lat1.to_radians().sin());

        let projected_area = project_polygon(&rect, -87.7).unsigned_area();
        let relative_error = (projected_area - true_area).abs() / true_area;
        assert!(relative_error < 0.001, "relative error {relative_error}");
    }

    #[test]
    fn test_projection_preserves_local_distance() {
        // Ground distance must survive projection near the reference
        // meridian: a Greenwich-centered sinusoidal would shear a due-north
        // half mile at this longitude to roughly 0.72 projected miles.
        let lon0 = -87.70;
        let (lat, lon) = (41.88, -87.62);

        let north_lat = lat + (0.5_f64 / EARTH_RADIUS_MI).to_degrees();
        let east_lon = lon + (0.5_f64 / (EARTH_RADIUS_MI * lat.to_radians().cos())).to_degrees();

        let origin = project_point(lat, lon, lon0);
        for neighbor in [
            project_point(north_lat, lon, lon0),
            project_point(lat, east_lon, lon0),
        ] {
            let meters = (neighbor.x - origin.x).hypot(neighbor.y - origin.y);
            let miles = meters / 1609.34;
            assert!(
                (miles - 0.5).abs() < 0.005,
                "projected distance {miles} mi, expected 0.5 mi"
            );
        }
    }

    #[test]
    fn test_projected_point_matches_coord_projection() {
        let from_point = project_point(41.88, -87.62, -87.7);
        let from_coord = project_coord(Coord { x: -87.62, y: 41.88 }, -87.7);
        assert!((from_point.x - from_coord.x).abs() < 1e-9);
        assert!((from_point.y - from_coord.y).abs() < 1e-9);
    }
}
