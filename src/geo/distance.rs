//! Distances and unit conversion.
//!
//! Every backend is judged against [`haversine_km`]: kilometers on a sphere
//! of radius [`EARTH_RADIUS_KM`]. Engines that measure on a different sphere
//! are queried with a widened radius and post-filtered with
//! [`retain_within_km`], so a radius scan returns the same set everywhere.

use crate::core::types::GeoPoint;

/// Mean Earth radius used by the workload, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Flat-Earth approximation: kilometers per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Latitudes are clamped to this before dividing by `cos(latitude)`.
const MAX_CORRECTED_LATITUDE: f64 = 89.9;

/// Relative slack added when translating a radius to another sphere.
const RADIUS_SLACK: f64 = 1e-6;

/// Great-circle distance between two coordinates, in kilometers.
///
/// Symmetric, and exactly zero for identical points.
pub fn haversine_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let d_lat = (lat_b - lat_a).to_radians();
    let d_lon = (lon_b - lon_a).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    // a can drift a hair above 1 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

pub fn distance_between_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Degrees of latitude spanned by `km` kilometers.
pub fn km_to_lat_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// Degrees of longitude spanned by `km` kilometers along the parallel at `latitude`.
pub fn km_to_lon_degrees(km: f64, latitude: f64) -> f64 {
    let lat = latitude.clamp(-MAX_CORRECTED_LATITUDE, MAX_CORRECTED_LATITUDE);
    km / (KM_PER_DEGREE * lat.to_radians().cos())
}

/// Radius to hand to an engine whose sphere has `native_radius_km`, so that
/// its answer is a superset of "haversine distance <= km".
pub fn widen_radius_km(km: f64, native_radius_km: f64) -> f64 {
    let ratio = (native_radius_km / EARTH_RADIUS_KM).max(1.0);
    km * ratio * (1.0 + RADIUS_SLACK)
}

/// Drops every point farther than `km` from `(lat, lon)`.
pub fn retain_within_km(points: &mut Vec<GeoPoint>, lat: f64, lon: f64, km: f64) {
    points.retain(|p| haversine_km(lat, lon, p.latitude, p.longitude) <= km);
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Longitude bounds may run past ±180; such boxes wrap the antimeridian.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.min_lat || lat > self.max_lat {
            return false;
        }
        let within = |lon: f64| lon >= self.min_lon && lon <= self.max_lon;
        within(lon) || within(lon - 360.0) || within(lon + 360.0)
    }

    /// Degree envelope of the circle of `km` around `(lat, lon)`.
    ///
    /// Errs on the large side: the 111.32 km/degree figure is slightly above
    /// the true arc length, and the longitude span is taken at the latitude
    /// farthest from the equator. Boxes touching a pole span all longitudes.
    pub fn around(lat: f64, lon: f64, km: f64) -> Self {
        let d_lat = km_to_lat_degrees(km) * 1.01;
        let min_lat = (lat - d_lat).max(-90.0);
        let max_lat = (lat + d_lat).min(90.0);

        let widest = min_lat.abs().max(max_lat.abs());
        if widest >= MAX_CORRECTED_LATITUDE {
            return BoundingBox { min_lat, max_lat, min_lon: -180.0, max_lon: 180.0 };
        }

        let d_lon = km_to_lon_degrees(km, widest) * 1.01;
        if d_lon >= 180.0 {
            return BoundingBox { min_lat, max_lat, min_lon: -180.0, max_lon: 180.0 };
        }
        BoundingBox {
            min_lat,
            max_lat,
            min_lon: lon - d_lon,
            max_lon: lon + d_lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_distances() {
        // Paris -> London, roughly 343.5 km
        let d = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343.5).abs() < 1.0, "got {d}");

        // one degree of latitude on a 6371 km sphere
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn antipodes_are_half_the_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-3);
    }

    #[test]
    fn degree_conversion() {
        assert!((km_to_lat_degrees(111.32) - 1.0).abs() < 1e-12);
        assert!((km_to_lon_degrees(111.32, 0.0) - 1.0).abs() < 1e-12);
        assert!((km_to_lon_degrees(111.32, 60.0) - 2.0).abs() < 1e-9);
        assert!(km_to_lon_degrees(1.0, 90.0).is_finite());
    }

    #[test]
    fn widening_covers_larger_spheres_only() {
        assert!(widen_radius_km(10.0, 6378.1) > 10.0 * 6378.1 / 6371.0);
        assert!(widen_radius_km(10.0, 6000.0) >= 10.0);
    }

    #[test]
    fn bounding_box_contains_the_circle() {
        let bbox = BoundingBox::around(39.9, 116.4, 50.0);
        for bearing in 0..36 {
            let theta = (bearing as f64 * 10.0).to_radians();
            // points at ~49.9 km in every direction
            let lat = 39.9 + km_to_lat_degrees(49.9) * 0.998 * theta.cos();
            let lon = 116.4 + km_to_lon_degrees(49.9, lat) * 0.998 * theta.sin();
            if haversine_km(39.9, 116.4, lat, lon) <= 50.0 {
                assert!(bbox.contains(lat, lon), "bearing {bearing}");
            }
        }
        assert!(BoundingBox::around(89.5, 0.0, 100.0).contains(89.9, 179.0));
    }

    #[test]
    fn bounding_box_wraps_the_antimeridian() {
        let bbox = BoundingBox::around(0.0, 179.9, 50.0);
        assert!(bbox.contains(0.0, -179.9));
        assert!(!bbox.contains(0.0, 0.0));
    }

    #[test]
    fn retain_drops_far_points() {
        let ts = chrono::NaiveDateTime::default();
        let mut points = vec![
            GeoPoint::new("near", 0.0, 0.05, ts),
            GeoPoint::new("far", 0.0, 1.0, ts),
        ];
        retain_within_km(&mut points, 0.0, 0.0, 10.0);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "near");
    }

    proptest! {
        #[test]
        fn haversine_is_symmetric(
            lat_a in -90.0f64..90.0, lon_a in -180.0f64..180.0,
            lat_b in -90.0f64..90.0, lon_b in -180.0f64..180.0,
        ) {
            let ab = haversine_km(lat_a, lon_a, lat_b, lon_b);
            let ba = haversine_km(lat_b, lon_b, lat_a, lon_a);
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!(ab >= 0.0);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }

        #[test]
        fn haversine_is_zero_for_coincident_points(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            prop_assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }
    }
}
