pub mod distance;
pub mod polygon;

pub use distance::{
    distance_between_km, haversine_km, km_to_lat_degrees, km_to_lon_degrees, retain_within_km,
    widen_radius_km, BoundingBox, EARTH_RADIUS_KM, KM_PER_DEGREE,
};
pub use polygon::{
    closed_coordinates, contains_point, enclosing_circle, open_ring, ring_bounds, synthesize_square, to_wkt,
};
