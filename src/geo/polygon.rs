//! Query polygons: synthesis, containment and the helpers adapters need to
//! turn a ring into a native query.

use crate::core::types::GeoPoint;
use crate::geo::distance::{haversine_km, km_to_lat_degrees, km_to_lon_degrees, BoundingBox};

/// Corner latitudes are kept this far inside the poles.
const MAX_CORNER_LATITUDE: f64 = 89.9;

/// Closed ring approximating a square centered on `reference`.
///
/// Each corner sits `offset_km` north or south and `offset_km` east or west
/// of the reference, so its distance to the reference is about
/// `offset_km * sqrt(2)`. The east/west offset of a corner is converted to
/// degrees at that corner's own latitude. Vertices run counter-clockwise
/// (SW, SE, NE, NW) and the first vertex is repeated at the end.
pub fn synthesize_square(reference: &GeoPoint, offset_km: f64) -> Vec<GeoPoint> {
    let d_lat = km_to_lat_degrees(offset_km);
    let south = (reference.latitude - d_lat).max(-MAX_CORNER_LATITUDE);
    let north = (reference.latitude + d_lat).min(MAX_CORNER_LATITUDE);

    let corner = |lat: f64, east: bool| {
        let d_lon = km_to_lon_degrees(offset_km, lat);
        let lon = if east { reference.longitude + d_lon } else { reference.longitude - d_lon };
        GeoPoint::vertex(lat, lon)
    };

    let south_west = corner(south, false);
    let south_east = corner(south, true);
    let north_east = corner(north, true);
    let north_west = corner(north, false);

    vec![south_west.clone(), south_east, north_east, north_west, south_west]
}

/// Winding-number point-in-polygon test with x = longitude, y = latitude.
///
/// The ring may or may not repeat its first vertex. Works for convex and
/// simple non-convex rings. Points exactly on an edge follow the usual
/// half-open crossing rule: lower/left edges count as inside, upper/right
/// edges as outside.
pub fn contains_point(ring: &[GeoPoint], lat: f64, lon: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut winding: i32 = 0;
    for i in 0..n {
        let (x0, y0) = (ring[i].longitude, ring[i].latitude);
        let next = &ring[(i + 1) % n];
        let (x1, y1) = (next.longitude, next.latitude);

        if y0 <= lat {
            if y1 > lat && is_left(x0, y0, x1, y1, lon, lat) > 0.0 {
                winding += 1;
            }
        } else if y1 <= lat && is_left(x0, y0, x1, y1, lon, lat) < 0.0 {
            winding -= 1;
        }
    }
    winding != 0
}

/// > 0 when (x, y) is left of the directed edge, < 0 right of it, 0 on the line.
fn is_left(x0: f64, y0: f64, x1: f64, y1: f64, x: f64, y: f64) -> f64 {
    (x1 - x0) * (y - y0) - (x - x0) * (y1 - y0)
}

/// Ring without the repeated closing vertex.
pub fn open_ring(ring: &[GeoPoint]) -> &[GeoPoint] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first.lat_lon() == last.lat_lon() => &ring[..ring.len() - 1],
        _ => ring,
    }
}

pub fn ring_bounds(ring: &[GeoPoint]) -> Option<BoundingBox> {
    let first = ring.first()?;
    let init = BoundingBox {
        min_lat: first.latitude,
        max_lat: first.latitude,
        min_lon: first.longitude,
        max_lon: first.longitude,
    };
    Some(ring.iter().fold(init, |b, p| BoundingBox {
        min_lat: b.min_lat.min(p.latitude),
        max_lat: b.max_lat.max(p.latitude),
        min_lon: b.min_lon.min(p.longitude),
        max_lon: b.max_lon.max(p.longitude),
    }))
}

/// Circle that covers the ring: vertex centroid plus the largest vertex
/// distance, with 1% headroom. Returns `(lat, lon, radius_km)`.
pub fn enclosing_circle(ring: &[GeoPoint]) -> Option<(f64, f64, f64)> {
    let vertices = open_ring(ring);
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let lat = vertices.iter().map(|p| p.latitude).sum::<f64>() / n;
    let lon = vertices.iter().map(|p| p.longitude).sum::<f64>() / n;
    let radius = vertices
        .iter()
        .map(|p| haversine_km(lat, lon, p.latitude, p.longitude))
        .fold(0.0, f64::max);
    Some((lat, lon, radius * 1.01))
}

/// `POLYGON((lon lat, ...))`, closed even if the input ring is open.
pub fn to_wkt(ring: &[GeoPoint]) -> String {
    let vertices = open_ring(ring);
    let mut coords: Vec<String> = vertices
        .iter()
        .map(|p| format!("{} {}", p.longitude, p.latitude))
        .collect();
    if let Some(first) = vertices.first() {
        coords.push(format!("{} {}", first.longitude, first.latitude));
    }
    format!("POLYGON(({}))", coords.join(", "))
}

/// `[[lon, lat], ...]` closed, as GeoJSON expects.
pub fn closed_coordinates(ring: &[GeoPoint]) -> Vec<[f64; 2]> {
    let vertices = open_ring(ring);
    let mut coords: Vec<[f64; 2]> = vertices.iter().map(|p| [p.longitude, p.latitude]).collect();
    if let Some(first) = vertices.first() {
        coords.push([first.longitude, first.latitude]);
    }
    coords
}
