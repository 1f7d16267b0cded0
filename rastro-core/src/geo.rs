//! Great-circle distance and geofence geometry.

use serde::{Deserialize, Serialize};

/// Mean earth radius, meters.
const EARTH_RADIUS: f64 = 6_371_000.0;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Great-circle (haversine) distance between two coordinates, in meters,
/// rounded to two decimal places with ties to even.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    round_centi(EARTH_RADIUS * c)
}

/// Round to two decimal places, ties to even.
pub fn round_centi(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Longitude offset in degrees that covers `meters` at the given latitude.
/// Useful for constructing test fixtures at a known distance.
pub fn longitude_delta(meters: f64, latitude: f64) -> f64 {
    meters / (METERS_PER_DEGREE_LAT * latitude.to_radians().cos())
}

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Geofence shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    /// All points within `radius` meters of the center.
    Circle {
        latitude: f64,
        longitude: f64,
        radius: f64,
    },
    /// A closed ring of vertices; the closing edge is implicit.
    Polygon { ring: Vec<Coordinate> },
    /// A path with a corridor of `buffer` meters on each side.
    Polyline { path: Vec<Coordinate>, buffer: f64 },
}

impl Geometry {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        match self {
            Geometry::Circle {
                latitude: center_lat,
                longitude: center_lon,
                radius,
            } => distance(latitude, longitude, *center_lat, *center_lon) <= *radius,
            Geometry::Polygon { ring } => polygon_contains(ring, latitude, longitude),
            Geometry::Polyline { path, buffer } => path
                .windows(2)
                .any(|pair| segment_distance(pair[0], pair[1], latitude, longitude) <= *buffer),
        }
    }
}

/// Ray-casting point-in-polygon test.
fn polygon_contains(ring: &[Coordinate], latitude: f64, longitude: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if (a.latitude > latitude) != (b.latitude > latitude) {
            let intersect = (b.longitude - a.longitude) * (latitude - a.latitude)
                / (b.latitude - a.latitude)
                + a.longitude;
            if longitude < intersect {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance in meters from a point to a path segment, using a local
/// planar approximation (adequate for corridor buffers of a few km).
fn segment_distance(start: Coordinate, end: Coordinate, latitude: f64, longitude: f64) -> f64 {
    let lon_scale = METERS_PER_DEGREE_LAT * latitude.to_radians().cos();

    let ax = start.longitude * lon_scale;
    let ay = start.latitude * METERS_PER_DEGREE_LAT;
    let bx = end.longitude * lon_scale;
    let by = end.latitude * METERS_PER_DEGREE_LAT;
    let px = longitude * lon_scale;
    let py = latitude * METERS_PER_DEGREE_LAT;

    let dx = bx - ax;
    let dy = by - ay;
    let length_squared = dx * dx + dy * dy;

    let t = if length_squared == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / length_squared).clamp(0.0, 1.0)
    };

    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_for_identical_points() {
        assert_eq!(distance(52.0, 13.0, 52.0, 13.0), 0.0);
    }

    #[test]
    fn longitude_delta_round_trips_through_distance() {
        let latitude = 45.0;
        let delta = longitude_delta(600.0, latitude);
        let measured = distance(latitude, 0.0, latitude, delta);
        assert!((measured - 600.0).abs() < 1.0, "measured {measured}");
    }

    #[test]
    fn circle_contains_center_and_excludes_far_point() {
        let fence = Geometry::Circle {
            latitude: 52.5,
            longitude: 13.4,
            radius: 100.0,
        };
        assert!(fence.contains(52.5, 13.4));
        assert!(!fence.contains(52.6, 13.4));
    }

    #[test]
    fn polygon_contains_inner_point() {
        let fence = Geometry::Polygon {
            ring: vec![
                Coordinate {
                    latitude: 0.0,
                    longitude: 0.0,
                },
                Coordinate {
                    latitude: 0.0,
                    longitude: 1.0,
                },
                Coordinate {
                    latitude: 1.0,
                    longitude: 1.0,
                },
                Coordinate {
                    latitude: 1.0,
                    longitude: 0.0,
                },
            ],
        };
        assert!(fence.contains(0.5, 0.5));
        assert!(!fence.contains(1.5, 0.5));
    }

    #[test]
    fn polyline_corridor_contains_nearby_point() {
        let fence = Geometry::Polyline {
            path: vec![
                Coordinate {
                    latitude: 0.0,
                    longitude: 0.0,
                },
                Coordinate {
                    latitude: 0.0,
                    longitude: 0.1,
                },
            ],
            buffer: 200.0,
        };
        // ~111 m north of the path.
        assert!(fence.contains(0.001, 0.05));
        // ~1.1 km north of the path.
        assert!(!fence.contains(0.01, 0.05));
    }
}
