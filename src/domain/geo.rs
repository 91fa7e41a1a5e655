//! Great-circle distance and zone membership

use crate::domain::types::{Coordinate, LocationSample, Zone, ZoneId};
use rustc_hash::FxHashMap;

/// Spherical Earth radius used by the Haversine formula (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Inside/outside flag per zone, rebuilt from scratch on every sample.
/// Zones missing from the map are outside.
pub type MembershipState = FxHashMap<ZoneId, bool>;

/// Haversine distance between two coordinates in meters
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().atan2((1.0 - h).clamp(0.0, 1.0).sqrt());

    EARTH_RADIUS_M * c
}

/// A sample on the boundary counts as inside
#[inline]
pub fn is_inside(sample: &LocationSample, zone: &Zone) -> bool {
    distance_m(sample.coordinate, zone.centroid) <= zone.radius_m
}

/// Evaluate every zone in the catalog for one sample
pub fn evaluate_membership(sample: &LocationSample, zones: &[Zone]) -> MembershipState {
    let mut state = MembershipState::default();
    state.reserve(zones.len());
    for zone in zones {
        state.insert(zone.id.clone(), is_inside(sample, zone));
    }
    state
}

/// Move `from` by the given meters north/east. Used to place test samples
/// at exact distances from a centroid.
pub fn offset_m(from: Coordinate, north_m: f64, east_m: f64) -> Coordinate {
    let d_lat = north_m / EARTH_RADIUS_M;
    let d_lng = east_m / (EARTH_RADIUS_M * from.lat.to_radians().cos());
    Coordinate::new(from.lat + d_lat.to_degrees(), from.lng + d_lng.to_degrees())
}
