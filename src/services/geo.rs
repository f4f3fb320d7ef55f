//! Great-circle distance math. Self-contained haversine fallback,
//! independent of any external routing service.

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two (lat, lng) points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Whether `(lat2, lng2)` lies within `radius_km` of `(lat1, lng1)`.
pub fn within_radius(lat1: f64, lng1: f64, lat2: f64, lng2: f64, radius_km: f64) -> bool {
    haversine_km(lat1, lng1, lat2, lng2) <= radius_km
}
