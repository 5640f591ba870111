// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Classical PSHA Calculation Suite - Sites & Geodetics

use serde::{Deserialize, Serialize};

/// Mean Earth radius in km, consistent with the WGS84 authalic sphere.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// ─── Site ────────────────────────────────────────────────────────────────────

/// A point of interest on the Earth's surface, in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Longitude in decimal degrees, [-180, 180].
    pub lon: f64,
    /// Latitude in decimal degrees, [-90, 90].
    pub lat: f64,
}

impl Site {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Both coordinates finite and inside the valid geographic ranges.
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Great-circle (haversine) distance to another site, in km.
    pub fn epicentral_distance_km(&self, other: &Site) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }

    /// Distance to a point at `depth_km` below `other`, in km.
    pub fn hypocentral_distance_km(&self, other: &Site, depth_km: f64) -> f64 {
        let epi = self.epicentral_distance_km(other);
        (epi * epi + depth_km * depth_km).sqrt()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
