use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Distance;

/// Longitude is x, latitude is y.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub longitude: f64,
    pub latitude: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> LonLat {
        LonLat {
            longitude: lon,
            latitude: lat,
        }
    }

    /// The Haversine distance to another point.
    pub fn gps_dist_meters(self, other: LonLat) -> Distance {
        let earth_radius_m = 6_371_000.0;
        let lon1 = self.longitude.to_radians();
        let lon2 = other.longitude.to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let delta_lat = lat2 - lat1;
        let delta_lon = lon2 - lon1;

        let a = (delta_lat / 2.0).sin().powi(2)
            + (delta_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Distance::meters(earth_radius_m * c)
    }

    /// Round both coordinates to 5 decimal places, about a meter of precision. Repeated queries
    /// for the same place then hit the same cache keys, even when the raw input wobbles in the
    /// lower digits.
    pub fn round5(self) -> LonLat {
        LonLat::new(
            (self.longitude * 100_000.0).round() / 100_000.0,
            (self.latitude * 100_000.0).round() / 100_000.0,
        )
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LonLat({}, {})", self.longitude, self.latitude)
    }
}
