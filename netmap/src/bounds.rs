use aabb_quadtree::geom::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::{LonLat, Pt2D};

/// The axis-aligned bounding box of some points in world-space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new() -> Bounds {
        Bounds {
            min_x: f64::MAX,
            min_y: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
        }
    }

    pub fn from(pts: &[Pt2D]) -> Bounds {
        let mut b = Bounds::new();
        for pt in pts {
            b.update(*pt);
        }
        b
    }

    pub fn update(&mut self, pt: Pt2D) {
        self.min_x = self.min_x.min(pt.x());
        self.max_x = self.max_x.max(pt.x());
        self.min_y = self.min_y.min(pt.y());
        self.max_y = self.max_y.max(pt.y());
    }

    pub fn contains(&self, pt: Pt2D) -> bool {
        pt.x() >= self.min_x && pt.x() <= self.max_x && pt.y() >= self.min_y && pt.y() <= self.max_y
    }

    pub fn as_bbox(&self) -> Rect {
        Rect {
            top_left: Point {
                x: self.min_x as f32,
                y: self.min_y as f32,
            },
            bottom_right: Point {
                x: self.max_x as f32,
                y: self.max_y as f32,
            },
        }
    }
}

impl Default for Bounds {
    fn default() -> Bounds {
        Bounds::new()
    }
}

/// The lon/lat bounding box of a network, which also defines the projection to world-space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GPSBounds {
    pub(crate) min_lon: f64,
    pub(crate) min_lat: f64,
    pub(crate) max_lon: f64,
    pub(crate) max_lat: f64,

    /// When true, the "lon/lat" coordinates are already in meters, and projection is the
    /// identity. Makes it easy to construct test networks with exact distances.
    pub represents_world_space: bool,
}

impl GPSBounds {
    pub fn new() -> GPSBounds {
        GPSBounds {
            min_lon: f64::MAX,
            min_lat: f64::MAX,
            max_lon: f64::MIN,
            max_lat: f64::MIN,
            represents_world_space: false,
        }
    }

    pub fn update(&mut self, pt: LonLat) {
        self.min_lon = self.min_lon.min(pt.longitude);
        self.max_lon = self.max_lon.max(pt.longitude);
        self.min_lat = self.min_lat.min(pt.latitude);
        self.max_lat = self.max_lat.max(pt.latitude);
    }

    pub fn contains(&self, pt: LonLat) -> bool {
        pt.longitude >= self.min_lon
            && pt.longitude <= self.max_lon
            && pt.latitude >= self.min_lat
            && pt.latitude <= self.max_lat
    }

    /// Project to world-space meters with a simple equirectangular scaling. Points outside the
    /// bounds extrapolate linearly; the result is only sensible near the bounds, which is all the
    /// pipeline needs.
    pub fn project(&self, pt: LonLat) -> Pt2D {
        if self.represents_world_space {
            return Pt2D::new(pt.longitude, pt.latitude);
        }
        let (x_scale, y_scale) = self.meters_per_degree();
        Pt2D::new(
            (pt.longitude - self.min_lon) * x_scale,
            (pt.latitude - self.min_lat) * y_scale,
        )
    }

    /// The inverse of `project`.
    pub fn unproject(&self, pt: Pt2D) -> LonLat {
        if self.represents_world_space {
            return LonLat::new(pt.x(), pt.y());
        }
        let (x_scale, y_scale) = self.meters_per_degree();
        LonLat::new(pt.x() / x_scale + self.min_lon, pt.y() / y_scale + self.min_lat)
    }

    fn meters_per_degree(&self) -> (f64, f64) {
        let width = LonLat::new(self.min_lon, self.min_lat)
            .gps_dist_meters(LonLat::new(self.max_lon, self.min_lat));
        let height = LonLat::new(self.min_lon, self.min_lat)
            .gps_dist_meters(LonLat::new(self.min_lon, self.max_lat));
        (
            width.inner_meters() / (self.max_lon - self.min_lon),
            height.inner_meters() / (self.max_lat - self.min_lat),
        )
    }

    /// The world-space bounds corresponding to these GPS bounds.
    pub fn to_bounds(&self) -> Bounds {
        let mut b = Bounds::new();
        b.update(self.project(LonLat::new(self.min_lon, self.min_lat)));
        b.update(self.project(LonLat::new(self.max_lon, self.max_lat)));
        b
    }
}

impl Default for GPSBounds {
    fn default() -> GPSBounds {
        GPSBounds::new()
    }
}
