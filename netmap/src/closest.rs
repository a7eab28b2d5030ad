use std::collections::HashMap;

use aabb_quadtree::geom::{Point, Rect};
use aabb_quadtree::QuadTree;
use geo::prelude::{ClosestPoint, EuclideanDistance};

use crate::{Bounds, Distance, Pt2D};

/// A quadtree over linestring geometries, answering "which keys come within some radius of a
/// point" queries.
pub struct FindClosest<K> {
    geometries: HashMap<K, geo::LineString<f64>>,
    quadtree: QuadTree<K>,
}

impl<K> FindClosest<K>
where
    K: Clone + std::cmp::Eq + std::hash::Hash + std::fmt::Debug,
{
    pub fn new(bounds: &Bounds) -> FindClosest<K> {
        FindClosest {
            geometries: HashMap::new(),
            quadtree: QuadTree::default(bounds.as_bbox()),
        }
    }

    pub fn add(&mut self, key: K, pts: &[Pt2D]) {
        self.geometries
            .insert(key.clone(), pts_to_line_string(pts));
        self.quadtree
            .insert_with_box(key, Bounds::from(pts).as_bbox());
    }

    /// All keys whose geometry comes within `radius` of `query_pt`, with the distance to the
    /// closest point of each. The order of the results is unspecified; callers must not depend on
    /// it.
    pub fn all_within(&self, query_pt: Pt2D, radius: Distance) -> Vec<(K, Distance)> {
        let query_geom = geo::Point::new(query_pt.x(), query_pt.y());
        let query_bbox = Rect {
            top_left: Point {
                x: (query_pt.x() - radius.inner_meters()) as f32,
                y: (query_pt.y() - radius.inner_meters()) as f32,
            },
            bottom_right: Point {
                x: (query_pt.x() + radius.inner_meters()) as f32,
                y: (query_pt.y() + radius.inner_meters()) as f32,
            },
        };

        self.quadtree
            .query(query_bbox)
            .into_iter()
            .filter_map(|(key, _, _)| {
                let dist = match self.geometries[&key].closest_point(&query_geom) {
                    geo::Closest::SinglePoint(pt) => {
                        Distance::meters(pt.euclidean_distance(&query_geom))
                    }
                    geo::Closest::Intersection(_) => Distance::ZERO,
                    geo::Closest::Indeterminate => {
                        return None;
                    }
                };
                if dist <= radius {
                    Some((key.clone(), dist))
                } else {
                    None
                }
            })
            .collect()
    }
}

fn pts_to_line_string(raw_pts: &[Pt2D]) -> geo::LineString<f64> {
    let pts: Vec<geo::Point<f64>> = raw_pts
        .iter()
        .map(|pt| geo::Point::new(pt.x(), pt.y()))
        .collect();
    pts.into()
}
