//! A minimal model of a road network, with just enough structure to resolve geo-coordinates to
//! edges: edge geometry with vehicle permissions and a priority attribute, a quadtree for radius
//! queries, the projection between lon/lat and world-space, zone (TAZ) membership, and
//! per-location priority overrides.
//!
//! Parsing a real network format is out of scope; `Network::load` only reads a simple edges CSV,
//! enough to drive the pipeline and its tests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub use crate::bounds::{Bounds, GPSBounds};
pub use crate::closest::FindClosest;
pub use crate::distance::Distance;
pub use crate::gps::LonLat;
pub use crate::pt::{HashablePt2D, Pt2D};
pub use crate::zones::{LocationPriorities, ZoneTable};

mod bounds;
mod closest;
mod distance;
mod gps;
mod pt;
mod zones;

pub(crate) fn trim_f64(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeID(pub String);

impl fmt::Display for EdgeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    Passenger,
    Delivery,
    Truck,
    Bicycle,
    Pedestrian,
}

impl FromStr for VehicleClass {
    type Err = anyhow::Error;

    fn from_str(x: &str) -> Result<VehicleClass> {
        match x {
            "passenger" => Ok(VehicleClass::Passenger),
            "delivery" => Ok(VehicleClass::Delivery),
            "truck" => Ok(VehicleClass::Truck),
            "bicycle" => Ok(VehicleClass::Bicycle),
            "pedestrian" => Ok(VehicleClass::Pedestrian),
            _ => bail!("unknown vehicle class {}", x),
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = match self {
            VehicleClass::Passenger => "passenger",
            VehicleClass::Delivery => "delivery",
            VehicleClass::Truck => "truck",
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::Pedestrian => "pedestrian",
        };
        write!(f, "{}", x)
    }
}

pub struct Edge {
    pub id: EdgeID,
    pub priority: usize,
    /// Empty means all classes are allowed.
    pub allow: Vec<VehicleClass>,
    /// In world-space.
    pub center_line: Vec<Pt2D>,
}

impl Edge {
    pub fn allows(&self, vclass: VehicleClass) -> bool {
        self.allow.is_empty() || self.allow.contains(&vclass)
    }
}

pub struct Network {
    pub edges: BTreeMap<EdgeID, Edge>,
    pub gps_bounds: GPSBounds,
    closest: FindClosest<EdgeID>,
}

impl Network {
    /// Build a network from edges described in lon/lat space.
    pub fn from_gps(input: Vec<(EdgeID, usize, Vec<VehicleClass>, Vec<LonLat>)>) -> Result<Network> {
        let mut gps_bounds = GPSBounds::new();
        for (_, _, _, shape) in &input {
            for pt in shape {
                gps_bounds.update(*pt);
            }
        }
        Network::assemble(input, gps_bounds)
    }

    /// Build a network from edges whose shapes are already in world-space meters. Mostly useful
    /// for tests needing exact distances.
    pub fn from_world_space(
        input: Vec<(EdgeID, usize, Vec<VehicleClass>, Vec<Pt2D>)>,
    ) -> Result<Network> {
        let mut gps_bounds = GPSBounds::new();
        gps_bounds.represents_world_space = true;
        let mut gps_input = Vec::new();
        for (id, priority, allow, shape) in input {
            let shape: Vec<LonLat> = shape
                .into_iter()
                .map(|pt| LonLat::new(pt.x(), pt.y()))
                .collect();
            for pt in &shape {
                gps_bounds.update(*pt);
            }
            gps_input.push((id, priority, allow, shape));
        }
        Network::assemble(gps_input, gps_bounds)
    }

    fn assemble(
        input: Vec<(EdgeID, usize, Vec<VehicleClass>, Vec<LonLat>)>,
        gps_bounds: GPSBounds,
    ) -> Result<Network> {
        if input.is_empty() {
            bail!("network has no edges");
        }
        let mut edges = BTreeMap::new();
        for (id, priority, allow, shape) in input {
            if shape.len() < 2 {
                bail!("edge {} needs at least 2 shape points", id);
            }
            let center_line: Vec<Pt2D> = shape.iter().map(|pt| gps_bounds.project(*pt)).collect();
            if edges
                .insert(
                    id.clone(),
                    Edge {
                        id: id.clone(),
                        priority,
                        allow,
                        center_line,
                    },
                )
                .is_some()
            {
                bail!("duplicate edge {}", id);
            }
        }
        let mut closest = FindClosest::new(&gps_bounds.to_bounds());
        for edge in edges.values() {
            closest.add(edge.id.clone(), &edge.center_line);
        }
        Ok(Network {
            edges,
            gps_bounds,
            closest,
        })
    }

    /// Read an edges CSV: `id,priority,allow,shape`, where `allow` is a space-separated list of
    /// vehicle classes (empty means everything) and `shape` is a space-separated list of
    /// `lon,lat` pairs.
    pub fn load(path: &str) -> Result<Network> {
        let mut input = Vec::new();
        for rec in csv::Reader::from_reader(fs_err::File::open(path)?).deserialize() {
            let rec: EdgeRecord = rec?;
            let mut allow = Vec::new();
            for x in rec.allow.split_whitespace() {
                allow.push(VehicleClass::from_str(x)?);
            }
            let mut shape = Vec::new();
            for pair in rec.shape.split_whitespace() {
                match pair.split_once(',') {
                    Some((lon, lat)) => {
                        shape.push(LonLat::new(lon.parse::<f64>()?, lat.parse::<f64>()?));
                    }
                    None => bail!("bad shape point {} for edge {}", pair, rec.id),
                }
            }
            input.push((EdgeID(rec.id), rec.priority, allow, shape));
        }
        Network::from_gps(input)
    }

    /// All edges whose center-line comes within `radius` of `pt`, with their closest distance.
    /// There's no fallback when nothing matches, and the order of the candidates is unspecified.
    pub fn neighboring_edges(&self, pt: Pt2D, radius: Distance) -> Vec<(&Edge, Distance)> {
        self.closest
            .all_within(pt, radius)
            .into_iter()
            .map(|(id, dist)| (&self.edges[&id], dist))
            .collect()
    }

    pub fn lon_lat_to_pt(&self, pt: LonLat) -> Pt2D {
        self.gps_bounds.project(pt)
    }

    pub fn pt_to_lon_lat(&self, pt: Pt2D) -> LonLat {
        self.gps_bounds.unproject(pt)
    }
}

#[derive(Deserialize)]
struct EdgeRecord {
    id: String,
    priority: usize,
    allow: String,
    shape: String,
}
