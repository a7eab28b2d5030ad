use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

use anyhow::Result;
use serde::Deserialize;

use crate::{EdgeID, HashablePt2D, LonLat, Network};

/// Zone (TAZ) membership: which edges belong to each named zone.
#[derive(Clone, Debug, Default)]
pub struct ZoneTable {
    zones: BTreeMap<String, BTreeSet<EdgeID>>,
}

impl ZoneTable {
    pub fn new() -> ZoneTable {
        ZoneTable::default()
    }

    /// Read a zones CSV: `zone_id,edges`, with a space-separated edge list.
    pub fn load(path: &str) -> Result<ZoneTable> {
        let mut table = ZoneTable::new();
        for rec in csv::Reader::from_reader(fs_err::File::open(path)?).deserialize() {
            let rec: ZoneRecord = rec?;
            let edges = table.zones.entry(rec.zone_id).or_default();
            for e in rec.edges.split_whitespace() {
                edges.insert(EdgeID(e.to_string()));
            }
        }
        Ok(table)
    }

    /// Write the table back out in the same CSV format, in deterministic order.
    pub fn save(&self, path: &str) -> Result<()> {
        let mut f = fs_err::File::create(path)?;
        writeln!(f, "zone_id,edges")?;
        for (zone, edges) in &self.zones {
            let list: Vec<String> = edges.iter().map(|e| e.to_string()).collect();
            writeln!(f, "{},{}", zone, list.join(" "))?;
        }
        Ok(())
    }

    pub fn contains(&self, zone: &str) -> bool {
        self.zones.contains_key(zone)
    }

    pub fn zone_contains(&self, zone: &str, edge: &EdgeID) -> bool {
        self.zones
            .get(zone)
            .map(|edges| edges.contains(edge))
            .unwrap_or(false)
    }

    pub fn insert(&mut self, zone: &str, edge: EdgeID) {
        self.zones.entry(zone.to_string()).or_default().insert(edge);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn edges(&self, zone: &str) -> Option<&BTreeSet<EdgeID>> {
        self.zones.get(zone)
    }
}

#[derive(Deserialize)]
struct ZoneRecord {
    zone_id: String,
    edges: String,
}

/// Specific locations pinned to edges of at least some priority, keyed by the projected
/// 5-decimal-rounded point.
#[derive(Clone, Debug, Default)]
pub struct LocationPriorities {
    prios: HashMap<HashablePt2D, usize>,
}

impl LocationPriorities {
    pub fn new() -> LocationPriorities {
        LocationPriorities::default()
    }

    /// Read a priorities CSV: `lon,lat,priority`.
    pub fn load(path: &str, net: &Network) -> Result<LocationPriorities> {
        let mut prios = LocationPriorities::new();
        for rec in csv::Reader::from_reader(fs_err::File::open(path)?).deserialize() {
            let rec: PrioRecord = rec?;
            prios.pin(net, LonLat::new(rec.lon, rec.lat), rec.priority);
        }
        Ok(prios)
    }

    pub fn pin(&mut self, net: &Network, pt: LonLat, priority: usize) {
        self.prios
            .insert(net.lon_lat_to_pt(pt.round5()).to_hashable(), priority);
    }

    pub fn get(&self, pt: HashablePt2D) -> Option<usize> {
        self.prios.get(&pt).copied()
    }

    pub fn contains(&self, pt: HashablePt2D) -> bool {
        self.prios.contains_key(&pt)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HashablePt2D, usize)> + '_ {
        self.prios.iter().map(|(pt, prio)| (*pt, *prio))
    }
}

#[derive(Deserialize)]
struct PrioRecord {
    lon: f64,
    lat: f64,
    priority: usize,
}
