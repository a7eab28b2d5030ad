//! Resolves a single point to the best-matching network edge, with optional zone affinity and
//! per-location priority overrides.

use std::collections::HashMap;

use netmap::{
    Distance, EdgeID, HashablePt2D, LocationPriorities, Network, Pt2D, VehicleClass, ZoneTable,
};

use crate::runlog::RunLog;
use crate::stats::ErrorStats;

/// Search parameters for resolving a point to an edge.
#[derive(Clone)]
pub struct MapParams {
    pub min_radius: Distance,
    pub max_radius: Distance,
    /// How much farther away than the globally nearest edge an in-zone edge may be and still win:
    /// the threshold is `max(min_radius, taz_excess * nearest_dist)`.
    pub taz_excess: f64,
}

impl Default for MapParams {
    fn default() -> MapParams {
        MapParams {
            min_radius: Distance::meters(50.0),
            max_radius: Distance::meters(2000.0),
            taz_excess: 2.0,
        }
    }
}

type CacheKey = (HashablePt2D, Option<String>, Option<VehicleClass>);

/// One mapper per run. The cache never evicts; geo-points repeat heavily within a run, and a
/// cached `None` saves repeating the most expensive searches of all.
pub struct EdgeMapper {
    pub zones: ZoneTable,
    pub prios: LocationPriorities,
    /// When set, every edge close to a query point's best match gets added to the requested
    /// zone's edge set, to build a zone file from trip locations.
    pub generate_zones: bool,
    cache: HashMap<CacheKey, Option<EdgeID>>,
    pub errors: ErrorStats,
    pub no_taz_edge: usize,
}

impl EdgeMapper {
    pub fn new(zones: ZoneTable, prios: LocationPriorities, generate_zones: bool) -> EdgeMapper {
        EdgeMapper {
            zones,
            prios,
            generate_zones,
            cache: HashMap::new(),
            errors: ErrorStats::new("Mapping deviations"),
            no_taz_edge: 0,
        }
    }

    /// Find the best edge for a point, preferring (in increasing precedence) the globally nearest
    /// eligible edge, the nearest edge in the requested zone if it isn't too much of a detour,
    /// and the nearest edge satisfying a priority override for this exact point. Returns None
    /// when nothing is reachable within `max_radius`; never fails.
    pub fn map_to_edge(
        &mut self,
        net: &Network,
        pt: Pt2D,
        zone: Option<&str>,
        vclass: Option<VehicleClass>,
        params: &MapParams,
        uid: &str,
        log: &mut RunLog,
    ) -> Option<EdgeID> {
        let key = (pt.to_hashable(), zone.map(|z| z.to_string()), vclass);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let mut min_edge: Option<(EdgeID, Distance)> = None;
        let mut min_taz_edge: Option<(EdgeID, Distance)> = None;
        let mut min_prio_edge: Option<(EdgeID, Distance)> = None;
        let required_prio = self.prios.get(pt.to_hashable());

        // The radius keeps growing until all three criteria are settled or we hit max_radius.
        // Each criterion stops the expansion for its own sake as soon as it has any match; the
        // nearest match per criterion can still improve in later passes of the others.
        let mut need_zone = zone.map(|z| self.zones.contains(z)).unwrap_or(false);
        let mut need_prio = required_prio.is_some();
        let mut radius = params.min_radius;
        while (min_edge.is_none() || need_zone || need_prio) && radius <= params.max_radius {
            for (edge, dist) in net.neighboring_edges(pt, radius) {
                if let Some(vc) = vclass {
                    if !edge.allows(vc) {
                        continue;
                    }
                }
                if closer(&min_edge, dist, &edge.id) {
                    min_edge = Some((edge.id.clone(), dist));
                }
                if let Some(z) = zone {
                    if self.zones.zone_contains(z, &edge.id) && closer(&min_taz_edge, dist, &edge.id)
                    {
                        min_taz_edge = Some((edge.id.clone(), dist));
                        need_zone = false;
                    }
                }
                if let Some(required) = required_prio {
                    if edge.priority >= required && closer(&min_prio_edge, dist, &edge.id) {
                        min_prio_edge = Some((edge.id.clone(), dist));
                        need_prio = false;
                    }
                }
                if self.generate_zones {
                    if let Some(z) = zone {
                        let best = min_edge.as_ref().map(|(_, d)| *d).unwrap_or(dist);
                        if dist <= best + params.min_radius {
                            self.zones.insert(z, edge.id.clone());
                        }
                    }
                }
            }
            radius = radius * 2.0;
        }

        let mut result = min_edge.clone();
        if let Some((taz_edge, taz_dist)) = min_taz_edge.clone() {
            let nearest = min_edge.map(|(_, d)| d).unwrap_or(Distance::ZERO);
            let threshold = params.min_radius.max(nearest * params.taz_excess);
            if taz_dist < threshold {
                result = Some((taz_edge, taz_dist));
            }
        }
        if let Some(prio_match) = min_prio_edge {
            result = Some(prio_match);
        }

        let resolved = result.as_ref().map(|(id, _)| id.clone());
        self.cache.insert(key, resolved.clone());
        if let Some((id, dist)) = result {
            if let Some(z) = zone {
                if !self.zones.zone_contains(z, &id) {
                    if let Some((taz_edge, taz_dist)) = min_taz_edge {
                        log.note(format!(
                            "Mapping {} to {} (dist {:.2}) which is not in zone {}; best match in zone is {} (dist {:.2})",
                            pt,
                            id,
                            dist.inner_meters(),
                            z,
                            taz_edge,
                            taz_dist.inner_meters()
                        ));
                    }
                    self.no_taz_edge += 1;
                }
            }
            self.errors.add(
                dist.inner_meters(),
                format!("pt={}, edge={}, uid={}", pt, id, uid),
            );
        }
        resolved
    }
}

/// On distance ties, the lexicographically smaller edge id wins, so results don't depend on the
/// spatial index's candidate ordering.
fn closer(current: &Option<(EdgeID, Distance)>, dist: Distance, id: &EdgeID) -> bool {
    match current {
        None => true,
        Some((best_id, best)) => dist < *best || (dist == *best && *id < *best_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmap::LonLat;

    // Vertical 100m segments at the given x offsets, so a query at y=50 is exactly |x| away from
    // each.
    fn net(edges: Vec<(&str, f64, usize, Vec<VehicleClass>)>) -> Network {
        Network::from_world_space(
            edges
                .into_iter()
                .map(|(id, x, priority, allow)| {
                    (
                        EdgeID(id.to_string()),
                        priority,
                        allow,
                        vec![Pt2D::new(x, 0.0), Pt2D::new(x, 100.0)],
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn plain(id: &str, x: f64) -> (&str, f64, usize, Vec<VehicleClass>) {
        (id, x, 1, Vec::new())
    }

    fn query() -> Pt2D {
        Pt2D::new(0.0, 50.0)
    }

    fn map(
        mapper: &mut EdgeMapper,
        net: &Network,
        zone: Option<&str>,
        vclass: Option<VehicleClass>,
    ) -> Option<String> {
        let mut log = RunLog::new();
        mapper
            .map_to_edge(
                net,
                query(),
                zone,
                vclass,
                &MapParams::default(),
                "test",
                &mut log,
            )
            .map(|id| id.to_string())
    }

    #[test]
    fn nearest_edge_wins() {
        let net = net(vec![plain("far", 80.0), plain("near", 30.0)]);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        assert_eq!(map(&mut mapper, &net, None, None), Some("near".to_string()));
    }

    #[test]
    fn distance_ties_break_lexicographically() {
        let net = net(vec![plain("b", 20.0), plain("a", -20.0), plain("c", 20.0)]);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        assert_eq!(map(&mut mapper, &net, None, None), Some("a".to_string()));
    }

    #[test]
    fn zone_affinity_bounded_by_excess_threshold() {
        // Nearest is at 30, so the zone threshold is max(50, 2.0 * 30) = 60.
        let mut zones = ZoneTable::new();
        zones.insert("z", EdgeID("in_zone".to_string()));

        // An in-zone edge at 55 wins over the nearest at 30.
        let net1 = net(vec![plain("nearest", 30.0), plain("in_zone", 55.0)]);
        let mut mapper = EdgeMapper::new(zones.clone(), LocationPriorities::new(), false);
        assert_eq!(
            map(&mut mapper, &net1, Some("z"), None),
            Some("in_zone".to_string())
        );

        // An in-zone edge at 70 does not.
        let net2 = net(vec![plain("nearest", 30.0), plain("in_zone", 70.0)]);
        let mut mapper = EdgeMapper::new(zones, LocationPriorities::new(), false);
        let mut log = RunLog::new();
        let result = mapper.map_to_edge(
            &net2,
            query(),
            Some("z"),
            None,
            &MapParams::default(),
            "test",
            &mut log,
        );
        assert_eq!(result, Some(EdgeID("nearest".to_string())));
        assert_eq!(mapper.no_taz_edge, 1);
        assert!(log.contains("not in zone z"));
    }

    #[test]
    fn priority_override_beats_everything() {
        let net = net(vec![
            ("nearby_minor", 10.0, 1, Vec::new()),
            ("motorway", 700.0, 5, Vec::new()),
        ]);
        let mut prios = LocationPriorities::new();
        prios.pin(&net, LonLat::new(0.0, 50.0), 4);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), prios, false);
        assert_eq!(
            map(&mut mapper, &net, None, None),
            Some("motorway".to_string())
        );
    }

    #[test]
    fn vehicle_class_can_exhaust_all_radii() {
        let net = net(vec![
            ("footpath", 10.0, 1, vec![VehicleClass::Pedestrian]),
            ("cycleway", 40.0, 1, vec![VehicleClass::Bicycle]),
        ]);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        assert_eq!(
            map(&mut mapper, &net, None, Some(VehicleClass::Passenger)),
            None
        );
        // The None result is cached and repeatable.
        assert_eq!(
            map(&mut mapper, &net, None, Some(VehicleClass::Passenger)),
            None
        );
        assert_eq!(
            map(&mut mapper, &net, None, Some(VehicleClass::Pedestrian)),
            Some("footpath".to_string())
        );
    }

    #[test]
    fn generate_mode_grows_the_zone() {
        let net = net(vec![plain("a", 10.0), plain("b", 40.0), plain("c", 900.0)]);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), true);
        assert_eq!(map(&mut mapper, &net, Some("z"), None), Some("a".to_string()));
        // Everything within min_radius of the best distance joins the zone; "c" is too far.
        assert!(mapper.zones.zone_contains("z", &EdgeID("a".to_string())));
        assert!(mapper.zones.zone_contains("z", &EdgeID("b".to_string())));
        assert!(!mapper.zones.zone_contains("z", &EdgeID("c".to_string())));
    }

    #[test]
    fn unmapped_points_update_stats_only_for_hits() {
        let net = net(vec![plain("a", 10.0)]);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        map(&mut mapper, &net, None, None);
        assert_eq!(mapper.errors.count(), 1);
        // A cache hit doesn't double-count the stats.
        map(&mut mapper, &net, None, None);
        assert_eq!(mapper.errors.count(), 1);
    }
}
