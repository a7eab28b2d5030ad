//! Resolves each rectified leg's endpoints to network edges, dropping legs that can't be mapped.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{bail, Result};

use netmap::{EdgeID, LonLat, Network, VehicleClass};

use crate::mapper::{EdgeMapper, MapParams};
use crate::runlog::RunLog;
use crate::schema::{self, TripLeg};

#[derive(Debug)]
pub struct MapSummary {
    pub persons: usize,
    pub legs: usize,
    pub kept: usize,
    pub unmapped: usize,
    pub no_taz_edge: usize,
}

/// Read the optional vehicle-type CSV (`id,vclass`), mapping the diary's vehicle-type references
/// to vehicle classes.
pub fn load_vtypes(path: &str) -> Result<HashMap<String, VehicleClass>> {
    let mut vtypes = HashMap::new();
    let mut reader = csv::Reader::from_reader(fs_err::File::open(path)?);
    for rec in reader.records() {
        let rec = rec?;
        if rec.len() != 2 {
            bail!("bad vehicle type row {:?}", rec);
        }
        vtypes.insert(rec[0].to_string(), VehicleClass::from_str(&rec[1])?);
    }
    Ok(vtypes)
}

pub fn map_trips(
    legs: Vec<TripLeg>,
    net: &Network,
    mapper: &mut EdgeMapper,
    vtypes: &HashMap<String, VehicleClass>,
    params: &MapParams,
    log: &mut RunLog,
) -> Result<(Vec<TripLeg>, MapSummary)> {
    let mut summary = MapSummary {
        persons: 0,
        legs: 0,
        kept: 0,
        unmapped: 0,
        no_taz_edge: 0,
    };
    let mut output = Vec::new();

    for ((p_id, hh_id), run) in schema::group_by_person(legs)? {
        summary.persons += 1;
        let uid = format!("{}_{}", p_id, hh_id);
        for mut leg in run {
            summary.legs += 1;
            let vclass = if leg.mode.is_car_like() {
                vtypes
                    .get(&leg.sumo_type)
                    .copied()
                    .unwrap_or(VehicleClass::Passenger)
            } else {
                VehicleClass::Pedestrian
            };

            let source_edge = resolve_endpoint(
                net,
                mapper,
                leg.source(),
                &leg.taz_id_start,
                vclass,
                params,
                &uid,
                log,
            );
            let dest_edge = resolve_endpoint(
                net,
                mapper,
                leg.dest(),
                &leg.taz_id_end,
                vclass,
                params,
                &uid,
                log,
            );

            match (source_edge, dest_edge) {
                (Some(source_edge), Some(dest_edge)) => {
                    leg.source_edge = Some(source_edge.to_string());
                    leg.dest_edge = Some(dest_edge.to_string());
                    leg.departpos = Some(0.0);
                    leg.arrivalpos = Some(0.0);
                    summary.kept += 1;
                    output.push(leg);
                }
                (None, _) => {
                    summary.unmapped += 1;
                    if summary.unmapped < 10 {
                        log.warn(format!(
                            "could not find an edge for departure of {} from ({}, {}), start minute {} (skipping trip)",
                            uid, leg.lat_start, leg.lon_start, leg.start_time_min
                        ));
                    }
                }
                (_, None) => {
                    summary.unmapped += 1;
                    if summary.unmapped < 10 {
                        log.warn(format!(
                            "could not find an edge for arrival of {} at ({}, {}), start minute {} (skipping trip)",
                            uid, leg.lat_end, leg.lon_end, leg.start_time_min
                        ));
                    }
                }
            }
        }
    }

    log.note(format!(
        "read {} trips for {} persons ({} unmappable)",
        summary.legs, summary.persons, summary.unmapped
    ));
    if summary.legs > 0 && summary.unmapped == summary.legs {
        // Every single endpoint failing points at a broken setup (wrong network file, wrong
        // coordinate system), not at noisy records.
        bail!("no trips left after mapping");
    }
    log.note(mapper.errors.describe());
    log.note(format!(
        "{} mappings did not find an edge in the requested zone",
        mapper.no_taz_edge
    ));
    summary.no_taz_edge = mapper.no_taz_edge;

    Ok((output, summary))
}

/// A zone id starting with "-" is an explicit edge override from the upstream extract: use the
/// edge literally, unless the point itself is pinned to a priority location (which must win).
/// In the pinned case the raw id still rides along as a zone that can't match, so the remapping
/// shows up in the no-TAZ-edge counter.
#[allow(clippy::too_many_arguments)]
fn resolve_endpoint(
    net: &Network,
    mapper: &mut EdgeMapper,
    coord: LonLat,
    zone: &str,
    vclass: VehicleClass,
    params: &MapParams,
    uid: &str,
    log: &mut RunLog,
) -> Option<EdgeID> {
    let pt = net.lon_lat_to_pt(coord.round5());
    if let Some(edge) = zone.strip_prefix('-') {
        if !mapper.prios.contains(pt.to_hashable()) {
            return Some(EdgeID(edge.to_string()));
        }
    }
    let zone = if zone.is_empty() { None } else { Some(zone) };
    mapper.map_to_edge(net, pt, zone, Some(vclass), params, uid, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmap::{LocationPriorities, Pt2D, ZoneTable};

    use crate::schema::Mode;

    fn test_net() -> Network {
        Network::from_world_space(vec![
            (
                EdgeID("road".to_string()),
                1,
                vec![VehicleClass::Passenger],
                vec![Pt2D::new(0.0, 0.0), Pt2D::new(0.0, 100.0)],
            ),
            (
                EdgeID("path".to_string()),
                1,
                vec![VehicleClass::Pedestrian],
                vec![Pt2D::new(30.0, 0.0), Pt2D::new(30.0, 100.0)],
            ),
        ])
        .unwrap()
    }

    fn leg(mode: Mode, source: (f64, f64), dest: (f64, f64)) -> TripLeg {
        TripLeg {
            p_id: "1".to_string(),
            hh_id: "1".to_string(),
            start_time_min: 480,
            mode,
            lon_start: source.0,
            lat_start: source.1,
            lon_end: dest.0,
            lat_end: dest.1,
            travel_time_sec: 300.0,
            taz_id_start: String::new(),
            taz_id_end: String::new(),
            activity_duration_min: 0,
            car_type: String::new(),
            is_restricted: String::new(),
            sumo_type: String::new(),
            source_edge: None,
            dest_edge: None,
            depart_second: Some(28800),
            departpos: None,
            arrivalpos: None,
        }
    }

    fn run_map(legs: Vec<TripLeg>) -> Result<(Vec<TripLeg>, MapSummary)> {
        let net = test_net();
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        let mut log = RunLog::new();
        map_trips(
            legs,
            &net,
            &mut mapper,
            &HashMap::new(),
            &MapParams::default(),
            &mut log,
        )
    }

    #[test]
    fn car_legs_map_with_passenger_class() {
        let (kept, summary) = run_map(vec![leg(Mode::Car, (5.0, 50.0), (2.0, 80.0))]).unwrap();
        assert_eq!(summary.kept, 1);
        assert_eq!(kept[0].source_edge.as_deref(), Some("road"));
        assert_eq!(kept[0].dest_edge.as_deref(), Some("road"));
        assert_eq!(kept[0].departpos, Some(0.0));
    }

    #[test]
    fn walking_legs_map_with_pedestrian_class() {
        let (kept, _) = run_map(vec![leg(Mode::Pedestrian, (25.0, 50.0), (28.0, 80.0))]).unwrap();
        assert_eq!(kept[0].source_edge.as_deref(), Some("path"));
    }

    #[test]
    fn all_unmapped_is_fatal() {
        // Far outside max_radius of any edge.
        let legs = vec![leg(Mode::Car, (50000.0, 50.0), (50001.0, 50.0))];
        assert!(run_map(legs).is_err());
    }

    #[test]
    fn some_unmapped_is_just_counted() {
        let legs = vec![
            leg(Mode::Car, (5.0, 50.0), (2.0, 80.0)),
            leg(Mode::Car, (5.0, 50.0), (50001.0, 50.0)),
        ];
        let (kept, summary) = run_map(legs).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(summary.unmapped, 1);
    }

    #[test]
    fn explicit_edge_override_via_zone_prefix() {
        let mut with_override = leg(Mode::Car, (5.0, 50.0), (2.0, 80.0));
        with_override.taz_id_start = "-pinned_edge".to_string();
        let (kept, _) = run_map(vec![with_override]).unwrap();
        assert_eq!(kept[0].source_edge.as_deref(), Some("pinned_edge"));
        assert_eq!(kept[0].dest_edge.as_deref(), Some("road"));
    }

    #[test]
    fn pinned_point_overrides_explicit_edge_and_counts_mismatch() {
        let net = test_net();
        let mut prios = LocationPriorities::new();
        prios.pin(&net, LonLat::new(5.0, 50.0), 1);
        let mut mapper = EdgeMapper::new(ZoneTable::new(), prios, false);
        let mut log = RunLog::new();
        let mut pinned = leg(Mode::Car, (5.0, 50.0), (2.0, 80.0));
        pinned.taz_id_start = "-pinned_edge".to_string();
        let (kept, summary) = map_trips(
            vec![pinned],
            &net,
            &mut mapper,
            &HashMap::new(),
            &MapParams::default(),
            &mut log,
        )
        .unwrap();
        // The pin forces a fresh mapping instead of the literal edge, and the departure from the
        // requested edge is counted.
        assert_eq!(kept[0].source_edge.as_deref(), Some("road"));
        assert_eq!(summary.no_taz_edge, 1);
    }

    #[test]
    fn vtype_table_switches_vehicle_class() {
        let net = test_net();
        let mut mapper = EdgeMapper::new(ZoneTable::new(), LocationPriorities::new(), false);
        let mut log = RunLog::new();
        let mut vtypes = HashMap::new();
        vtypes.insert("cargo_bike".to_string(), VehicleClass::Pedestrian);
        let mut cargo = leg(Mode::Car, (25.0, 50.0), (28.0, 80.0));
        cargo.sumo_type = "cargo_bike".to_string();
        let (kept, _) = map_trips(
            vec![cargo],
            &net,
            &mut mapper,
            &vtypes,
            &MapParams::default(),
            &mut log,
        )
        .unwrap();
        // Mapped with the pedestrian class from the table, so the footpath is eligible.
        assert_eq!(kept[0].source_edge.as_deref(), Some("path"));
    }
}
