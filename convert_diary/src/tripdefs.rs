//! Emits the final trip definitions for the simulator: vehicle trips for car-like modes, person
//! records with a mode-directed sub-itinerary for everything else, scaled by randomized rounding
//! and sorted by departure.

use std::io::Write;

use anyhow::Result;
use rand::Rng;
use rand_xorshift::XorShiftRng;

use crate::runlog::RunLog;
use crate::schema::TripLeg;
use crate::Options;

#[derive(Debug)]
pub struct TripdefSummary {
    pub read: usize,
    pub written: usize,
    pub first_depart: i64,
    pub last_depart: i64,
}

/// Build all trip-definition records, sorted by departure second. The downstream simulator
/// assumes non-decreasing departures; this sort is the only point guaranteeing that.
pub fn build_tripdefs(
    legs: &[TripLeg],
    opts: &Options,
    rng: &mut XorShiftRng,
) -> Vec<(i64, String)> {
    let mut lines: Vec<(i64, String)> = Vec::new();
    for leg in legs {
        // Randomized rounding of the scale factor preserves the expected total volume: scale 1.5
        // keeps the leg and adds a clone half the time.
        let mut num_clones = 0;
        if opts.scale > 1.0 {
            num_clones = (opts.scale - 1.0) as usize;
            if rng.gen::<f64>() < opts.scale - opts.scale.floor() {
                num_clones += 1;
            }
        } else if rng.gen::<f64>() > opts.scale {
            continue;
        }

        let depart = leg.depart_second.unwrap_or(leg.start_time_min * 60)
            + opts.shift_departure_hours * 3600;
        lines.push((depart, format_entry(leg, opts, depart, 0, true)));
        for idx in 0..num_clones {
            // Clones redraw their own jitter and land a day later, so they don't collide with the
            // original.
            let window = opts.time_diffusion as i64;
            let smoothing_offset = rng.gen_range(0..=window) - window / 2;
            let depart = leg.start_time_min * 60 + smoothing_offset + 24 * 3600;
            lines.push((depart, format_entry(leg, opts, depart, idx + 1, false)));
        }
    }
    lines.sort();
    lines
}

/// Write the sorted records as a routes XML file.
pub fn create_tripdefs(
    legs: &[TripLeg],
    opts: &Options,
    path: &str,
    rng: &mut XorShiftRng,
    log: &mut RunLog,
) -> Result<TripdefSummary> {
    let lines = build_tripdefs(legs, opts, rng);
    let summary = TripdefSummary {
        read: legs.len(),
        written: lines.len(),
        first_depart: lines.first().map(|(d, _)| *d).unwrap_or(0),
        last_depart: lines.last().map(|(d, _)| *d).unwrap_or(0),
    };

    let mut f = fs_err::File::create(path)?;
    writeln!(
        f,
        "<routes xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:noNamespaceSchemaLocation=\"http://sumo.dlr.de/xsd/routes_file.xsd\">"
    )?;
    for (_, line) in &lines {
        writeln!(f, "{}", line)?;
    }
    writeln!(f, "</routes>")?;

    log.note(format!("read trip definitions for {} legs", summary.read));
    log.note(format!(
        "created trip definitions for {} trips starting between {} and {}",
        summary.written, summary.first_depart, summary.last_depart
    ));
    Ok(summary)
}

fn format_entry(
    leg: &TripLeg,
    opts: &Options,
    depart: i64,
    clone_idx: usize,
    base_record: bool,
) -> String {
    let uid = leg.uid(clone_idx);
    let source_edge = leg.source_edge.as_deref().unwrap_or("");
    let dest_edge = leg.dest_edge.as_deref().unwrap_or("");
    let (from_attr, to_attr) = if opts.bidi_taz {
        (
            format!(" fromTaz=\"{}\"", source_edge),
            format!(" toTaz=\"{}\"", dest_edge),
        )
    } else {
        (
            format!(" from=\"{}\"", source_edge),
            format!(" to=\"{}\"", dest_edge),
        )
    };

    // The zone ids travel along as params, so postprocessing can aggregate per zone.
    let mut param = String::new();
    if !leg.taz_id_start.is_empty() {
        param += &format!("<param key=\"taz_id_start\" value=\"{}\"/>", leg.taz_id_start);
    }
    if !leg.taz_id_end.is_empty() {
        param += &format!("<param key=\"taz_id_end\" value=\"{}\"/>", leg.taz_id_end);
    }

    if leg.mode.is_car_like() {
        let mut vtype = leg.sumo_type.clone();
        if vtype.is_empty() {
            if let Some(default) = &opts.default_vtype {
                vtype = default.clone();
            }
        }
        return format!(
            "    <trip id=\"{}\" depart=\"{}\"{}{} type=\"{}\">{}</trip>",
            uid, depart, from_attr, to_attr, vtype, param
        );
    }

    // The usable modes don't depend on whether this is the base record or a clone; a configured
    // bike type suppresses the bicycle mode for both, but only the base record carries the type
    // attribute.
    let mut person_type = String::new();
    let mut usable_modes: Vec<&str> = Vec::new();
    if leg.mode.uses_bicycle() {
        if opts.bike_type.is_empty() {
            usable_modes.push("bicycle");
        } else if base_record {
            person_type = format!(" type=\"{}\"", opts.bike_type);
        }
    }
    if leg.mode.uses_car() {
        usable_modes.push("car");
    }
    if leg.mode.uses_public() {
        usable_modes.push("public");
    }
    if leg.mode.uses_taxi() {
        usable_modes.push("taxi");
    }
    let modes_attr = if usable_modes.is_empty() {
        String::new()
    } else {
        format!(" modes=\"{}\"", usable_modes.join(" "))
    };
    format!(
        "    <person id=\"{}\" depart=\"{}\"{}><personTrip{}{}{}/>{}</person>",
        uid, depart, person_type, from_attr, to_attr, modes_attr, param
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use structopt::StructOpt;

    use crate::schema::Mode;

    fn opts(extra: Vec<&str>) -> Options {
        let mut args = vec![
            "convert_diary",
            "--net-file",
            "net.csv",
            "--diary-trips",
            "trips.csv",
        ];
        args.extend(extra);
        Options::from_iter(args)
    }

    fn mapped_leg(start_time_min: i64, mode: Mode) -> TripLeg {
        TripLeg {
            p_id: "1".to_string(),
            hh_id: "1".to_string(),
            start_time_min,
            mode,
            lon_start: 0.0,
            lat_start: 0.0,
            lon_end: 1.0,
            lat_end: 1.0,
            travel_time_sec: 300.0,
            taz_id_start: "z1".to_string(),
            taz_id_end: "z2".to_string(),
            activity_duration_min: 0,
            car_type: String::new(),
            is_restricted: String::new(),
            sumo_type: String::new(),
            source_edge: Some("e_from".to_string()),
            dest_edge: Some("e_to".to_string()),
            depart_second: Some(start_time_min * 60),
            departpos: Some(0.0),
            arrivalpos: Some(0.0),
        }
    }

    #[test]
    fn downscaling_keeps_about_half_with_no_clones() {
        let legs: Vec<TripLeg> = (0..1000).map(|_| mapped_leg(480, Mode::Car)).collect();
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(&legs, &opts(vec!["--scale", "0.5"]), &mut rng);
        assert!(lines.len() > 400 && lines.len() < 600, "kept {}", lines.len());
    }

    #[test]
    fn upscaling_keeps_all_and_clones_about_half() {
        let legs: Vec<TripLeg> = (0..1000).map(|_| mapped_leg(480, Mode::Car)).collect();
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(&legs, &opts(vec!["--scale", "1.5"]), &mut rng);
        assert!(
            lines.len() > 1400 && lines.len() < 1600,
            "emitted {}",
            lines.len()
        );
        // Clones depart a day later than the originals.
        let clones = lines
            .iter()
            .filter(|(_, l)| l.contains("_1\""))
            .count();
        assert_eq!(clones, lines.len() - 1000);
    }

    #[test]
    fn integer_upscaling_always_clones() {
        let legs: Vec<TripLeg> = (0..100).map(|_| mapped_leg(480, Mode::Car)).collect();
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(&legs, &opts(vec!["--scale", "3.0"]), &mut rng);
        assert_eq!(lines.len(), 300);
    }

    #[test]
    fn output_sorted_by_departure_for_any_input_order() {
        let mut legs = Vec::new();
        for minute in [600, 480, 540, 720, 450] {
            legs.push(mapped_leg(minute, Mode::Car));
        }
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(&legs, &opts(vec!["--scale", "2.5"]), &mut rng);
        for pair in lines.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn car_legs_become_trips_with_zone_params() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(&[mapped_leg(480, Mode::Car)], &opts(vec![]), &mut rng);
        assert_eq!(lines.len(), 1);
        let line = &lines[0].1;
        assert!(line.starts_with("    <trip id=\"1_1_480_0\""));
        assert!(line.contains(" from=\"e_from\""));
        assert!(line.contains(" to=\"e_to\""));
        assert!(line.contains("<param key=\"taz_id_start\" value=\"z1\"/>"));
        // Default 24h shift puts the departure on the next synthetic day.
        assert_eq!(lines[0].0, 480 * 60 + 24 * 3600);
    }

    #[test]
    fn bidi_taz_switches_to_zone_routing() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(
            &[mapped_leg(480, Mode::Car)],
            &opts(vec!["--bidi-taz"]),
            &mut rng,
        );
        assert!(lines[0].1.contains(" fromTaz=\"e_from\""));
        assert!(lines[0].1.contains(" toTaz=\"e_to\""));
    }

    #[test]
    fn non_car_modes_become_persons() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(
            &[
                mapped_leg(480, Mode::Public),
                mapped_leg(490, Mode::Bicycle),
                mapped_leg(500, Mode::CarPublic),
                mapped_leg(510, Mode::FellowPassenger),
            ],
            &opts(vec![]),
            &mut rng,
        );
        assert!(lines[0].1.contains("<person"));
        assert!(lines[0].1.contains(" modes=\"public\""));
        // The default bike type turns cyclists into typed pedestrians instead of granting the
        // bicycle mode.
        assert!(lines[1].1.contains(" type=\"ped_bike\""));
        assert!(!lines[1].1.contains("bicycle"));
        assert!(lines[2].1.contains(" modes=\"car public\""));
        // A fellow passenger has no usable modes: a plain walking person.
        assert!(!lines[3].1.contains(" modes="));
    }

    #[test]
    fn scaled_bicycle_clones_get_neither_type_nor_mode() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(
            &[mapped_leg(480, Mode::Bicycle)],
            &opts(vec!["--scale", "3.0"]),
            &mut rng,
        );
        assert_eq!(lines.len(), 3);
        // The base record gets the configured person type and no bicycle mode.
        let base: Vec<&String> = lines
            .iter()
            .map(|(_, l)| l)
            .filter(|l| l.contains("_0\""))
            .collect();
        assert_eq!(base.len(), 1);
        assert!(base[0].contains(" type=\"ped_bike\""));
        assert!(!base[0].contains(" modes="));
        // Clones are plain walking persons: no type attribute and no bicycle mode either.
        for (_, line) in lines.iter().filter(|(_, l)| !l.contains("_0\"")) {
            assert!(line.contains("<person"));
            assert!(!line.contains(" type="));
            assert!(!line.contains("bicycle"));
        }

        // Without a bike type, base and clones alike ride.
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(
            &[mapped_leg(480, Mode::Bicycle)],
            &opts(vec!["--scale", "3.0", "--bike-type", ""]),
            &mut rng,
        );
        for (_, line) in &lines {
            assert!(line.contains(" modes=\"bicycle\""));
        }
    }

    #[test]
    fn default_vtype_fills_empty_types() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let lines = build_tripdefs(
            &[mapped_leg(480, Mode::Car)],
            &opts(vec!["--default-vtype", "standard_car"]),
            &mut rng,
        );
        assert!(lines[0].1.contains(" type=\"standard_car\""));
    }
}
