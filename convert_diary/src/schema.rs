//! The travel-diary wire format: one CSV row per trip leg, grouped contiguously by person.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use netmap::LonLat;

/// How many minutes into the previous or next day a leg may nominally start before it's treated
/// as out of scope for the simulated day.
pub const DAY_OVERLAP_MINUTES: i64 = 4 * 60;

/// Travel modes as coded in the diary extract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "0")]
    Pedestrian,
    #[serde(rename = "1")]
    Bicycle,
    #[serde(rename = "2")]
    Car,
    #[serde(rename = "3")]
    FellowPassenger,
    #[serde(rename = "4")]
    Taxi,
    #[serde(rename = "5")]
    Public,
    #[serde(rename = "6")]
    Other,
    #[serde(rename = "261")]
    BicyclePublic,
    #[serde(rename = "517")]
    CarPublic,
}

impl Mode {
    /// Modes routed as individual vehicles, rather than as persons with a sub-itinerary.
    pub fn is_car_like(self) -> bool {
        matches!(self, Mode::Car | Mode::Taxi)
    }

    pub fn uses_bicycle(self) -> bool {
        matches!(self, Mode::Bicycle | Mode::BicyclePublic)
    }

    pub fn uses_car(self) -> bool {
        matches!(self, Mode::Car | Mode::CarPublic)
    }

    pub fn uses_public(self) -> bool {
        matches!(self, Mode::Public | Mode::CarPublic | Mode::BicyclePublic)
    }

    pub fn uses_taxi(self) -> bool {
        matches!(self, Mode::Taxi)
    }

    pub fn parse(code: &str) -> Result<Mode> {
        match code {
            "0" => Ok(Mode::Pedestrian),
            "1" => Ok(Mode::Bicycle),
            "2" => Ok(Mode::Car),
            "3" => Ok(Mode::FellowPassenger),
            "4" => Ok(Mode::Taxi),
            "5" => Ok(Mode::Public),
            "6" => Ok(Mode::Other),
            "261" => Ok(Mode::BicyclePublic),
            "517" => Ok(Mode::CarPublic),
            _ => bail!("unknown mode code {}", code),
        }
    }

    /// Parse a comma-separated list of mode codes, like "2,4".
    pub fn parse_list(codes: &str) -> Result<HashSet<Mode>> {
        let mut modes = HashSet::new();
        for code in codes.split(',') {
            modes.insert(Mode::parse(code.trim())?);
        }
        Ok(modes)
    }
}

/// One row of travel-diary data. The optional columns start out empty and are filled in as the
/// leg passes through the pipeline stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripLeg {
    pub p_id: String,
    pub hh_id: String,
    /// Minute of the simulated day. May be negative or past midnight for legs reaching into the
    /// adjacent days.
    pub start_time_min: i64,
    pub mode: Mode,
    pub lon_start: f64,
    pub lat_start: f64,
    pub lon_end: f64,
    pub lat_end: f64,
    /// May be NaN in broken input rows.
    pub travel_time_sec: f64,
    pub taz_id_start: String,
    pub taz_id_end: String,
    pub activity_duration_min: i64,
    pub car_type: String,
    pub is_restricted: String,
    pub sumo_type: String,
    #[serde(default)]
    pub source_edge: Option<String>,
    #[serde(default)]
    pub dest_edge: Option<String>,
    #[serde(default)]
    pub depart_second: Option<i64>,
    #[serde(default)]
    pub departpos: Option<f64>,
    #[serde(default)]
    pub arrivalpos: Option<f64>,
}

impl TripLeg {
    /// The stable identifier for this leg, or for one of its scaled clones.
    pub fn uid(&self, clone_idx: usize) -> String {
        format!(
            "{}_{}_{}_{}",
            self.p_id, self.hh_id, self.start_time_min, clone_idx
        )
    }

    pub fn source(&self) -> LonLat {
        LonLat::new(self.lon_start, self.lat_start)
    }

    pub fn dest(&self) -> LonLat {
        LonLat::new(self.lon_end, self.lat_end)
    }

    pub fn set_source(&mut self, pt: LonLat) {
        self.lon_start = pt.longitude;
        self.lat_start = pt.latitude;
    }

    pub fn set_dest(&mut self, pt: LonLat) {
        self.lon_end = pt.longitude;
        self.lat_end = pt.latitude;
    }

    /// False when any endpoint coordinate is NaN or infinite. Such a row can never be projected
    /// or mapped.
    pub fn has_finite_coords(&self) -> bool {
        self.lon_start.is_finite()
            && self.lat_start.is_finite()
            && self.lon_end.is_finite()
            && self.lat_end.is_finite()
    }
}

/// Split into contiguous per-person runs, keyed by `(p_id, hh_id)`. A key reappearing in a later
/// run means the upstream extract broke its grouping contract, which nothing downstream can
/// recover from.
pub fn group_by_person(legs: Vec<TripLeg>) -> Result<Vec<((String, String), Vec<TripLeg>)>> {
    let mut groups: Vec<((String, String), Vec<TripLeg>)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for leg in legs {
        let key = (leg.p_id.clone(), leg.hh_id.clone());
        match groups.last_mut() {
            Some((current, run)) if *current == key => {
                run.push(leg);
            }
            _ => {
                if !seen.insert(key.clone()) {
                    bail!(
                        "person ({}, {}) appears in two separate runs of the input",
                        key.0,
                        key.1
                    );
                }
                groups.push((key, vec![leg]));
            }
        }
    }
    Ok(groups)
}

pub fn read_legs(path: &str) -> Result<Vec<TripLeg>> {
    let mut legs = Vec::new();
    let mut bad_coords = 0;
    for rec in csv::Reader::from_reader(fs_err::File::open(path)?).deserialize() {
        let leg: TripLeg = rec?;
        if !leg.has_finite_coords() {
            bad_coords += 1;
            continue;
        }
        legs.push(leg);
    }
    if bad_coords > 0 {
        warn!("dropped {} rows with non-finite coordinates", bad_coords);
    }
    Ok(legs)
}

pub fn write_legs(path: &str, legs: &[TripLeg]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(fs_err::File::create(path)?);
    for leg in legs {
        writer.serialize(leg)?;
    }
    writer.flush()?;
    Ok(())
}
