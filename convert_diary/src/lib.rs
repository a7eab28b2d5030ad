//! Converts raw travel-diary records (one CSV row per trip leg) into a validated, time-ordered,
//! network-mapped stream of trip definitions for a traffic simulator.
//!
//! The pipeline runs three stages over one seeded RNG: rectification (ordering checks, day-window
//! filtering, temporal and spatial diffusion, gap detection), edge mapping (expanding-radius
//! search with zone affinity and priority overrides), and trip-definition emission (randomized
//! scaling, departure-sorted output). Each stage writes its output file plus a plain-text
//! diagnostic log.

#[macro_use]
extern crate log;

use std::path::Path;

use anyhow::{bail, Result};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use structopt::StructOpt;

use netmap::{Distance, LocationPriorities, Network, ZoneTable};

pub use crate::diffusion::DiffusionModel;
pub use crate::map_trips::MapSummary;
pub use crate::mapper::{EdgeMapper, MapParams};
pub use crate::rectify::RectifySummary;
pub use crate::runlog::RunLog;
pub use crate::schema::{Mode, TripLeg};
pub use crate::stats::ErrorStats;
pub use crate::tripdefs::TripdefSummary;

pub mod diffusion;
pub mod map_trips;
pub mod mapper;
pub mod rectify;
pub mod runlog;
pub mod schema;
pub mod stats;
pub mod tripdefs;

#[derive(StructOpt)]
#[structopt(
    name = "convert_diary",
    about = "Convert travel-diary trips into simulator trip definitions"
)]
pub struct Options {
    /// The edges CSV describing the network
    #[structopt(long)]
    pub net_file: String,
    /// The travel-diary trips CSV, grouped contiguously by person
    #[structopt(long)]
    pub diary_trips: String,
    /// Directory for all output files
    #[structopt(long, default_value = ".")]
    pub trips_dir: String,
    /// Zone (TAZ) membership CSV
    #[structopt(long)]
    pub taz_file: Option<String>,
    /// Vehicle type CSV (id,vclass)
    #[structopt(long)]
    pub vtype_file: Option<String>,
    /// Map the given locations to edges of the given priority (or better)
    #[structopt(long)]
    pub location_priority_file: Option<String>,
    /// Build a zone file based on proximity to the trip locations
    #[structopt(long)]
    pub generate_taz_file: Option<String>,
    /// Skip rectifying trips
    #[structopt(long)]
    pub skip_rectify: bool,
    /// Stop after rectifying
    #[structopt(long)]
    pub rectify_only: bool,
    /// Skip mapping trips
    #[structopt(long)]
    pub skip_map: bool,
    /// Stop after mapping
    #[structopt(long)]
    pub map_and_exit: bool,
    /// Skip generating trip definitions
    #[structopt(long)]
    pub skip_tripdefs: bool,
    /// Keep trips after a geographic gap in the trip sequence
    #[structopt(long)]
    pub ignore_gaps: bool,
    /// Maximum radius in meters when mapping trips
    #[structopt(long, default_value = "2000")]
    pub max_radius: f64,
    /// Scale value: keep legs with this probability (<= 1), or clone them (> 1)
    #[structopt(long, default_value = "1.0")]
    pub scale: f64,
    /// Random seed
    #[structopt(long, default_value = "23432")]
    pub seed: u64,
    /// Time diffusion window in seconds
    #[structopt(long, default_value = "900")]
    pub time_diffusion: usize,
    /// (Minimum) standard deviation for spatial diffusion, in meters
    #[structopt(long, default_value = "50")]
    pub spatial_diffusion: f64,
    /// Maximum standard deviation for spatial diffusion when using bounds
    #[structopt(long, default_value = "100")]
    pub max_spatial_diffusion: f64,
    /// Lower and upper endpoint-frequency cutoffs for spatial diffusion
    #[structopt(long, default_value = "500,5000")]
    pub spatial_diffusion_bounds: String,
    /// Generate trips that use zone-based departure and arrival
    #[structopt(long)]
    pub bidi_taz: bool,
    /// Default vehicle type if none is given in the input
    #[structopt(long)]
    pub default_vtype: Option<String>,
    /// Treat bicycles as pedestrians with the given person type (empty to disable)
    #[structopt(long, default_value = "ped_bike")]
    pub bike_type: String,
    /// Shift departure times by the given number of hours, to handle trips departing before
    /// midnight
    #[structopt(long, default_value = "24")]
    pub shift_departure_hours: i64,
    /// The traffic modes to retrieve, as a comma-separated list of diary mode codes
    #[structopt(long, default_value = "2,4")]
    pub modes: String,
}

impl Options {
    fn parse_diffusion_bounds(&self) -> Result<(usize, usize)> {
        match self.spatial_diffusion_bounds.split_once(',') {
            Some((lower, upper)) => {
                let lower = lower.trim().parse::<usize>()?;
                let upper = upper.trim().parse::<usize>()?;
                if lower >= upper {
                    bail!("spatial diffusion bounds must be increasing");
                }
                Ok((lower, upper))
            }
            None => bail!(
                "bad spatial diffusion bounds {}",
                self.spatial_diffusion_bounds
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub rectify: Option<RectifySummary>,
    pub map: Option<MapSummary>,
    pub tripdefs: Option<TripdefSummary>,
}

/// Run the whole pipeline. The RNG is seeded once; draws happen in person-then-leg order during
/// rectification, then per clone during emission, so a fixed seed reproduces the run exactly.
pub fn run(opts: Options) -> Result<RunSummary> {
    let mut rng = XorShiftRng::seed_from_u64(opts.seed);
    let net = Network::load(&opts.net_file)?;
    let modes = Mode::parse_list(&opts.modes)?;
    let prios = match &opts.location_priority_file {
        Some(path) => LocationPriorities::load(path, &net)?,
        None => LocationPriorities::new(),
    };

    let base = Path::new(&opts.diary_trips)
        .file_stem()
        .and_then(|x| x.to_str())
        .unwrap_or("trips")
        .to_string();
    let out_path = |name: &str, ext: &str| format!("{}/{}{}.{}", opts.trips_dir, name, base, ext);

    let mut summary = RunSummary::default();
    let input = schema::read_legs(&opts.diary_trips)?;
    info!("read {} legs from {}", input.len(), opts.diary_trips);

    let rectified = if opts.skip_rectify {
        input
    } else {
        let diffusion = DiffusionModel::build(
            &input,
            &modes,
            &net,
            &prios,
            opts.spatial_diffusion,
            opts.max_spatial_diffusion,
            opts.parse_diffusion_bounds()?,
        );
        let mut log = RunLog::new();
        let (out, stage) = rectify::rectify(input, &net, &diffusion, &opts, &modes, &mut rng, &mut log)?;
        schema::write_legs(&out_path("rectified_", "csv"), &out)?;
        log.save(&out_path("rectified_", "log"))?;
        summary.rectify = Some(stage);
        if opts.rectify_only {
            return Ok(summary);
        }
        out
    };

    let mapped = if opts.skip_map {
        rectified
    } else {
        let zones = match &opts.taz_file {
            Some(path) => ZoneTable::load(path)?,
            None => ZoneTable::new(),
        };
        let vtypes = match &opts.vtype_file {
            Some(path) => map_trips::load_vtypes(path)?,
            None => Default::default(),
        };
        let mut mapper = EdgeMapper::new(zones, prios, opts.generate_taz_file.is_some());
        let params = MapParams {
            max_radius: Distance::meters(opts.max_radius),
            ..MapParams::default()
        };
        let mut log = RunLog::new();
        let (out, stage) = map_trips::map_trips(rectified, &net, &mut mapper, &vtypes, &params, &mut log)?;
        if let Some(path) = &opts.generate_taz_file {
            mapper.zones.save(path)?;
            log.note(format!("generated zone file with {} zones", mapper.zones.len()));
        }
        schema::write_legs(&out_path("mapped_", "csv"), &out)?;
        log.save(&out_path("mapped_", "log"))?;
        summary.map = Some(stage);
        if opts.map_and_exit {
            return Ok(summary);
        }
        out
    };

    if !opts.skip_tripdefs {
        let mut log = RunLog::new();
        let stage = tripdefs::create_tripdefs(
            &mapped,
            &opts,
            &out_path("", "trips.xml"),
            &mut rng,
            &mut log,
        )?;
        log.save(&out_path("tripdefs_", "log"))?;
        summary.tripdefs = Some(stage);
    }

    Ok(summary)
}
