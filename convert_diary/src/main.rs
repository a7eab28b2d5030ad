//! Thin binary around the pipeline library: parse options, set up logging, run, report.

#[macro_use]
extern crate log;

use anyhow::Result;
use structopt::StructOpt;

use convert_diary::{run, Options};

fn main() -> Result<()> {
    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Options::from_args();
    let summary = run(opts)?;

    if let Some(stage) = &summary.rectify {
        info!(
            "rectify: {} persons, {} legs, {} kept ({} wrong day, {} gaps, {} wrong mode, {} inconsistent times)",
            stage.persons,
            stage.legs,
            stage.kept,
            stage.wrong_day.count(),
            stage.gaps.count(),
            stage.dropped_mode,
            stage.inconsistent
        );
    }
    if let Some(stage) = &summary.map {
        info!(
            "map: {} legs, {} kept, {} unmapped, {} outside their zone",
            stage.legs, stage.kept, stage.unmapped, stage.no_taz_edge
        );
    }
    if let Some(stage) = &summary.tripdefs {
        info!(
            "tripdefs: {} read, {} written, departures {}..{}",
            stage.read, stage.written, stage.first_depart, stage.last_depart
        );
    }
    Ok(())
}
