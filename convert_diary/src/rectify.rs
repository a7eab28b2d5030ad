//! Validates, repairs, and diffuses raw diary legs before any geometric mapping happens.

use std::collections::HashSet;

use anyhow::{bail, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rand_xorshift::XorShiftRng;

use netmap::{Network, Pt2D};

use crate::diffusion::DiffusionModel;
use crate::runlog::RunLog;
use crate::schema::{self, Mode, TripLeg, DAY_OVERLAP_MINUTES};
use crate::stats::ErrorStats;
use crate::Options;

/// Distance below which two projected coordinates count as the same place.
const GAP_TOLERANCE_METERS: f64 = 0.01;

/// A depart-time correction below this is blamed on the minute resolution of the input rather
/// than counted as an inconsistency.
const INCONSISTENT_THRESHOLD_SECONDS: i64 = 60;

#[derive(Debug)]
pub struct RectifySummary {
    pub persons: usize,
    pub legs: usize,
    pub kept: usize,
    pub dropped_mode: usize,
    pub inconsistent: usize,
    pub nan_durations: usize,
    /// Legs dropped for nominally starting too deep into an adjacent day; the stats track the
    /// depart minute.
    pub wrong_day: ErrorStats,
    /// Legs dropped because the previous leg ended somewhere else; the stats track the gap length
    /// in meters.
    pub gaps: ErrorStats,
}

impl RectifySummary {
    fn new() -> RectifySummary {
        RectifySummary {
            persons: 0,
            legs: 0,
            kept: 0,
            dropped_mode: 0,
            inconsistent: 0,
            nan_durations: 0,
            wrong_day: ErrorStats::new("day-boundary drops"),
            gaps: ErrorStats::new("gaps"),
        }
    }
}

/// Process every person's contiguous run of legs: jitter departure times, enforce the ordering
/// invariants, drop out-of-scope and gapped legs, and diffuse coordinates. The random draws
/// happen in person-then-leg order; reordering them changes every downstream result for a fixed
/// seed.
pub fn rectify(
    legs: Vec<TripLeg>,
    net: &Network,
    diffusion: &DiffusionModel,
    opts: &Options,
    modes: &HashSet<Mode>,
    rng: &mut XorShiftRng,
    log: &mut RunLog,
) -> Result<(Vec<TripLeg>, RectifySummary)> {
    let mut summary = RectifySummary::new();
    let mut output = Vec::new();

    for ((p_id, _), run) in schema::group_by_person(legs)? {
        summary.persons += 1;
        let mut previous_dest: Option<Pt2D> = None;
        let mut previous_end: Option<i64> = None;
        let mut previous_raw_depart: Option<i64> = None;
        let mut spatial_offset: Option<(f64, f64)> = None;
        // One offset per person, smoothing out the bursts that minute-resolution input creates.
        let window = opts.time_diffusion as i64;
        let smoothing_offset = rng.gen_range(0..=window) - window / 2;

        for mut leg in run {
            summary.legs += 1;
            let uid = leg.uid(0);
            let source_coord = leg.source();
            let source = net.lon_lat_to_pt(source_coord);
            if spatial_offset.is_none() {
                if let Some(sigma) = diffusion.initial_sigma(DiffusionModel::key(net, source_coord))
                {
                    spatial_offset = Some(draw_offset(rng, sigma));
                }
            }
            let dest_coord = leg.dest();
            let dest = net.lon_lat_to_pt(dest_coord);

            if leg.start_time_min - 24 * 60 >= DAY_OVERLAP_MINUTES
                || leg.start_time_min <= -DAY_OVERLAP_MINUTES
            {
                log.warn(format!(
                    "dropping trip {} because it starts on the wrong day (minute {})",
                    uid, leg.start_time_min
                ));
                summary.wrong_day.add(leg.start_time_min as f64, uid);
                continue;
            }

            let mut duration = leg.travel_time_sec;
            if duration.is_nan() {
                log.warn(format!("NaN value in duration of trip {}", uid));
                duration = 1.0;
                leg.travel_time_sec = duration;
                summary.nan_durations += 1;
            }

            let raw_depart = leg.start_time_min * 60 + smoothing_offset;
            if let Some(previous) = previous_raw_depart {
                // Clamping below may legitimately reorder effective times, but the source data
                // itself must already be sorted per person.
                if raw_depart < previous {
                    bail!(
                        "unordered trips for person {} at departure minute {}",
                        p_id,
                        leg.start_time_min
                    );
                }
            }
            previous_raw_depart = Some(raw_depart);

            let mut depart = raw_depart;
            if let Some(end) = previous_end {
                if depart < end {
                    if end - depart >= INCONSISTENT_THRESHOLD_SECONDS {
                        summary.inconsistent += 1;
                        log.warn(format!(
                            "inconsistent depart time for trip {} ({} seconds)",
                            uid,
                            end - depart
                        ));
                    }
                    depart = end;
                }
            }
            // A leg dropped below for a gap still advances the clock; its successor can't depart
            // before it would have ended.
            previous_end =
                Some((depart as f64 + duration).floor() as i64 + leg.activity_duration_min * 60);

            if let Some(prev_dest) = previous_dest {
                if !opts.ignore_gaps
                    && prev_dest.dist_to(source).inner_meters() > GAP_TOLERANCE_METERS
                {
                    let gap = prev_dest.dist_to(source);
                    summary.gaps.add(gap.inner_meters(), uid);
                    // The dropped leg doesn't become the new spatial reference point.
                    continue;
                }
            }
            previous_dest = Some(dest);

            leg.depart_second = Some(depart);
            if let Some((dx, dy)) = spatial_offset {
                leg.set_source(net.pt_to_lon_lat(source.offset(dx, dy)));
                // The arrival offset carries over as the next departure's offset: parking
                // imprecision persists while the person stays at that location.
                let sigma = diffusion.arrival_sigma(DiffusionModel::key(net, dest_coord));
                let offset = draw_offset(rng, sigma);
                spatial_offset = Some(offset);
                leg.set_dest(net.pt_to_lon_lat(dest.offset(offset.0, offset.1)));
            }

            if modes.contains(&leg.mode) {
                summary.kept += 1;
                output.push(leg);
            } else {
                summary.dropped_mode += 1;
            }
        }
    }

    log.note(format!(
        "Read {} persons with a total of {} trips",
        summary.persons, summary.legs
    ));
    if summary.dropped_mode > 0 {
        log.note(format!(
            "Dropped {} trips because they have the wrong mode",
            summary.dropped_mode
        ));
    }
    log.note(format!(
        "{} trips have inconsistent depart times",
        summary.inconsistent
    ));
    if summary.gaps.count() > 0 {
        log.note(format!(
            "Dropped {} trips because of gaps, avg {:.2}m, maximum {:.2}m (for trip {})",
            summary.gaps.count(),
            summary.gaps.mean(),
            summary.gaps.max(),
            summary.gaps.max_id().unwrap_or("?")
        ));
    }
    if summary.wrong_day.count() > 0 {
        log.note(format!(
            "Dropped {} trips because they start on the wrong day (maximum: minute {} for trip {})",
            summary.wrong_day.count(),
            summary.wrong_day.max(),
            summary.wrong_day.max_id().unwrap_or("?")
        ));
    }

    Ok((output, summary))
}

fn draw_offset(rng: &mut XorShiftRng, sigma: f64) -> (f64, f64) {
    // sigma is always finite and non-negative here
    let normal = Normal::new(0.0, sigma).unwrap();
    (normal.sample(rng), normal.sample(rng))
}
