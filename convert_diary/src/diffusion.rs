//! Spatial diffusion sigmas. Diary extracts cluster many trip endpoints on the exact same
//! coordinate (one representative point per building block), so mapping them verbatim piles
//! unrealistic demand onto single edges. Heavily-reused coordinates get a Gaussian jitter whose
//! sigma grows with how often the coordinate appears.

use std::collections::{HashMap, HashSet};

use netmap::{HashablePt2D, LocationPriorities, LonLat, Network};

use crate::schema::{Mode, TripLeg};

/// Per-coordinate optional Gaussian sigma, in meters. Built once per run, immutable afterwards.
pub struct DiffusionModel {
    sigmas: HashMap<HashablePt2D, f64>,
    /// In fixed mode (no per-coordinate bounds configured), every coordinate gets this sigma.
    fixed: Option<f64>,
    /// The fallback sigma for arrival points that aren't in the per-coordinate table.
    min_sigma: f64,
}

impl DiffusionModel {
    /// `bounds` are the lower and upper endpoint-frequency cutoffs: coordinates appearing fewer
    /// than `bounds.0` times keep their exact position, and the sigma interpolates linearly from
    /// `spatial_diffusion` at `bounds.0` up to (but excluding) `max_spatial_diffusion` at
    /// `bounds.1`. When `max_spatial_diffusion <= 0`, the model degenerates to the fixed global
    /// sigma. Pinned priority locations always keep their exact position.
    pub fn build(
        legs: &[TripLeg],
        modes: &HashSet<Mode>,
        net: &Network,
        prios: &LocationPriorities,
        spatial_diffusion: f64,
        max_spatial_diffusion: f64,
        bounds: (usize, usize),
    ) -> DiffusionModel {
        let mut sigmas = HashMap::new();
        let bounded = max_spatial_diffusion > 0.0;
        if bounded {
            let mut counts: HashMap<HashablePt2D, usize> = HashMap::new();
            for leg in legs {
                if modes.contains(&leg.mode) {
                    *counts.entry(Self::key(net, leg.source())).or_insert(0) += 1;
                    *counts.entry(Self::key(net, leg.dest())).or_insert(0) += 1;
                }
            }
            for (coord, count) in counts {
                if count >= bounds.0 {
                    let scale = (count - bounds.0) as f64 / ((bounds.1 - bounds.0) as f64);
                    let sigma = scale * (max_spatial_diffusion - spatial_diffusion) + spatial_diffusion;
                    // Entries reaching the cap are left out entirely.
                    if sigma < max_spatial_diffusion {
                        sigmas.insert(coord, sigma);
                    }
                }
            }
        }
        for (pt, _) in prios.iter() {
            sigmas.insert(pt, 0.0);
        }
        DiffusionModel {
            sigmas,
            fixed: if !bounded && spatial_diffusion > 0.0 {
                Some(spatial_diffusion)
            } else {
                None
            },
            min_sigma: spatial_diffusion,
        }
    }

    /// No diffusion at all.
    pub fn disabled() -> DiffusionModel {
        DiffusionModel {
            sigmas: HashMap::new(),
            fixed: None,
            min_sigma: 0.0,
        }
    }

    /// The lookup key for a raw diary coordinate.
    pub fn key(net: &Network, coord: LonLat) -> HashablePt2D {
        net.lon_lat_to_pt(coord.round5()).to_hashable()
    }

    /// The sigma for starting diffusion at a person's first source coordinate, or None when this
    /// person gets no diffusion. In bounded mode, only clustered coordinates activate diffusion.
    pub fn initial_sigma(&self, coord: HashablePt2D) -> Option<f64> {
        if let Some(sigma) = self.sigmas.get(&coord) {
            return Some(*sigma);
        }
        self.fixed
    }

    /// The sigma for redrawing the offset at an arrival point, once diffusion is active for this
    /// person.
    pub fn arrival_sigma(&self, coord: HashablePt2D) -> f64 {
        self.sigmas.get(&coord).copied().unwrap_or(self.min_sigma)
    }
}
