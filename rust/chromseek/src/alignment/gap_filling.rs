//! Gap filling of alignment slots straight from the raw data.
//!
//! Every file is handled by one worker that owns its provider. Fills are
//! computed in parallel across files and applied afterwards.

use chromquery::models::Chromatogram;
use chromquery::utils::peak_detection::peak_nearest;
use chromquery::utils::smoothing::smooth;
use chromquery::{
    ChromXs,
    DataProvider,
};
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

use crate::errors::{
    ChromSeekError,
    Result,
};
use crate::models::{
    AlignedPeakProperty,
    AlignmentSpotProperty,
    PeakSlotState,
};
use crate::parameters::AlignmentParameter;
use crate::pipeline::context::{
    ProcessingStage,
    RunContext,
};

/// New content of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    pub spot_index: usize,
    /// Set for slots of a drift spot.
    pub drift_index: Option<usize>,
    pub slot: AlignedPeakProperty,
}

/// Integrates the peak nearest `target` in a trace.
///
/// `chrom_of` maps the axis value of the found top to coordinates. The
/// result is `GapFilled` only when height and area are finite and non
/// negative, `Unfillable` otherwise.
fn integrate_gap(
    trace: &Chromatogram,
    target: f64,
    mut slot: AlignedPeakProperty,
    params: &AlignmentParameter,
    chrom_of: impl Fn(f64) -> ChromXs,
) -> AlignedPeakProperty {
    slot.state = PeakSlotState::Unfillable;
    if trace.is_empty() {
        return slot;
    }
    let times = trace.times();
    let raw = trace.intensities();
    let smoothed = smooth(&raw, params.gap_fill_smoothing_method, params.gap_fill_smoothing_level);
    let Some(peak) = peak_nearest(&times, &smoothed, &raw, target) else {
        return slot;
    };
    let valid = |x: f64| x.is_finite() && x >= 0.0;
    if !(valid(peak.height) && valid(peak.area)) {
        return slot;
    }
    slot.height = peak.height;
    slot.area = peak.area;
    slot.chrom = chrom_of(times[peak.top]);
    if peak.height > 0.0 {
        slot.mass = trace.weighted_mz_around(peak.top);
    }
    slot.state = PeakSlotState::GapFilled;
    slot
}

/// Fills for every open slot of one file.
pub fn fill_file_gaps<P: DataProvider + ?Sized>(
    provider: &P,
    file_id: usize,
    spots: &[AlignmentSpotProperty],
    params: &AlignmentParameter,
) -> Vec<GapFill> {
    let tol = params.gap_fill_mass_tolerance;
    let mut fills = Vec::new();
    for (spot_index, spot) in spots.iter().enumerate() {
        if let Some(slot) = spot.aligned_peaks.get(file_id) {
            if slot.state == PeakSlotState::Gap {
                let mass = spot.central_mass;
                let trace = provider.ms1_eic(spot.min_rt, spot.max_rt, mass - tol, mass + tol);
                fills.push(GapFill {
                    spot_index,
                    drift_index: None,
                    slot: integrate_gap(&trace, spot.central_chrom.rt, slot.clone(), params, ChromXs::from_rt),
                });
            }
        }
        for (drift_index, drift_spot) in spot.drift_spots.iter().enumerate() {
            let Some(slot) = drift_spot.aligned_peaks.get(file_id) else {
                continue;
            };
            if slot.state != PeakSlotState::Gap {
                continue;
            }
            let mass = drift_spot.central_mass;
            let rt = drift_spot.central_chrom.rt;
            let trace = provider.ms1_mobilogram(spot.min_rt, spot.max_rt, mass - tol, mass + tol);
            fills.push(GapFill {
                spot_index,
                drift_index: Some(drift_index),
                slot: integrate_gap(&trace, drift_spot.central_chrom.drift, slot.clone(), params, |d| {
                    ChromXs::from_drift(rt, d)
                }),
            });
        }
    }
    fills
}

/// A file of the alignment could not be read back for gap filling.
#[derive(Debug)]
pub struct GapFillError {
    /// Alignment slot of the file.
    pub file_id: usize,
    pub source: ChromSeekError,
}

impl std::fmt::Display for GapFillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gap filling could not read file {}: {}", self.file_id, self.source)
    }
}

impl std::error::Error for GapFillError {}

pub fn apply_gap_fills(spots: &mut [AlignmentSpotProperty], fills: Vec<GapFill>) {
    for fill in fills {
        let Some(spot) = spots.get_mut(fill.spot_index) else {
            continue;
        };
        let target = match fill.drift_index {
            Some(d) => match spot.drift_spots.get_mut(d) {
                Some(x) => x,
                None => continue,
            },
            None => spot,
        };
        if let Some(slot) = target.aligned_peaks.get_mut(fill.slot.file_id) {
            debug_assert_eq!(slot.state, PeakSlotState::Gap);
            *slot = fill.slot;
        }
    }
}

/// Gap fills all the files of an alignment.
///
/// `open` gives the provider of a file. Returns `Ok(false)` if cancelled and
/// the error of the first file (in slot order) that could not be opened;
/// in both cases nothing is applied.
#[tracing::instrument(skip_all, level = "debug")]
pub fn fill_gaps<P, F>(
    spots: &mut [AlignmentSpotProperty],
    num_files: usize,
    open: F,
    params: &AlignmentParameter,
    ctx: &RunContext,
) -> std::result::Result<bool, GapFillError>
where
    P: DataProvider,
    F: Fn(usize) -> Result<P> + Sync,
{
    let start = Instant::now();
    let counter = ctx.counter(ProcessingStage::GapFilling, num_files);
    let view: &[AlignmentSpotProperty] = spots;
    let per_file: Option<Vec<std::result::Result<Vec<GapFill>, GapFillError>>> = (0..num_files)
        .into_par_iter()
        .map(|file_id| {
            if ctx.is_cancelled() {
                return None;
            }
            let fills = open(file_id)
                .map(|provider| fill_file_gaps(&provider, file_id, view, params))
                .map_err(|source| GapFillError { file_id, source });
            counter.tick();
            Some(fills)
        })
        .collect();
    let Some(per_file) = per_file else {
        return Ok(false);
    };

    let mut fills: Vec<GapFill> = Vec::new();
    for file_fills in per_file {
        fills.extend(file_fills?);
    }
    let filled = fills
        .iter()
        .filter(|f| f.slot.state == PeakSlotState::GapFilled)
        .count();
    let total = fills.len();
    apply_gap_fills(spots, fills);
    info!(
        "Gap filled {} of {} slots in {:?}",
        filled,
        total,
        start.elapsed()
    );
    Ok(true)
}
