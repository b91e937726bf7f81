//! Reference anchored joint alignment of features across files.
//!
//! A master list is seeded with the reference file's features, then every
//! other file (in file order) adds the features that are within tolerance of
//! no master coming from another file. Each file is then joined against the
//! masters: all pairs in tolerance are ranked by mass distance, then axis
//! distance, and assigned greedily one to one. Features that lose the join
//! open a spot of their own. The same join runs on drift x mass for the drift
//! features nested in every RT spot.

use chromquery::ChromXs;
use chromquery::utils::streaming_calculators::RunningStatsCalculator;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

use crate::models::{
    AlignedPeakProperty,
    AlignmentSpotProperty,
    ChromatogramPeakFeature,
    MsScanMatchResult,
    PeakSlotState,
};
use crate::parameters::AlignmentParameter;

/// Position of a feature in the joined space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct JoinPoint {
    axis: f64,
    mass: f64,
}

#[derive(Debug, Clone, Copy)]
struct JoinTolerance {
    axis: f64,
    mass: f64,
}

impl JoinTolerance {
    fn accepts(&self, a: &JoinPoint, b: &JoinPoint) -> bool {
        (a.mass - b.mass).abs() <= self.mass && (a.axis - b.axis).abs() <= self.axis
    }
}

/// Anchors of the join, sorted by mass for lookup.
struct MasterList {
    points: Vec<JoinPoint>,
    /// File each master was taken from.
    origins: Vec<usize>,
    by_mass: Vec<usize>,
}

impl MasterList {
    fn new() -> Self {
        Self {
            points: Vec::new(),
            origins: Vec::new(),
            by_mass: Vec::new(),
        }
    }

    fn push(&mut self, point: JoinPoint, origin: usize) {
        let idx = self.points.len();
        self.points.push(point);
        self.origins.push(origin);
        let at = self
            .by_mass
            .partition_point(|&m| self.points[m].mass < point.mass);
        self.by_mass.insert(at, idx);
    }

    /// Masters within tolerance of `point`, in mass order.
    fn within<'a>(&'a self, point: &'a JoinPoint, tol: &'a JoinTolerance) -> impl Iterator<Item = usize> + 'a {
        let lo = self
            .by_mass
            .partition_point(|&m| self.points[m].mass - point.mass < -tol.mass);
        self.by_mass[lo..]
            .iter()
            .copied()
            .take_while(move |&m| self.points[m].mass - point.mass <= tol.mass)
            .filter(move |&m| tol.accepts(&self.points[m], point))
    }
}

/// Joins the points of every file.
///
/// Returns one row per master holding the index of the matched point of every
/// file, followed by one row per point that lost the join. Every point ends
/// up in exactly one row. Rows can be empty.
fn join(files: &[Vec<JoinPoint>], reference: usize, tol: &JoinTolerance) -> Vec<Vec<Option<usize>>> {
    let mut masters = MasterList::new();
    if let Some(points) = files.get(reference) {
        for p in points {
            masters.push(*p, reference);
        }
    }
    for (file_id, points) in files.iter().enumerate() {
        if file_id == reference {
            continue;
        }
        for p in points {
            if !masters.within(p, tol).any(|m| masters.origins[m] != file_id) {
                masters.push(*p, file_id);
            }
        }
    }

    let mut rows = vec![vec![None; files.len()]; masters.points.len()];
    let mut leftovers: Vec<Vec<Option<usize>>> = Vec::new();
    for (file_id, points) in files.iter().enumerate() {
        let mut pairs: Vec<(f64, f64, usize, usize)> = Vec::new();
        for (feature_idx, p) in points.iter().enumerate() {
            for m in masters.within(p, tol) {
                let anchor = &masters.points[m];
                pairs.push((
                    (anchor.mass - p.mass).abs(),
                    (anchor.axis - p.axis).abs(),
                    m,
                    feature_idx,
                ));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });
        let mut taken = vec![false; points.len()];
        for (_, _, m, f) in pairs {
            if rows[m][file_id].is_none() && !taken[f] {
                rows[m][file_id] = Some(f);
                taken[f] = true;
            }
        }
        let before = leftovers.len();
        for (f, _) in taken.iter().enumerate().filter(|(_, t)| !**t) {
            let mut row = vec![None; files.len()];
            row[file_id] = Some(f);
            leftovers.push(row);
        }
        if leftovers.len() > before {
            debug!(
                "{} features of file {} lost the join and open their own spot",
                leftovers.len() - before,
                file_id
            );
        }
    }
    rows.extend(leftovers);
    rows
}

/// Highest ranked identity among the members: spectrum matches first, then
/// total score. Ties go to the earlier file.
fn best_identity<'a>(members: impl Iterator<Item = &'a ChromatogramPeakFeature>) -> Option<MsScanMatchResult> {
    let mut best: Option<&MsScanMatchResult> = None;
    for id in members.filter_map(|f| f.primary_identity.as_ref()) {
        let better = match best {
            None => true,
            Some(b) => {
                (id.is_spectrum_match, id.total_score) > (b.is_spectrum_match, b.total_score)
            }
        };
        if better {
            best = Some(id);
        }
    }
    best.cloned()
}

fn detected_slot(file_id: usize, feature: &ChromatogramPeakFeature) -> AlignedPeakProperty {
    AlignedPeakProperty {
        file_id,
        peak_id: feature.peak_id as i64,
        chrom: feature.chrom_top,
        mass: feature.accurate_mass,
        height: feature.height,
        area: feature.area,
        ms2_raw_scan: feature.ms2_raw_scan,
        state: PeakSlotState::Detected,
    }
}

/// Builds a spot out of a joined row, `None` for rows without members.
///
/// `chrom_of` turns the mean axis value of the members into coordinates.
fn build_spot(
    row: &[Option<usize>],
    files: &[&[ChromatogramPeakFeature]],
    chrom_of: impl Fn(f64) -> ChromXs,
) -> Option<AlignmentSpotProperty> {
    let mut axis = RunningStatsCalculator::default();
    let mut mass = RunningStatsCalculator::default();
    let mut min_rt = f64::INFINITY;
    let mut max_rt = f64::NEG_INFINITY;
    let mut min_drift = f64::INFINITY;
    let mut max_drift = f64::NEG_INFINITY;
    let mut representative: Option<(usize, f64)> = None;
    let mut members = Vec::new();

    for (file_id, member) in row.iter().enumerate() {
        let Some(f) = member.and_then(|i| files[file_id].get(i)) else {
            continue;
        };
        axis.add(1.0, f.chrom_top.value());
        mass.add(1.0, f.accurate_mass);
        min_rt = min_rt.min(f.chrom_left.rt);
        max_rt = max_rt.max(f.chrom_right.rt);
        min_drift = min_drift.min(f.chrom_left.drift);
        max_drift = max_drift.max(f.chrom_right.drift);
        if representative.map_or(true, |(_, h)| f.height > h) {
            representative = Some((file_id, f.height));
        }
        members.push(f);
    }
    let (representative_file_id, _) = representative?;
    let central_chrom = chrom_of(axis.mean().ok()?);
    let central_mass = mass.mean().ok()?;

    let aligned_peaks: Vec<AlignedPeakProperty> = row
        .iter()
        .enumerate()
        .map(|(file_id, member)| match member.and_then(|i| files[file_id].get(i)) {
            Some(f) => detected_slot(file_id, f),
            None => AlignedPeakProperty::gap(file_id, central_chrom, central_mass),
        })
        .collect();

    Some(AlignmentSpotProperty {
        spot_id: 0,
        central_chrom,
        central_mass,
        min_rt,
        max_rt,
        min_drift,
        max_drift,
        fill_percentage: members.len() as f64 / row.len() as f64,
        representative_file_id,
        identity: best_identity(members.into_iter()),
        aligned_peaks,
        drift_spots: Vec::new(),
    })
}

/// Sorts spots by (main axis, mass) and numbers them.
fn sort_and_number(spots: &mut [(AlignmentSpotProperty, Vec<Option<usize>>)]) {
    spots.sort_by(|a, b| {
        a.0.central_chrom
            .value()
            .total_cmp(&b.0.central_chrom.value())
            .then(a.0.central_mass.total_cmp(&b.0.central_mass))
    });
    for (i, (spot, _)) in spots.iter_mut().enumerate() {
        spot.spot_id = i;
    }
}

/// Drift spots of one RT spot from the drift features of its members.
fn align_drift(
    row: &[Option<usize>],
    files: &[Vec<ChromatogramPeakFeature>],
    parent: &AlignmentSpotProperty,
    reference: usize,
    params: &AlignmentParameter,
) -> Vec<AlignmentSpotProperty> {
    let empty: &[ChromatogramPeakFeature] = &[];
    let drift_files: Vec<&[ChromatogramPeakFeature]> = row
        .iter()
        .enumerate()
        .map(|(file_id, member)| match member.and_then(|i| files[file_id].get(i)) {
            Some(f) => f.drift_features.as_slice(),
            None => empty,
        })
        .collect();
    if drift_files.iter().all(|d| d.is_empty()) {
        return Vec::new();
    }
    let points: Vec<Vec<JoinPoint>> = drift_files
        .iter()
        .map(|d| {
            d.iter()
                .map(|f| JoinPoint {
                    axis: f.chrom_top.drift,
                    mass: f.accurate_mass,
                })
                .collect()
        })
        .collect();
    let tol = JoinTolerance {
        axis: params.drift_tolerance,
        mass: params.mass_tolerance,
    };
    let rt = parent.central_chrom.rt;
    let mut spots: Vec<(AlignmentSpotProperty, Vec<Option<usize>>)> = join(&points, reference, &tol)
        .into_iter()
        .filter_map(|row| {
            let mut spot = build_spot(&row, &drift_files, |drift| ChromXs::from_drift(rt, drift))?;
            spot.min_rt = parent.min_rt;
            spot.max_rt = parent.max_rt;
            Some((spot, row))
        })
        .collect();
    sort_and_number(&mut spots);
    spots.into_iter().map(|(s, _)| s).collect()
}

/// Aligns the features of several files.
///
/// Spots come out sorted by (RT, mass) and numbered from 0, every spot has
/// one slot per file in file order. The alignment id of every aligned
/// feature is written back.
#[tracing::instrument(skip_all, level = "debug")]
pub fn align_features(
    files: &mut [Vec<ChromatogramPeakFeature>],
    params: &AlignmentParameter,
) -> Vec<AlignmentSpotProperty> {
    if files.is_empty() {
        return Vec::new();
    }
    for feature in files.iter_mut().flatten() {
        feature.alignment_id = None;
    }
    let start = Instant::now();
    let reference = if params.reference_file_index < files.len() {
        params.reference_file_index
    } else {
        debug!(
            "Reference file {} out of range, using file 0",
            params.reference_file_index
        );
        0
    };

    let points: Vec<Vec<JoinPoint>> = files
        .iter()
        .map(|fs| {
            fs.iter()
                .map(|f| JoinPoint {
                    axis: f.chrom_top.rt,
                    mass: f.accurate_mass,
                })
                .collect()
        })
        .collect();
    let tol = JoinTolerance {
        axis: params.rt_tolerance,
        mass: params.mass_tolerance,
    };
    let rows = join(&points, reference, &tol);

    let views: Vec<&[ChromatogramPeakFeature]> = files.iter().map(|f| f.as_slice()).collect();
    let mut spots: Vec<(AlignmentSpotProperty, Vec<Option<usize>>)> = rows
        .into_iter()
        .filter_map(|row| Some((build_spot(&row, &views, ChromXs::from_rt)?, row)))
        .collect();
    sort_and_number(&mut spots);

    for (spot, row) in spots.iter_mut() {
        spot.drift_spots = align_drift(row, files, spot, reference, params);
    }
    for (spot, row) in spots.iter() {
        for (file_id, member) in row.iter().enumerate() {
            if let Some(f) = member.and_then(|i| files[file_id].get_mut(i)) {
                f.alignment_id = Some(spot.spot_id);
            }
        }
    }

    let num_features: usize = files.iter().map(|f| f.len()).sum();
    info!(
        "Aligned {} features from {} files into {} spots in {:?}",
        num_features,
        files.len(),
        spots.len(),
        start.elapsed()
    );
    spots.into_iter().map(|(s, _)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnnotationSource,
        IsotopeCharacter,
    };

    fn feature(id: usize, rt: f64, mass: f64, height: f64) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature {
            peak_id: id,
            chrom_top: ChromXs::from_rt(rt),
            chrom_left: ChromXs::from_rt(rt - 0.05),
            chrom_right: ChromXs::from_rt(rt + 0.05),
            scan_top: 0,
            scan_left: 0,
            scan_right: 0,
            accurate_mass: mass,
            height,
            area: height * 0.1,
            signal_to_noise: 10.0,
            estimated_noise: 1.0,
            isotope: IsotopeCharacter::monoisotopic(id),
            adduct: "[M+H]+".into(),
            ms2_raw_scan: None,
            ms2_scans: vec![],
            drift_features: vec![],
            primary_identity: None,
            alignment_id: None,
        }
    }

    fn params() -> AlignmentParameter {
        AlignmentParameter {
            rt_tolerance: 0.05,
            mass_tolerance: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_compound_in_three_files() {
        let mut files = vec![
            vec![feature(0, 5.0, 300.1, 1000.0)],
            vec![feature(0, 5.01, 300.101, 1200.0)],
            vec![feature(0, 4.99, 300.099, 900.0)],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 1);
        let spot = &spots[0];
        assert_eq!(spot.num_detected(), 3);
        assert!((spot.central_chrom.rt - 5.0).abs() < 1e-9);
        assert!((spot.central_mass - 300.1).abs() < 1e-9);
        assert_eq!(spot.representative_file_id, 1);
        assert_eq!(spot.fill_percentage, 1.0);
        assert!((spot.min_rt - 4.94).abs() < 1e-9);
        let files_in_order: Vec<usize> = spot.aligned_peaks.iter().map(|p| p.file_id).collect();
        assert_eq!(files_in_order, vec![0, 1, 2]);
        assert!(files.iter().all(|f| f[0].alignment_id == Some(0)));
    }

    #[test]
    fn test_missing_feature_is_a_gap() {
        let mut files = vec![
            vec![feature(0, 5.0, 300.1, 1000.0), feature(1, 6.0, 400.2, 500.0)],
            vec![feature(0, 5.0, 300.1, 1000.0)],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 2);
        let second = &spots[1];
        assert_eq!(second.aligned_peaks[1].state, PeakSlotState::Gap);
        assert!(!second.aligned_peaks[1].is_detected());
        assert_eq!(second.aligned_peaks[1].mass, second.central_mass);
        assert_eq!(second.fill_percentage, 0.5);
    }

    #[test]
    fn test_features_only_in_later_files_make_spots() {
        let mut files = vec![
            vec![feature(0, 5.0, 300.1, 1000.0)],
            vec![feature(0, 3.0, 200.0, 1000.0)],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 2);
        assert!((spots[0].central_chrom.rt - 3.0).abs() < 1e-9);
        assert_eq!(spots[0].spot_id, 0);
        assert_eq!(files[1][0].alignment_id, Some(0));
        assert_eq!(files[0][0].alignment_id, Some(1));
    }

    #[test]
    fn test_greedy_prefers_nearest_mass() {
        let mut files = vec![
            vec![feature(0, 5.0, 300.100, 1000.0)],
            vec![feature(0, 5.0, 300.108, 1000.0), feature(1, 5.02, 300.101, 1000.0)],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 2);
        let shared = &spots[files[0][0].alignment_id.unwrap()];
        assert_eq!(shared.num_detected(), 2);
        assert_eq!(shared.aligned_peaks[1].peak_id, 1);

        // The loser keeps its own spot with a gap in the reference file.
        let own = &spots[files[1][0].alignment_id.unwrap()];
        assert_eq!(own.num_detected(), 1);
        assert_eq!(own.aligned_peaks[1].peak_id, 0);
        assert_eq!(own.aligned_peaks[0].state, PeakSlotState::Gap);
    }

    #[test]
    fn test_close_features_of_one_file_stay_apart() {
        let mut files = vec![
            vec![],
            vec![feature(0, 5.0, 300.100, 1000.0), feature(1, 5.0, 300.106, 800.0)],
            vec![feature(0, 5.0, 300.106, 700.0)],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 2);
        assert_eq!(files[1][0].alignment_id, Some(0));
        assert_eq!(files[1][1].alignment_id, Some(1));
        assert_eq!(files[2][0].alignment_id, Some(1));
        assert_eq!(spots[0].num_detected(), 1);
        assert_eq!(spots[1].num_detected(), 2);
        assert!((spots[1].central_mass - 300.106).abs() < 1e-9);
    }

    #[test]
    fn test_every_feature_is_aligned() {
        let mut files = vec![
            vec![feature(0, 5.0, 300.100, 1000.0), feature(1, 5.01, 300.104, 900.0)],
            vec![
                feature(0, 5.0, 300.101, 1000.0),
                feature(1, 5.0, 300.103, 1000.0),
                feature(2, 5.02, 300.105, 1000.0),
            ],
            vec![feature(0, 4.99, 300.102, 1000.0)],
        ];
        let spots = align_features(&mut files, &params());
        let detected: usize = spots.iter().map(|s| s.num_detected()).sum();
        assert_eq!(detected, 6);
        for file in files.iter() {
            assert!(file.iter().all(|f| f.alignment_id.is_some()));
        }
        for spot in spots.iter() {
            assert_eq!(spot.aligned_peaks.len(), 3);
        }
    }

    #[test]
    fn test_identity_prefers_spectrum_match() {
        let mut a = feature(0, 5.0, 300.1, 1000.0);
        a.primary_identity = Some(MsScanMatchResult {
            name: "precursor only".into(),
            total_score: 0.9,
            source: AnnotationSource::TextLibrary,
            ..Default::default()
        });
        let mut b = feature(0, 5.0, 300.1, 1000.0);
        b.primary_identity = Some(MsScanMatchResult {
            name: "spectrum".into(),
            total_score: 0.6,
            is_spectrum_match: true,
            ..Default::default()
        });
        let mut files = vec![vec![a], vec![b]];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots[0].identity.as_ref().unwrap().name, "spectrum");
    }

    #[test]
    fn test_drift_spots() {
        let with_drift = |rt: f64, drifts: &[f64]| {
            let mut f = feature(0, rt, 300.1, 1000.0);
            f.drift_features = drifts
                .iter()
                .enumerate()
                .map(|(i, &d)| {
                    let mut df = feature(i, rt, 300.1, 500.0);
                    df.chrom_top = ChromXs::from_drift(rt, d);
                    df.chrom_left = ChromXs::from_drift(rt, d - 0.01);
                    df.chrom_right = ChromXs::from_drift(rt, d + 0.01);
                    df
                })
                .collect();
            f
        };
        let mut files = vec![
            vec![with_drift(5.0, &[20.0, 25.0])],
            vec![with_drift(5.0, &[20.005])],
        ];
        let spots = align_features(&mut files, &params());
        assert_eq!(spots.len(), 1);
        let drift = &spots[0].drift_spots;
        assert_eq!(drift.len(), 2);
        assert_eq!(drift[0].num_detected(), 2);
        assert_eq!(drift[1].num_detected(), 1);
        assert_eq!(drift[1].aligned_peaks[1].state, PeakSlotState::Gap);
        assert!((drift[0].central_chrom.drift - 20.0025).abs() < 1e-9);
        assert_eq!(drift[1].min_rt, spots[0].min_rt);
    }
}
