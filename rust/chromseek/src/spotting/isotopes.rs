//! Isotope recognition among co-eluting features.

use chromquery::models::MzTolerance;
use chromquery::utils::binary_search_range_by_key;

use crate::models::{
    ChromatogramPeakFeature,
    IsotopeCharacter,
};

/// Mass difference between the 13C and 12C isotopes.
pub const C13_C12_DIFF: f64 = 1.003355;
pub const MAX_ISOTOPE_WEIGHT: u32 = 8;

/// Marks the isotopic peaks of every monoisotopic feature.
///
/// Features are visited by ascending mass. For each candidate charge the
/// ladder `m + k * 1.003355 / z` is followed while every step finds a
/// co-eluting, less intense, not yet assigned feature; the charge with the
/// longest ladder wins (ties to the lower charge). Features that are not part
/// of any ladder stay monoisotopic.
pub fn assign_isotopes(
    features: &mut [ChromatogramPeakFeature],
    ms1_tolerance: &MzTolerance,
    rt_tolerance: f64,
    max_charge: u8,
) {
    for f in features.iter_mut() {
        f.isotope = IsotopeCharacter::monoisotopic(f.peak_id);
    }

    let mut by_mass: Vec<usize> = (0..features.len()).collect();
    by_mass.sort_by(|&a, &b| {
        features[a]
            .accurate_mass
            .total_cmp(&features[b].accurate_mass)
            .then(a.cmp(&b))
    });
    let masses: Vec<f64> = by_mass.iter().map(|&i| features[i].accurate_mass).collect();
    let mut assigned = vec![false; features.len()];

    for &parent in by_mass.iter() {
        if assigned[parent] {
            continue;
        }
        let parent_mass = features[parent].accurate_mass;
        let parent_rt = features[parent].chrom_top.rt;
        let parent_height = features[parent].height;

        let mut best: Option<(u8, Vec<usize>)> = None;
        for charge in 1..=max_charge.max(1) {
            let mut ladder = Vec::new();
            for k in 1..=MAX_ISOTOPE_WEIGHT {
                let target = parent_mass + k as f64 * C13_C12_DIFF / charge as f64;
                let tol = ms1_tolerance.da_at(target);
                let range = binary_search_range_by_key(&masses, target - tol, target + tol, |x| *x);
                let step = by_mass[range]
                    .iter()
                    .copied()
                    .filter(|&c| c != parent && !assigned[c])
                    .filter(|&c| (features[c].chrom_top.rt - parent_rt).abs() <= rt_tolerance)
                    .filter(|&c| features[c].height < parent_height)
                    .min_by(|&a, &b| {
                        (features[a].accurate_mass - target)
                            .abs()
                            .total_cmp(&(features[b].accurate_mass - target).abs())
                            .then(a.cmp(&b))
                    });
                match step {
                    Some(c) => ladder.push(c),
                    None => break,
                }
            }
            let better = match &best {
                None => !ladder.is_empty(),
                Some((_, current)) => ladder.len() > current.len(),
            };
            if better {
                best = Some((charge, ladder));
            }
        }

        if let Some((charge, ladder)) = best {
            let parent_id = features[parent].peak_id;
            features[parent].isotope.charge = charge;
            for (k, &c) in ladder.iter().enumerate() {
                assigned[c] = true;
                features[c].isotope = IsotopeCharacter {
                    weight_number: k as u32 + 1,
                    parent_peak_id: parent_id,
                    charge,
                };
            }
        }
    }
}
