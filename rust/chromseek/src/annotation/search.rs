use std::ops::Range;

use crate::models::MoleculeMsReference;

/// Entries with `|precursor_mz - mass| <= tolerance`.
///
/// The library must be sorted by precursor m/z. The lower bound is found by
/// binary search, then the entries are scanned forward while they are still
/// in tolerance, so the result is the same as a linear scan.
pub fn candidate_range(library: &[MoleculeMsReference], mass: f64, tolerance: f64) -> Range<usize> {
    debug_assert!(library.windows(2).all(|w| w[0].precursor_mz <= w[1].precursor_mz));
    // Compared as a difference so rounding matches the forward scan.
    let start = library.partition_point(|e| e.precursor_mz - mass < -tolerance);
    let mut end = start;
    while end < library.len() && (library[end].precursor_mz - mass).abs() <= tolerance {
        end += 1;
    }
    start..end
}
