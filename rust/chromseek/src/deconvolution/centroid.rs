use chromquery::SpectrumPeak;

/// Merges runs of peaks closer than `tolerance` into a single centroid.
///
/// The centroid m/z is the intensity weighted mean of the run and its
/// intensity is the run maximum. Input must be sorted by m/z.
pub fn centroid_spectrum(peaks: &[SpectrumPeak], tolerance: f64) -> Vec<SpectrumPeak> {
    debug_assert!(peaks.windows(2).all(|w| w[0].mz <= w[1].mz));
    let mut out: Vec<SpectrumPeak> = Vec::with_capacity(peaks.len());
    // (weighted mz sum, weight sum, last mz) of the open run
    let mut run: Option<(f64, f64, f64)> = None;

    for peak in peaks.iter().filter(|p| p.intensity > 0.0) {
        if let Some((num, den, last_mz)) = run.as_mut() {
            if peak.mz - *last_mz <= tolerance {
                *num += peak.mz * peak.intensity;
                *den += peak.intensity;
                *last_mz = peak.mz;
                if let Some(current) = out.last_mut() {
                    current.mz = *num / *den;
                    current.intensity = current.intensity.max(peak.intensity);
                }
                continue;
            }
        }
        run = Some((peak.mz * peak.intensity, peak.intensity, peak.mz));
        out.push(*peak);
    }
    out
}

/// Applies the absolute and relative (percent of base peak) cutoffs.
///
/// With `max_mz` set, peaks above it are dropped as well.
pub fn filter_spectrum(
    peaks: Vec<SpectrumPeak>,
    amplitude_cutoff: f64,
    relative_cutoff_pct: f64,
    max_mz: Option<f64>,
) -> Vec<SpectrumPeak> {
    let base = peaks.iter().map(|p| p.intensity).fold(0.0, f64::max);
    let relative = base * relative_cutoff_pct / 100.0;
    peaks
        .into_iter()
        .filter(|p| p.intensity > 0.0)
        .filter(|p| p.intensity >= amplitude_cutoff && p.intensity >= relative)
        .filter(|p| max_mz.map_or(true, |m| p.mz <= m))
        .collect()
}
