use serde::{
    Deserialize,
    Serialize,
};

/// Smoothing applied to chromatograms and mobilograms before peak detection.
///
/// The `level` passed alongside is the half width of the window
/// (a level of 2 means 5 points), for the binomial filter it is the number
/// of passes of the [1, 2, 1] kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SmoothingMethod {
    SimpleMovingAverage,
    #[default]
    LinearWeightedMovingAverage,
    SavitzkyGolay,
    BinomialFilter,
}

pub fn smooth(values: &[f64], method: SmoothingMethod, level: usize) -> Vec<f64> {
    if level == 0 || values.len() < 3 {
        return values.to_vec();
    }
    match method {
        SmoothingMethod::SimpleMovingAverage => weighted_window(values, level, |_| 1.0),
        SmoothingMethod::LinearWeightedMovingAverage => {
            weighted_window(values, level, |k| (level + 1 - k) as f64)
        }
        SmoothingMethod::SavitzkyGolay => savitzky_golay(values, level),
        SmoothingMethod::BinomialFilter => {
            let mut out = values.to_vec();
            for _ in 0..level {
                binomial_pass_in_place(&mut out);
            }
            out
        }
    }
}

/// Symmetric window of half width `half`, `weight(k)` gives the weight of the
/// points at distance `k` from the center.
///
/// Close to the edges the window is truncated and re-normalized.
fn weighted_window(values: &[f64], half: usize, weight: impl Fn(usize) -> f64) -> Vec<f64> {
    let len = values.len();
    let weights: Vec<f64> = (0..=half).map(&weight).collect();
    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(len - 1);
            let mut acc = 0.0;
            let mut norm = 0.0;
            for (j, v) in values.iter().enumerate().take(hi + 1).skip(lo) {
                let w = weights[i.abs_diff(j)];
                acc += w * v;
                norm += w;
            }
            acc / norm
        })
        .collect()
}

/// Quadratic/cubic Savitzky-Golay smoothing coefficients for a window of
/// `2 * half + 1` points.
fn savitzky_golay_coefficients(half: usize) -> Vec<f64> {
    let m = half as f64;
    let norm = (2.0 * m - 1.0) * (2.0 * m + 1.0) * (2.0 * m + 3.0);
    let base = 3.0 * (3.0 * m * m + 3.0 * m - 1.0);
    (0..=half)
        .map(|k| {
            let k = k as f64;
            (base - 15.0 * k * k) / norm
        })
        .collect()
}

fn savitzky_golay(values: &[f64], half: usize) -> Vec<f64> {
    let len = values.len();
    // Needs at least a full window, under that it falls back to the weighted average.
    if len < 2 * half + 1 || half < 2 {
        return weighted_window(values, half.max(1), |k| (half.max(1) + 1 - k) as f64);
    }
    let coefs = savitzky_golay_coefficients(half);
    let edge = weighted_window(values, half, |k| (half + 1 - k) as f64);
    (0..len)
        .map(|i| {
            if i < half || i + half >= len {
                return edge[i];
            }
            let mut acc = coefs[0] * values[i];
            for k in 1..=half {
                acc += coefs[k] * (values[i - k] + values[i + k]);
            }
            acc
        })
        .collect()
}

/// One pass of the [0.5, 1.0, 0.5] / 2 kernel, edges mirror the center weight.
fn binomial_pass_in_place(x: &mut [f64]) {
    let len = x.len();
    if len < 3 {
        return;
    }
    const W_SIDE: f64 = 0.5;
    const W_CENTER: f64 = 1.0;
    const NORM: f64 = 2.0;

    let mut prev_val = x[0];
    x[0] = (x[0] * 1.5 + x[1] * 0.5) / NORM;

    for i in 1..len - 1 {
        let current_val = x[i];
        x[i] = (prev_val * W_SIDE + current_val * W_CENTER + x[i + 1] * W_SIDE) / NORM;
        prev_val = current_val;
    }
    x[len - 1] = (x[len - 1] * 1.5 + prev_val * 0.5) / NORM;
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METHODS: [SmoothingMethod; 4] = [
        SmoothingMethod::SimpleMovingAverage,
        SmoothingMethod::LinearWeightedMovingAverage,
        SmoothingMethod::SavitzkyGolay,
        SmoothingMethod::BinomialFilter,
    ];

    #[test]
    fn test_constant_is_preserved() {
        let values = vec![3.0; 20];
        for method in ALL_METHODS {
            let out = smooth(&values, method, 3);
            for v in out {
                assert!((v - 3.0).abs() < 1e-9, "{method:?} -> {v}");
            }
        }
    }

    #[test]
    fn test_level_zero_is_identity() {
        let values = vec![1.0, 5.0, 2.0, 8.0];
        assert_eq!(smooth(&values, SmoothingMethod::SavitzkyGolay, 0), values);
    }

    #[test]
    fn test_sg_coefficients_sum_to_one() {
        for half in 2..8 {
            let c = savitzky_golay_coefficients(half);
            let total: f64 = c[0] + 2.0 * c[1..].iter().sum::<f64>();
            assert!((total - 1.0).abs() < 1e-12, "{half} {total}");
        }
        // Classic 5 point window: [-3, 12, 17, 12, -3] / 35
        let c = savitzky_golay_coefficients(2);
        assert!((c[0] - 17.0 / 35.0).abs() < 1e-12);
        assert!((c[2] + 3.0 / 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_spike_is_attenuated() {
        let mut values = vec![0.0; 11];
        values[5] = 10.0;
        for method in ALL_METHODS {
            let out = smooth(&values, method, 2);
            assert!(out[5] < 10.0, "{method:?}");
            assert!(out[4] > 0.0);
            if method == SmoothingMethod::SimpleMovingAverage {
                // flat top
                continue;
            }
            let max_idx = out
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .unwrap()
                .0;
            assert_eq!(max_idx, 5, "{method:?}");
        }
    }
}
