use crate::errors::{
    DataProcessingError,
    Result,
};

fn check_same_length(a: &[f64], b: &[f64], context: &str) -> Result<()> {
    if a.len() != b.len() || a.is_empty() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: a.len(),
            other: b.len(),
            context: context.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Pearson correlation between two vectors of the same size.
///
/// Constant inputs have no defined correlation and give NaN, which
/// fails every `>=` threshold comparison.
///
/// # Example
///
/// ```
/// use chromseek::utils::correlation::pearson_correlation;
///
/// let a = vec![1.0, 2.0, 3.0, 2.0, 1.0];
/// let b = vec![10.0, 20.0, 30.0, 20.0, 10.0];
/// assert!((pearson_correlation(&a, &b).unwrap() - 1.0).abs() < 1e-12);
/// ```
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Result<f64> {
    check_same_length(a, b, "pearson_correlation")?;
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (cov, var_a, var_b) = a.iter().zip(b.iter()).fold(
        (0.0, 0.0, 0.0),
        |(cov, va, vb), (&x, &y)| {
            let dx = x - mean_a;
            let dy = y - mean_b;
            (cov + dx * dy, va + dx * dx, vb + dy * dy)
        },
    );
    if var_a == 0.0 || var_b == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// `exp(-0.5 * (diff / tol)^2)`, 1 at a perfect match.
///
/// A non positive tolerance only accepts exact matches.
pub fn gaussian_similarity(diff: f64, tol: f64) -> f64 {
    if tol <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.0 };
    }
    let z = diff / tol;
    (-0.5 * z * z).exp()
}

/// Ideal gaussian sampled at `times`, centered at `center` with the given sigma.
pub fn gaussian_profile(times: &[f64], center: f64, sigma: f64) -> Vec<f64> {
    times
        .iter()
        .map(|t| {
            if sigma > 0.0 {
                let z = (t - center) / sigma;
                (-0.5 * z * z).exp()
            } else if *t == center {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}
