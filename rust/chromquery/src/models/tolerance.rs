use serde::{
    Deserialize,
    Serialize,
};

use crate::utils::TupleRange;

/// Mass above which the `scaled` m/z tolerance grows proportionally.
pub const SCALED_TOLERANCE_PIVOT_MZ: f64 = 500.0;

/// m/z tolerance, symmetric around the queried value.
///
/// ```
/// use chromquery::models::MzTolerance;
///
/// let tolerance = MzTolerance::Scaled(0.01);
/// // 0.01 Da at or below 500 ...
/// assert!((tolerance.da_at(300.0) - 0.01).abs() < 1e-12);
/// // ... and proportional above it.
/// assert!((tolerance.da_at(1000.0) - 0.02).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute(f64),
    #[serde(rename = "ppm")]
    Ppm(f64),
    /// Fixed Dalton window up to 500 Da, `da * mz / 500` above.
    #[serde(rename = "scaled")]
    Scaled(f64),
}

impl MzTolerance {
    /// Half width of the window, in Daltons, at the given m/z.
    pub fn da_at(&self, mz: f64) -> f64 {
        match self {
            MzTolerance::Absolute(da) => *da,
            MzTolerance::Ppm(ppm) => mz.abs() * ppm / 1e6,
            MzTolerance::Scaled(da) => {
                if mz <= SCALED_TOLERANCE_PIVOT_MZ {
                    *da
                } else {
                    da * mz / SCALED_TOLERANCE_PIVOT_MZ
                }
            }
        }
    }

    /// Closed range `[mz - tol, mz + tol]`, `None` for a NaN m/z.
    ///
    /// Negative tolerances collapse to the point itself.
    pub fn mz_range(&self, mz: f64) -> Option<TupleRange<f64>> {
        let tol = self.da_at(mz).max(0.0);
        TupleRange::try_new(mz - tol, mz + tol).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_tolerance() {
        let tol = MzTolerance::Scaled(0.01);
        assert_eq!(tol.da_at(500.0), 0.01);
        assert!((tol.da_at(750.0) - 0.015).abs() < 1e-12);
        let r = tol.mz_range(300.0).unwrap();
        assert!(tol.mz_range(f64::NAN).is_none());
        assert!((r.start() - 299.99).abs() < 1e-9);
        assert!((r.end() - 300.01).abs() < 1e-9);
    }

    #[test]
    fn test_ppm_tolerance() {
        let tol = MzTolerance::Ppm(10.0);
        assert!((tol.da_at(1000.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_json_uses_short_names() {
        let json = serde_json::to_string(&MzTolerance::Scaled(0.01)).unwrap();
        assert_eq!(json, r#"{"scaled":0.01}"#);
        let back: MzTolerance = serde_json::from_str(r#"{"da": 0.005}"#).unwrap();
        assert_eq!(back, MzTolerance::Absolute(0.005));
    }
}
