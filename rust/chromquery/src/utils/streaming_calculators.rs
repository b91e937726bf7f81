use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingAggregatorError {
    NotEnoughData,
}

type Result<T> = std::result::Result<T, StreamingAggregatorError>;

/// Weighted streaming mean/variance with min and max tracking.
///
/// Used wherever a centroid has to be built from members that arrive one
/// at a time (alignment spots, mobility children).
///
/// # Example
///
/// ```
/// use chromquery::utils::streaming_calculators::RunningStatsCalculator;
///
/// let mut calc = RunningStatsCalculator::default();
/// for v in [0.0, 10.0, 0.0, 10.0, 0.0, 10.0] {
///     calc.add(1.0, v);
/// }
/// assert_eq!(calc.mean().unwrap(), 5.0);
/// assert_eq!(calc.min().unwrap(), 0.0);
/// assert_eq!(calc.max().unwrap(), 10.0);
/// ```
///
/// # References
///
/// - West, D. H. D. (1979). Updating mean and variance estimates: an improved method.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStatsCalculator {
    weight: f64,
    mean_n: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStatsCalculator {
    pub fn new(weight: f64, mean: f64) -> Self {
        let mut out = Self::default();
        out.add(weight, mean);
        out
    }

    /// Add a new value to the running stats calculator.
    ///
    /// Values with a non positive (or non finite) weight or a non finite value are ignored.
    pub fn add(&mut self, weight: f64, value: f64) {
        if !(weight > 0.0) || !weight.is_finite() || !value.is_finite() {
            return;
        }
        if self.weight == 0.0 {
            self.weight = weight;
            self.mean_n = value;
            self.m2 = 0.0;
            self.min = value;
            self.max = value;
            return;
        }

        let new_weight = self.weight + weight;
        let delta = value - self.mean_n;
        let r = delta * weight / new_weight;
        self.mean_n += r;
        self.m2 += self.weight * delta * r;
        self.weight = new_weight;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        // Rounding can push the mean a hair outside of the observed values.
        self.mean_n = self.mean_n.clamp(self.min, self.max);
    }

    pub fn mean(&self) -> Result<f64> {
        if self.weight == 0. {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.mean_n)
    }

    /// Population variance of the weighted values.
    pub fn variance(&self) -> Result<f64> {
        if self.weight == 0. {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok((self.m2 / self.weight).max(0.0))
    }

    pub fn standard_deviation(&self) -> Result<f64> {
        Ok(self.variance()?.sqrt())
    }

    pub fn min(&self) -> Result<f64> {
        if self.weight == 0. {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.min)
    }

    pub fn max(&self) -> Result<f64> {
        if self.weight == 0. {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.max)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl AddAssign for RunningStatsCalculator {
    fn add_assign(&mut self, other: Self) {
        if other.weight == 0. {
            return;
        }
        if self.weight == 0. {
            *self = other;
            return;
        }
        let total = self.weight + other.weight;
        let delta = other.mean_n - self.mean_n;
        self.m2 += other.m2 + delta * delta * self.weight * other.weight / total;
        self.mean_n += delta * other.weight / total;
        self.weight = total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.mean_n = self.mean_n.clamp(self.min, self.max);
    }
}
