pub mod peak_detection;
pub mod smoothing;
pub mod streaming_calculators;

use std::ops::Range;
use thiserror::Error;

/// Finds the index range of elements in a sorted slice whose keys fall within
/// the closed range `[lo, hi]`.
///
/// The slice has to be sorted by `key_fn`; if it is not, the returned range is
/// meaningless (but the function will not panic).
///
/// # Examples
///
/// ```
/// use chromquery::utils::binary_search_range_by_key;
///
/// let rts = vec![1.0, 2.0, 2.5, 3.0, 4.0];
/// let range = binary_search_range_by_key(&rts, 2.0, 3.0, |x| *x);
/// assert_eq!(&rts[range], &[2.0, 2.5, 3.0]);
///
/// let empty = binary_search_range_by_key(&rts, 10.0, 12.0, |x| *x);
/// assert!(empty.is_empty());
/// ```
pub fn binary_search_range_by_key<T, K, F>(slice: &[T], lo: K, hi: K, key_fn: F) -> Range<usize>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    let start_idx = slice.partition_point(|x| key_fn(x) < lo);
    let end_idx = start_idx + slice[start_idx..].partition_point(|x| key_fn(x) <= hi);

    start_idx..end_idx
}

/// TupleRange represents a range defined by a tuple of two elements (T, T).
///
/// It represents a range as closed-closed [a, b], meaning both endpoints are inclusive.
/// It ensures that the first element is always less than or equal to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        // Note that this also rejects NaN bounds for floats.
        if left <= right {
            Ok(Self(left, right))
        } else {
            Err(TupleRangeError::ExpectedOrderedRange(left, right))
        }
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }
}

/// Median of a slice of floats, NaNs are ignored.
///
/// Returns `None` for an empty (or all NaN) input.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_search() {
        let input = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let result = binary_search_range_by_key(&input, 3, 7, |&x| x);
        assert_eq!(result, 2..7);

        assert_eq!(&input[result], &[3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_slice_search_repeats() {
        let input = vec![
            1, 2, 3, 3, 3, 3, 3, 3, 3, 3, 4, 5, 6, 7, 7, 7, 7, 7, 8, 9, 10,
        ];
        let result = binary_search_range_by_key(&input, 3, 7, |&x| x);
        assert_eq!(result, 2..18);
    }

    #[test]
    fn test_tuple_range_rejects_unordered() {
        assert!(TupleRange::try_new(2.0, 1.0).is_err());
        assert!(TupleRange::try_new(f64::NAN, 1.0).is_err());
        let r = TupleRange::try_new(1.0, 1.0).unwrap();
        assert_eq!((r.start(), r.end()), (1.0, 1.0));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
