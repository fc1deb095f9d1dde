//! StatsScan - single pass min/max/mean over sensor samples
//!
//! Works on any primitive numeric sample type (`u16` frames in practice).
//! The sum is accumulated in `f64` so the mean is exact for any realistic
//! frame size.

use num_traits::ToPrimitive;
use thiserror::Error;

/// Error types for StatsScan operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("Value at index {0} is not representable as f64")]
    Unrepresentable(usize),
    #[error("No data provided (empty input)")]
    NoData,
}

/// A scanner for statistics over sample data
///
/// Computes min, max, sum, and count in a single pass. Mean is derived from sum/count.
#[derive(Debug, Clone)]
pub struct StatsScan<T> {
    min_value: Option<T>,
    max_value: Option<T>,
    sum: f64,
    count: usize,
    bad_index: Option<usize>,
}

impl<T: Copy + PartialOrd + ToPrimitive> StatsScan<T> {
    /// Scan every value produced by `data`.
    ///
    /// Scanning stops at the first value that cannot be converted to `f64`.
    pub fn new<I: IntoIterator<Item = T>>(data: I) -> Self {
        let mut min_value: Option<T> = None;
        let mut max_value: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut bad_index = None;

        for (index, value) in data.into_iter().enumerate() {
            let Some(as_f64) = value.to_f64().filter(|v| !v.is_nan()) else {
                bad_index = Some(index);
                break;
            };

            sum += as_f64;
            count += 1;

            if min_value.map_or(true, |m| value < m) {
                min_value = Some(value);
            }
            if max_value.map_or(true, |m| value > m) {
                max_value = Some(value);
            }
        }

        Self {
            min_value,
            max_value,
            sum,
            count,
            bad_index,
        }
    }

    fn check(&self) -> Result<(), StatsError> {
        match self.bad_index {
            Some(index) => Err(StatsError::Unrepresentable(index)),
            None if self.count == 0 => Err(StatsError::NoData),
            None => Ok(()),
        }
    }

    /// Get the minimum value
    pub fn min(&self) -> Result<T, StatsError> {
        self.check()?;
        self.min_value.ok_or(StatsError::NoData)
    }

    /// Get the maximum value
    pub fn max(&self) -> Result<T, StatsError> {
        self.check()?;
        self.max_value.ok_or(StatsError::NoData)
    }

    /// Get the arithmetic mean of the data
    pub fn mean(&self) -> Result<f64, StatsError> {
        self.check()?;
        Ok(self.sum / self.count as f64)
    }

    /// Get the count of values processed
    pub fn count(&self) -> usize {
        self.count
    }

    /// Get min, max, and mean as a tuple
    pub fn min_max_mean(&self) -> Result<(T, T, f64), StatsError> {
        Ok((self.min()?, self.max()?, self.mean()?))
    }
}
