//! Statistical accumulators for Monte Carlo estimates.

use num_traits::Zero;
use std::ops::{AddAssign, Div, Mul};

/// Running mean over two windows: everything since the last reset, and
/// everything ever recorded.
#[derive(Debug, Clone)]
pub struct RunningEstimate<T> {
    recent_sum: T,
    recent_count: u64,
    cumulative_sum: T,
    cumulative_count: u64,
}

impl<T> RunningEstimate<T>
where
    T: Copy + Zero + AddAssign + Div<f64, Output = T>,
{
    pub fn new() -> Self {
        RunningEstimate {
            recent_sum: T::zero(),
            recent_count: 0,
            cumulative_sum: T::zero(),
            cumulative_count: 0,
        }
    }

    pub fn add_value(&mut self, value: T) {
        self.recent_sum += value;
        self.recent_count += 1;
        self.cumulative_sum += value;
        self.cumulative_count += 1;
    }

    /// Mean of the samples since the most recent reset.
    pub fn recent_result(&self) -> T {
        assert!(self.recent_count > 0, "no recent samples");
        self.recent_sum / self.recent_count as f64
    }

    /// Mean of every sample ever recorded.
    pub fn cumulative_result(&self) -> T {
        assert!(self.cumulative_count > 0, "no samples");
        self.cumulative_sum / self.cumulative_count as f64
    }

    pub fn num_recent_values(&self) -> u64 {
        self.recent_count
    }

    pub fn num_cumulative_values(&self) -> u64 {
        self.cumulative_count
    }

    pub(crate) fn cumulative_total(&self) -> T {
        self.cumulative_sum
    }

    /// Forget the recent window; the cumulative window is untouched.
    pub fn reset(&mut self) {
        self.recent_sum = T::zero();
        self.recent_count = 0;
    }
}

impl<T> Default for RunningEstimate<T>
where
    T: Copy + Zero + AddAssign + Div<f64, Output = T>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct BinLevel<T> {
    current_sum: T,
    cumulative_sum: T,
    cumulative_sum_squared: T,
    /// Completed bins at this level.
    bins: u64,
}

fn is_just_below_a_power_of_two(x: u64) -> bool {
    x & (x + 1) == 0
}

/// A running estimate with power-of-two binning for autocorrelation-aware
/// error bars: level i accumulates sums over bins of 2^i consecutive
/// samples.
#[derive(Debug, Clone)]
pub struct BinnedEstimate<T> {
    running: RunningEstimate<T>,
    binlevel_data: Vec<BinLevel<T>>,
}

impl<T> BinnedEstimate<T>
where
    T: Copy + Zero + AddAssign + Div<f64, Output = T> + Mul<Output = T>,
{
    pub fn new() -> Self {
        BinnedEstimate {
            running: RunningEstimate::new(),
            binlevel_data: Vec::new(),
        }
    }

    pub fn add_value(&mut self, value: T) {
        // open a new bin level whenever the sample count reaches one less
        // than a power of two; its first (partial) bin absorbs the history
        if is_just_below_a_power_of_two(self.running.num_cumulative_values()) {
            self.binlevel_data.push(BinLevel {
                current_sum: self.running.cumulative_total(),
                cumulative_sum: T::zero(),
                cumulative_sum_squared: T::zero(),
                bins: 0,
            });
        }

        self.running.add_value(value);
        let n = self.running.num_cumulative_values();

        for level in &mut self.binlevel_data {
            level.current_sum += value;
        }

        // flush every level whose bin just completed
        for (i, level) in self.binlevel_data.iter_mut().enumerate() {
            let sum = level.current_sum;
            level.cumulative_sum += sum;
            level.cumulative_sum_squared += sum * sum;
            level.current_sum = T::zero();
            level.bins += 1;
            if n & (1u64 << i) != 0 {
                break;
            }
        }
    }

    pub fn running(&self) -> &RunningEstimate<T> {
        &self.running
    }

    pub fn recent_result(&self) -> T {
        self.running.recent_result()
    }

    pub fn cumulative_result(&self) -> T {
        self.running.cumulative_result()
    }

    pub fn num_levels(&self) -> usize {
        self.binlevel_data.len()
    }

    pub fn num_bins(&self, level: usize) -> u64 {
        self.binlevel_data[level].bins
    }
}

impl<T> Default for BinnedEstimate<T>
where
    T: Copy + Zero + AddAssign + Div<f64, Output = T> + Mul<Output = T>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl BinnedEstimate<f64> {
    /// Blocking estimate of the standard error of the mean at the given bin
    /// level. Levels with fewer than two bins give no estimate.
    pub fn binned_error(&self, level: usize) -> Option<f64> {
        let data = &self.binlevel_data[level];
        if data.bins < 2 {
            return None;
        }
        let n = data.bins as f64;
        let bin_size = (1u64 << level) as f64;
        let mean = data.cumulative_sum / n;
        let variance = (data.cumulative_sum_squared / n - mean * mean).max(0.0);
        Some((variance / (n - 1.0)).sqrt() / bin_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    #[test]
    fn test_running_means() {
        let mut est = RunningEstimate::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            est.add_value(x);
        }
        assert_relative_eq!(est.cumulative_result(), 2.5);
        est.reset();
        est.add_value(10.0);
        assert_relative_eq!(est.recent_result(), 10.0);
        assert_relative_eq!(est.cumulative_result(), 4.0);
        assert_eq!(est.num_cumulative_values(), 5);
    }

    #[test]
    fn test_complex_running_mean() {
        let mut est = RunningEstimate::new();
        est.add_value(Complex64::new(1.0, 1.0));
        est.add_value(Complex64::new(0.0, -1.0));
        let mean = est.cumulative_result();
        assert_relative_eq!(mean.re, 0.5);
        assert_relative_eq!(mean.im, 0.0);
    }

    #[test]
    fn test_bin_levels_grow_with_samples() {
        let mut est = BinnedEstimate::new();
        for i in 0..17 {
            est.add_value(i as f64);
        }
        // levels for bin sizes 1, 2, 4, 8, 16
        assert_eq!(est.num_levels(), 5);
        assert_eq!(est.num_bins(0), 17);
        assert_eq!(est.num_bins(1), 8);
        assert_eq!(est.num_bins(2), 4);
        assert_relative_eq!(est.cumulative_result(), 8.0);
    }

    #[test]
    fn test_binned_error_of_uncorrelated_samples() {
        let mut est = BinnedEstimate::new();
        // alternating samples: level-0 error is the naive one
        for i in 0..1024 {
            est.add_value(if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        let e0 = est.binned_error(0).unwrap();
        assert_relative_eq!(e0, 1.0 / (1023.0f64).sqrt(), epsilon = 1e-6);
        // bins of two average the alternation away entirely
        let e1 = est.binned_error(1).unwrap();
        assert_relative_eq!(e1, 0.0, epsilon = 1e-12);
    }
}
