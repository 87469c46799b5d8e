//! Time-domain and frequency-domain series.
//!
//! Both types are immutable values: every transform returns a new series.
//! Conversions between them go through [`TimeSeries::to_frequency_series`] and
//! [`FrequencySeries::to_time_series`], which apply the `dt`/`df` scaling so a
//! round trip reproduces the original samples.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::error::{GwmfError, Result};
use crate::fft;

/// Relative tolerance used when comparing sample intervals.
const DELTA_TOLERANCE: f64 = 1e-9;

pub(crate) fn same_delta(a: f64, b: f64) -> bool {
    (a - b).abs() <= DELTA_TOLERANCE * a.abs().max(b.abs())
}

/// Uniformly sampled series with `sample_time(i) = start_time + i * delta_t`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    data: Vec<T>,
    delta_t: f64,
    start_time: f64,
}

impl<T: Copy> TimeSeries<T> {
    pub fn new(data: Vec<T>, delta_t: f64, start_time: f64) -> Result<Self> {
        if data.is_empty() {
            return Err(GwmfError::InsufficientData { needed: 1, got: 0 });
        }
        if !(delta_t.is_finite() && delta_t > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "sample interval must be positive and finite, got {}",
                delta_t
            )));
        }
        if !start_time.is_finite() {
            return Err(GwmfError::Configuration(
                "start time must be finite".to_string(),
            ));
        }
        Ok(Self {
            data,
            delta_t,
            start_time,
        })
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    pub fn sample_rate(&self) -> f64 {
        1.0 / self.delta_t
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn duration(&self) -> f64 {
        self.data.len() as f64 * self.delta_t
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }

    pub fn sample_time(&self, index: usize) -> f64 {
        self.start_time + index as f64 * self.delta_t
    }

    pub fn sample_times(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| self.sample_time(i)).collect()
    }

    /// Index of the sample nearest to `time`, if it falls inside the series.
    pub fn index_at(&self, time: f64) -> Option<usize> {
        let offset = ((time - self.start_time) / self.delta_t).round();
        if offset < 0.0 || offset >= self.data.len() as f64 {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Same samples and interval, new start time.
    pub fn with_start_time(&self, start_time: f64) -> Self {
        Self {
            data: self.data.clone(),
            delta_t: self.delta_t,
            start_time,
        }
    }

    /// Fails with `SampleRateMismatch` unless `other` shares this sample interval.
    pub fn check_compatible<U>(&self, other: &TimeSeries<U>) -> Result<()> {
        if same_delta(self.delta_t, other.delta_t) {
            Ok(())
        } else {
            Err(GwmfError::SampleRateMismatch {
                expected: self.delta_t,
                got: other.delta_t,
            })
        }
    }

    /// Drop `left` samples from the start and `right` from the end.
    pub fn crop_samples(&self, left: usize, right: usize) -> Result<Self> {
        let n = self.data.len();
        if left + right >= n {
            return Err(GwmfError::InsufficientData {
                needed: left + right + 1,
                got: n,
            });
        }
        Ok(Self {
            data: self.data[left..n - right].to_vec(),
            delta_t: self.delta_t,
            start_time: self.sample_time(left),
        })
    }

    /// Drop `left` seconds from the start and `right` seconds from the end.
    pub fn crop(&self, left: f64, right: f64) -> Result<Self> {
        if left < 0.0 || right < 0.0 {
            return Err(GwmfError::Configuration(format!(
                "crop durations must be non-negative, got ({}, {})",
                left, right
            )));
        }
        let left = (left / self.delta_t).round() as usize;
        let right = (right / self.delta_t).round() as usize;
        self.crop_samples(left, right)
    }

    /// Samples covering `[start, end)`, clamped to the series.
    pub fn time_slice(&self, start: f64, end: f64) -> Result<Self> {
        let n = self.data.len();
        let first = ((start - self.start_time) / self.delta_t).ceil().max(0.0) as usize;
        let last = (((end - self.start_time) / self.delta_t).ceil().max(0.0) as usize).min(n);
        if first >= last {
            return Err(GwmfError::InsufficientData { needed: 1, got: 0 });
        }
        Ok(Self {
            data: self.data[first..last].to_vec(),
            delta_t: self.delta_t,
            start_time: self.sample_time(first),
        })
    }

    /// Cyclic shift: sample `i` moves to `(i + shift) mod len`.
    pub fn roll(&self, shift: isize) -> Self {
        let n = self.data.len() as isize;
        let k = shift.rem_euclid(n) as usize;
        let mut data = self.data.clone();
        data.rotate_right(k);
        Self {
            data,
            delta_t: self.delta_t,
            start_time: self.start_time,
        }
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> TimeSeries<U> {
        TimeSeries {
            data: self.data.iter().map(|&x| f(x)).collect(),
            delta_t: self.delta_t,
            start_time: self.start_time,
        }
    }
}

impl TimeSeries<f64> {
    /// Forward transform scaled by `dt`, with `df = 1 / (len * dt)`.
    pub fn to_frequency_series(&self) -> FrequencySeries {
        let bins: Vec<Complex64> = fft::rfft(&self.data)
            .into_iter()
            .map(|c| c * self.delta_t)
            .collect();
        FrequencySeries {
            data: bins,
            delta_f: 1.0 / self.duration(),
            epoch: self.start_time,
            time_len: self.data.len(),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map(|x| x * factor)
    }

    /// Zero-extend to `len` samples.
    pub fn zero_pad(&self, len: usize) -> Result<Self> {
        if len < self.data.len() {
            return Err(GwmfError::InsufficientData {
                needed: self.data.len(),
                got: len,
            });
        }
        let mut data = self.data.clone();
        data.resize(len, 0.0);
        Ok(Self {
            data,
            delta_t: self.delta_t,
            start_time: self.start_time,
        })
    }

    /// Sample-by-sample difference; both series must share `dt`, start and length.
    pub fn subtract(&self, other: &TimeSeries<f64>) -> Result<Self> {
        self.check_compatible(other)?;
        if other.data.len() != self.data.len() {
            return Err(GwmfError::Configuration(format!(
                "cannot subtract series of length {} from series of length {}",
                other.data.len(),
                self.data.len()
            )));
        }
        if (other.start_time - self.start_time).abs() > 0.5 * self.delta_t {
            return Err(GwmfError::Configuration(format!(
                "start times differ: {} vs {}",
                self.start_time, other.start_time
            )));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Self {
            data,
            delta_t: self.delta_t,
            start_time: self.start_time,
        })
    }

    /// Sum of squared samples.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
    }
}

impl TimeSeries<Complex64> {
    pub fn abs(&self) -> TimeSeries<f64> {
        self.map(|c| c.norm())
    }
}

/// One-sided spectrum of a real [`TimeSeries`], bins at `f[k] = k * delta_f`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySeries {
    data: Vec<Complex64>,
    delta_f: f64,
    epoch: f64,
    time_len: usize,
}

impl FrequencySeries {
    /// `time_len` is the length of the time series this spectrum transforms back to.
    pub fn new(data: Vec<Complex64>, delta_f: f64, epoch: f64, time_len: usize) -> Result<Self> {
        if time_len == 0 {
            return Err(GwmfError::InsufficientData { needed: 1, got: 0 });
        }
        if data.len() != time_len / 2 + 1 {
            return Err(GwmfError::Configuration(format!(
                "a time series of {} samples has {} one-sided bins, got {}",
                time_len,
                time_len / 2 + 1,
                data.len()
            )));
        }
        if !(delta_f.is_finite() && delta_f > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "frequency spacing must be positive and finite, got {}",
                delta_f
            )));
        }
        Ok(Self {
            data,
            delta_f,
            epoch,
            time_len,
        })
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn time_len(&self) -> usize {
        self.time_len
    }

    pub fn delta_t(&self) -> f64 {
        1.0 / (self.time_len as f64 * self.delta_f)
    }

    pub fn frequency(&self, k: usize) -> f64 {
        k as f64 * self.delta_f
    }

    pub fn sample_frequencies(&self) -> Vec<f64> {
        (0..self.data.len()).map(|k| self.frequency(k)).collect()
    }

    /// Inverse transform scaled by `df`.
    pub fn to_time_series(&self) -> TimeSeries<f64> {
        let data = fft::irfft(&self.data, self.time_len)
            .into_iter()
            .map(|x| x * self.delta_f)
            .collect();
        TimeSeries {
            data,
            delta_t: self.delta_t(),
            start_time: self.epoch,
        }
    }

    pub fn scale(&self, factor: Complex64) -> Self {
        self.map_bins(|_, c| c * factor)
    }

    /// Apply `f(k, bin)` to every bin.
    pub fn map_bins(&self, f: impl Fn(usize, Complex64) -> Complex64) -> Self {
        Self {
            data: self
                .data
                .iter()
                .enumerate()
                .map(|(k, &c)| f(k, c))
                .collect(),
            delta_f: self.delta_f,
            epoch: self.epoch,
            time_len: self.time_len,
        }
    }

    /// Cyclic delay by `shift` seconds (may be fractional in samples).
    pub fn cyclic_time_shift(&self, shift: f64) -> Self {
        self.map_bins(|k, c| {
            let phase = -2.0 * PI * self.frequency(k) * shift;
            c * Complex64::from_polar(1.0, phase)
        })
    }
}
