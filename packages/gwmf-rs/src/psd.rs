//! Power spectral density estimation and conditioning.
//!
//! - [`Psd::welch`] / [`Psd::estimate`]: averaged Hann-windowed periodograms
//! - [`Psd::interpolate`]: linear resampling onto a new frequency spacing
//! - [`Psd::inverse_spectrum_truncation`]: bound the time-domain support of the
//!   inverse-PSD filter so the span it corrupts is known

use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{GwmfError, Result};
use crate::fft;
use crate::series::{same_delta, TimeSeries};
use crate::window;

/// How per-segment periodograms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    Mean,
    /// Bias-corrected median, robust to loud transients in single segments.
    #[default]
    Median,
}

/// Taper applied to the kept part of the inverse-PSD filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    Hard,
    #[default]
    Hann,
}

/// One-sided noise power density, bins at `k * delta_f`.
///
/// Tagged with the segment length and stride (in samples) of the Welch estimate
/// it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Psd {
    values: Vec<f64>,
    delta_f: f64,
    segment_len: usize,
    segment_stride: usize,
}

impl Psd {
    pub fn new(
        values: Vec<f64>,
        delta_f: f64,
        segment_len: usize,
        segment_stride: usize,
    ) -> Result<Self> {
        if values.len() < 2 {
            return Err(GwmfError::InsufficientData {
                needed: 2,
                got: values.len(),
            });
        }
        if !(delta_f.is_finite() && delta_f > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "frequency spacing must be positive and finite, got {}",
                delta_f
            )));
        }
        if let Some(bad) = values.iter().position(|v| v.is_nan() || *v < 0.0) {
            return Err(GwmfError::Configuration(format!(
                "PSD bin {} is negative or NaN ({})",
                bad, values[bad]
            )));
        }
        Ok(Self {
            values,
            delta_f,
            segment_len,
            segment_stride,
        })
    }

    /// Constant PSD, e.g. `2 sigma^2 dt` for white noise of per-sample variance `sigma^2`.
    pub fn flat(level: f64, delta_f: f64, len: usize) -> Result<Self> {
        let segment_len = 2 * len.saturating_sub(1);
        Self::new(vec![level; len], delta_f, segment_len, segment_len)
    }

    /// Welch estimate with segments of `segment_len` samples advanced by `segment_stride`.
    ///
    /// Trailing samples that do not fill a whole segment are ignored.
    pub fn welch(
        series: &TimeSeries<f64>,
        segment_len: usize,
        segment_stride: usize,
        averaging: Averaging,
    ) -> Result<Self> {
        if segment_len < 2 {
            return Err(GwmfError::Configuration(format!(
                "Welch segments need at least 2 samples, got {}",
                segment_len
            )));
        }
        if segment_stride == 0 || segment_stride > segment_len {
            return Err(GwmfError::Configuration(format!(
                "segment stride must be in [1, {}], got {}",
                segment_len, segment_stride
            )));
        }
        if series.len() < segment_len {
            return Err(GwmfError::InsufficientData {
                needed: segment_len,
                got: series.len(),
            });
        }

        let data = series.data();
        let num_segments = (data.len() - segment_len) / segment_stride + 1;
        let window = window::hann(segment_len);
        let window_energy = window::energy(&window);
        let n_bins = segment_len / 2 + 1;

        log::debug!(
            "Welch PSD: {} segments of {} samples (stride {}), {:?} averaging",
            num_segments,
            segment_len,
            segment_stride,
            averaging
        );

        // periodograms[bin][segment]
        let mut periodograms = vec![Vec::with_capacity(num_segments); n_bins];
        let mut windowed = vec![0.0; segment_len];
        for seg in 0..num_segments {
            let start = seg * segment_stride;
            for (dst, (x, w)) in windowed
                .iter_mut()
                .zip(data[start..start + segment_len].iter().zip(&window))
            {
                *dst = x * w;
            }
            for (bin, c) in fft::rfft(&windowed).into_iter().enumerate() {
                periodograms[bin].push(c.norm_sqr());
            }
        }

        let dt = series.delta_t();
        let bias = match averaging {
            Averaging::Mean => 1.0,
            Averaging::Median => median_bias(num_segments),
        };
        let values = periodograms
            .into_iter()
            .enumerate()
            .map(|(k, mut powers)| {
                let avg = match averaging {
                    Averaging::Mean => powers.iter().sum::<f64>() / powers.len() as f64,
                    Averaging::Median => median(&mut powers) / bias,
                };
                // One-sided: fold negative frequencies except at DC and Nyquist
                let fold = if k == 0 || (segment_len % 2 == 0 && k == segment_len / 2) {
                    1.0
                } else {
                    2.0
                };
                fold * avg * dt / window_energy
            })
            .collect();

        Self::new(
            values,
            1.0 / (segment_len as f64 * dt),
            segment_len,
            segment_stride,
        )
    }

    /// Welch estimate with a segment duration in seconds and a fractional overlap in `[0, 1)`.
    pub fn estimate(
        series: &TimeSeries<f64>,
        segment_duration: f64,
        overlap: f64,
        averaging: Averaging,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&overlap) {
            return Err(GwmfError::Configuration(format!(
                "overlap must be in [0, 1), got {}",
                overlap
            )));
        }
        if !(segment_duration.is_finite() && segment_duration > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "segment duration must be positive, got {}",
                segment_duration
            )));
        }
        let segment_len = (segment_duration / series.delta_t()).round() as usize;
        let overlap_len = (segment_len as f64 * overlap).round() as usize;
        let stride = segment_len.saturating_sub(overlap_len).max(1);
        Self::welch(series, segment_len, stride, averaging)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    pub fn segment_stride(&self) -> usize {
        self.segment_stride
    }

    pub fn frequency(&self, k: usize) -> f64 {
        k as f64 * self.delta_f
    }

    pub fn frequencies(&self) -> Vec<f64> {
        (0..self.values.len()).map(|k| self.frequency(k)).collect()
    }

    pub fn max_frequency(&self) -> f64 {
        self.frequency(self.values.len() - 1)
    }

    /// Linear interpolation onto spacing `delta_f`, covering the same frequency span.
    pub fn interpolate(&self, delta_f: f64) -> Result<Self> {
        if !(delta_f.is_finite() && delta_f > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "target frequency spacing must be positive, got {}",
                delta_f
            )));
        }
        let span = self.max_frequency() / delta_f;
        let len = (span + 1e-9).floor() as usize + 1;
        self.interpolate_to(delta_f, len)
    }

    /// Linear interpolation onto `len` bins spaced by `delta_f`.
    ///
    /// Frequencies past the last estimated bin take its value.
    pub fn interpolate_to(&self, delta_f: f64, len: usize) -> Result<Self> {
        if !(delta_f.is_finite() && delta_f > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "target frequency spacing must be positive, got {}",
                delta_f
            )));
        }
        let last = self.values.len() - 1;
        let values = (0..len)
            .map(|k| {
                let x = k as f64 * delta_f / self.delta_f;
                let i = x.floor() as usize;
                if i >= last {
                    self.values[last]
                } else {
                    let frac = x - i as f64;
                    self.values[i] * (1.0 - frac) + self.values[i + 1] * frac
                }
            })
            .collect();
        Self::new(values, delta_f, self.segment_len, self.segment_stride)
    }

    /// Bound the inverse-PSD filter to `max_filter_len` samples of support.
    ///
    /// The inverse amplitude spectrum is zeroed below `low_frequency_cutoff`,
    /// transformed to the time domain, zeroed (optionally Hann-tapered) beyond
    /// `max_filter_len / 2` samples either side of the origin, and transformed
    /// back. Filtering with the result corrupts `max_filter_len / 2` samples at
    /// each end of a series.
    pub fn inverse_spectrum_truncation(
        &self,
        max_filter_len: usize,
        low_frequency_cutoff: Option<f64>,
        truncation: Truncation,
    ) -> Result<Self> {
        if max_filter_len < 2 {
            return Err(GwmfError::Configuration(format!(
                "inverse spectrum filter needs at least 2 samples, got {}",
                max_filter_len
            )));
        }
        if max_filter_len > self.segment_len {
            return Err(GwmfError::Configuration(format!(
                "truncation length {} exceeds the PSD estimation segment length {}",
                max_filter_len, self.segment_len
            )));
        }
        let nyquist = self.max_frequency();
        if let Some(f) = low_frequency_cutoff {
            if !(0.0..=nyquist).contains(&f) {
                return Err(GwmfError::FrequencyRange {
                    frequency: f,
                    nyquist,
                });
            }
        }

        let n = 2 * (self.values.len() - 1);
        let trunc_start = max_filter_len / 2;
        let trunc_end = n - max_filter_len / 2;
        if trunc_end < trunc_start {
            return Err(GwmfError::Configuration(format!(
                "truncation length {} exceeds the filter length {}",
                max_filter_len, n
            )));
        }

        let kmin = low_frequency_cutoff
            .map(|f| (f / self.delta_f) as usize)
            .unwrap_or(1)
            .max(1);
        let mut inv_asd = vec![Complex64::new(0.0, 0.0); self.values.len()];
        for k in kmin..n / 2 {
            let p = self.values[k];
            if p > 0.0 && p.is_finite() {
                inv_asd[k] = Complex64::new(1.0 / p.sqrt(), 0.0);
            }
        }

        let mut q = fft::irfft(&inv_asd, n);

        if truncation == Truncation::Hann {
            let taper = window::hann(max_filter_len);
            for (i, x) in q[..trunc_start].iter_mut().enumerate() {
                *x *= taper[max_filter_len - trunc_start + i];
            }
            for (i, x) in q[trunc_end..].iter_mut().enumerate() {
                *x *= taper[i];
            }
        }
        for x in &mut q[trunc_start..trunc_end] {
            *x = 0.0;
        }

        let norm = 1.0 / n as f64;
        let values: Vec<f64> = fft::rfft(&q)
            .into_iter()
            .map(|c| {
                let power = (c * norm).norm_sqr();
                if power > 0.0 {
                    1.0 / power
                } else {
                    f64::INFINITY
                }
            })
            .collect();

        log::debug!(
            "Inverse spectrum truncation: {} bins, filter length {}, kmin {}",
            values.len(),
            max_filter_len,
            kmin
        );

        Self::new(values, self.delta_f, self.segment_len, self.segment_stride)
    }

    /// Fails unless the PSD has `len` bins spaced by `delta_f`.
    pub(crate) fn check_matches(&self, delta_f: f64, len: usize) -> Result<()> {
        if !same_delta(self.delta_f, delta_f) {
            return Err(GwmfError::Configuration(format!(
                "PSD frequency spacing {} Hz does not match data spacing {} Hz; interpolate first",
                self.delta_f, delta_f
            )));
        }
        if self.values.len() != len {
            return Err(GwmfError::Configuration(format!(
                "PSD has {} bins, data has {}",
                self.values.len(),
                len
            )));
        }
        Ok(())
    }

    /// `1 / psd[k]`, or zero where the bin carries no usable weight.
    pub(crate) fn inverse(&self, k: usize) -> f64 {
        let p = self.values[k];
        if p > 0.0 && p.is_finite() {
            1.0 / p
        } else {
            0.0
        }
    }
}

/// Ratio of the sample median to the mean for `n` chi-square(2) periodogram values.
pub fn median_bias(n: usize) -> f64 {
    if n >= 1000 {
        return std::f64::consts::LN_2;
    }
    let mut bias = 1.0;
    for i in 1..=(n.saturating_sub(1)) / 2 {
        bias += 1.0 / (2 * i + 1) as f64 - 1.0 / (2 * i) as f64;
    }
    bias
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 0 {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    } else {
        values[n / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn white_noise(n: usize, sigma: f64, sample_rate: f64, seed: u64) -> TimeSeries<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..n)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                sigma * z
            })
            .collect();
        TimeSeries::new(data, 1.0 / sample_rate, 0.0).unwrap()
    }

    #[test]
    fn test_welch_white_noise_level() {
        let fs = 256.0;
        let sigma = 2.0;
        let noise = white_noise(256 * 64, sigma, fs, 7);
        let expected = 2.0 * sigma * sigma / fs;

        for averaging in [Averaging::Mean, Averaging::Median] {
            let psd = Psd::estimate(&noise, 1.0, 0.5, averaging).unwrap();
            assert_eq!(psd.len(), 129);
            assert_eq!(psd.segment_len(), 256);
            assert_eq!(psd.segment_stride(), 128);
            assert!((psd.delta_f() - 1.0).abs() < 1e-12);

            let interior = &psd.values()[5..120];
            let mean = interior.iter().sum::<f64>() / interior.len() as f64;
            assert!(
                (mean / expected - 1.0).abs() < 0.1,
                "{:?}: mean {} expected {}",
                averaging,
                mean,
                expected
            );
        }
    }

    #[test]
    fn test_welch_sinusoid_peak() {
        let fs = 128.0;
        let data: Vec<f64> = (0..128 * 16)
            .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / fs).sin())
            .collect();
        let series = TimeSeries::new(data, 1.0 / fs, 0.0).unwrap();
        let psd = Psd::estimate(&series, 2.0, 0.5, Averaging::Mean).unwrap();

        let peak = psd
            .values()
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (k, &v)| if v > best.1 { (k, v) } else { best });
        assert!((psd.frequency(peak.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_welch_short_series_fails() {
        let noise = white_noise(100, 1.0, 64.0, 1);
        let result = Psd::estimate(&noise, 4.0, 0.5, Averaging::Median);
        assert!(matches!(
            result,
            Err(GwmfError::InsufficientData {
                needed: 256,
                got: 100
            })
        ));
    }

    #[test]
    fn test_psd_non_negative() {
        let noise = white_noise(4096, 1.0, 512.0, 3);
        let psd = Psd::estimate(&noise, 0.5, 0.5, Averaging::Median).unwrap();
        assert!(psd.values().iter().all(|&v| v >= 0.0));

        let fine = psd.interpolate(0.125).unwrap();
        assert!(fine.values().iter().all(|&v| v >= 0.0));
        assert_eq!(fine.len(), 2049);
        assert!((fine.max_frequency() - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_bins_rejected() {
        let result = Psd::new(vec![1.0, -1.0, 1.0], 1.0, 4, 4);
        assert!(matches!(result, Err(GwmfError::Configuration(_))));
    }

    #[test]
    fn test_interpolate_linear() {
        let psd = Psd::new(vec![0.0, 2.0, 4.0], 1.0, 4, 2).unwrap();
        let fine = psd.interpolate(0.5).unwrap();
        assert_eq!(fine.values(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(fine.segment_len(), 4);

        let padded = psd.interpolate_to(0.5, 7).unwrap();
        assert_eq!(padded.values()[5], 4.0);
        assert_eq!(padded.values()[6], 4.0);
    }

    #[test]
    fn test_median_bias() {
        assert_eq!(median_bias(1), 1.0);
        assert_eq!(median_bias(2), 1.0);
        assert!((median_bias(3) - (1.0 + 1.0 / 3.0 - 0.5)).abs() < 1e-15);
        assert_eq!(median_bias(5000), std::f64::consts::LN_2);
    }

    #[test]
    fn test_truncation_of_flat_psd_is_flat_above_cutoff() {
        let psd = Psd::flat(4.0, 0.25, 513).unwrap();
        let truncated = psd
            .inverse_spectrum_truncation(256, Some(0.0), Truncation::Hard)
            .unwrap();
        assert_eq!(truncated.len(), 513);
        // Interior bins of a white spectrum survive truncation unchanged
        for &v in &truncated.values()[50..450] {
            assert!((v / 4.0 - 1.0).abs() < 0.05, "value {}", v);
        }
    }

    #[test]
    fn test_truncation_limits_time_support() {
        let noise = white_noise(64 * 64, 1.0, 64.0, 11);
        let psd = Psd::estimate(&noise, 4.0, 0.5, Averaging::Median).unwrap();
        let max_len = 64;
        let truncated = psd
            .inverse_spectrum_truncation(max_len, Some(2.0), Truncation::Hann)
            .unwrap();

        // The inverse ASD of the result (before squaring) has bounded support:
        // check via the inverse PSD, whose support is at most max_len samples.
        let n = 2 * (truncated.len() - 1);
        let inv: Vec<Complex64> = (0..truncated.len())
            .map(|k| Complex64::new(truncated.inverse(k), 0.0))
            .collect();
        let kernel = fft::irfft(&inv, n);
        let peak = kernel.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        for &x in &kernel[max_len..n - max_len] {
            assert!(x.abs() < 1e-9 * peak);
        }
    }

    #[test]
    fn test_truncation_length_bounded_by_segment() {
        let psd = Psd::flat(1.0, 1.0, 65).unwrap();
        let result = psd.inverse_spectrum_truncation(256, None, Truncation::Hann);
        assert!(matches!(result, Err(GwmfError::Configuration(_))));

        let result = psd.inverse_spectrum_truncation(16, Some(100.0), Truncation::Hann);
        assert!(matches!(result, Err(GwmfError::FrequencyRange { .. })));
    }
}
