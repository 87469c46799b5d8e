//! Linear-phase FIR filtering and resampling with edge-corruption tracking.
//!
//! Filters are Kaiser-windowed sinc designs with `2L + 1` taps applied as a
//! zero-phase convolution. Each application spoils `L` samples at both ends of
//! its input; [`TrackedSeries`] accumulates those spans across a chain of
//! operations so a single [`TrackedSeries::trim_corrupted`] removes them all.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{GwmfError, Result};
use crate::fft;
use crate::series::{same_delta, TimeSeries};
use crate::window;

/// Kaiser shape parameter for all designed filters.
const KAISER_BETA: f64 = 5.0;

/// Taps per side, per unit of resampling factor.
const RESAMPLE_HALF_LEN_PER_FACTOR: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Lowpass,
    Highpass,
}

/// What happens to the `L` samples at each end that a filter spoils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Keep the length and overwrite the spoiled samples with zeros.
    #[default]
    Zero,
    /// Remove the spoiled samples, advancing the start time.
    Drop,
}

/// Number of spoiled samples at each end of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Corruption {
    pub start: usize,
    pub end: usize,
}

impl Corruption {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn total(&self) -> usize {
        self.start + self.end
    }

    fn widen(self, by: usize) -> Self {
        Self::new(self.start + by, self.end + by)
    }
}

/// Symmetric FIR filter with an odd number of taps.
#[derive(Debug, Clone, PartialEq)]
pub struct FirFilter {
    taps: Vec<f64>,
    pass: Pass,
    sample_rate: f64,
}

impl FirFilter {
    /// Design a `2 * half_len + 1` tap filter with cutoff `cutoff` Hz.
    ///
    /// Lowpass taps are normalised to unit gain at DC, highpass taps to unit
    /// gain at the Nyquist frequency.
    pub fn design(pass: Pass, cutoff: f64, sample_rate: f64, half_len: usize) -> Result<Self> {
        let nyquist = sample_rate / 2.0;
        if !(cutoff > 0.0 && cutoff < nyquist) {
            return Err(GwmfError::FrequencyRange {
                frequency: cutoff,
                nyquist,
            });
        }
        if half_len == 0 {
            return Err(GwmfError::Configuration(
                "filter half-length must be at least one sample".to_string(),
            ));
        }

        let numtaps = 2 * half_len + 1;
        let k = cutoff / nyquist;
        let win = window::kaiser(numtaps, KAISER_BETA);

        let mut taps: Vec<f64> = (0..numtaps)
            .map(|i| {
                let m = i as f64 - half_len as f64;
                let ideal = match pass {
                    Pass::Lowpass => k * sinc(k * m),
                    Pass::Highpass => sinc(m) - k * sinc(k * m),
                };
                ideal * win[i]
            })
            .collect();

        let gain: f64 = match pass {
            Pass::Lowpass => taps.iter().sum(),
            Pass::Highpass => taps
                .iter()
                .enumerate()
                .map(|(i, h)| h * (PI * (i as f64 - half_len as f64)).cos())
                .sum(),
        };
        for h in &mut taps {
            *h /= gain;
        }

        log::debug!(
            "Designed {:?} FIR: cutoff {} Hz at {} Hz, {} taps",
            pass,
            cutoff,
            sample_rate,
            numtaps
        );

        Ok(Self {
            taps,
            pass,
            sample_rate,
        })
    }

    pub fn lowpass(cutoff: f64, sample_rate: f64, half_len: usize) -> Result<Self> {
        Self::design(Pass::Lowpass, cutoff, sample_rate, half_len)
    }

    pub fn highpass(cutoff: f64, sample_rate: f64, half_len: usize) -> Result<Self> {
        Self::design(Pass::Highpass, cutoff, sample_rate, half_len)
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn half_len(&self) -> usize {
        self.taps.len() / 2
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Real (zero-phase) gain at `frequency` Hz.
    pub fn response(&self, frequency: f64) -> f64 {
        let half = self.half_len() as f64;
        let w = 2.0 * PI * frequency / self.sample_rate;
        self.taps
            .iter()
            .enumerate()
            .map(|(i, h)| h * (w * (i as f64 - half)).cos())
            .sum()
    }

    /// Filter `series`, handling the `half_len` spoiled samples at each end per `mode`.
    pub fn apply(&self, series: &TimeSeries<f64>, mode: EdgeMode) -> Result<TimeSeries<f64>> {
        let filtered = self.convolve(series)?;
        let half = self.half_len();
        match mode {
            EdgeMode::Zero => {
                let mut data = filtered.into_data();
                let n = data.len();
                data[..half].fill(0.0);
                data[n - half..].fill(0.0);
                TimeSeries::new(data, series.delta_t(), series.start_time())
            }
            EdgeMode::Drop => filtered.crop_samples(half, half),
        }
    }

    fn convolve(&self, series: &TimeSeries<f64>) -> Result<TimeSeries<f64>> {
        if !same_delta(series.sample_rate(), self.sample_rate) {
            return Err(GwmfError::SampleRateMismatch {
                expected: 1.0 / self.sample_rate,
                got: series.delta_t(),
            });
        }
        if series.len() < self.taps.len() {
            return Err(GwmfError::InsufficientData {
                needed: self.taps.len(),
                got: series.len(),
            });
        }
        let data = fft::convolve_centered(series.data(), &self.taps);
        TimeSeries::new(data, series.delta_t(), series.start_time())
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// A series plus the number of spoiled samples at each of its ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSeries {
    series: TimeSeries<f64>,
    corrupted: Corruption,
    dropped: (f64, f64),
}

impl TrackedSeries {
    pub fn new(series: TimeSeries<f64>) -> Self {
        Self {
            series,
            corrupted: Corruption::default(),
            dropped: (0.0, 0.0),
        }
    }

    pub fn series(&self) -> &TimeSeries<f64> {
        &self.series
    }

    /// Spoiled samples still present at each end.
    pub fn corrupted(&self) -> Corruption {
        self.corrupted
    }

    /// Seconds already removed from the (start, end) of the original series.
    pub fn dropped_duration(&self) -> (f64, f64) {
        self.dropped
    }

    /// Samples removed so far plus samples still to remove, at the current rate.
    pub fn total_trimmed(&self) -> Corruption {
        let dt = self.series.delta_t();
        Corruption::new(
            self.corrupted.start + (self.dropped.0 / dt).round() as usize,
            self.corrupted.end + (self.dropped.1 / dt).round() as usize,
        )
    }

    pub fn highpass(self, cutoff: f64, half_len: usize, mode: EdgeMode) -> Result<Self> {
        let filter = FirFilter::highpass(cutoff, self.series.sample_rate(), half_len)?;
        self.filter(&filter, mode)
    }

    pub fn lowpass(self, cutoff: f64, half_len: usize, mode: EdgeMode) -> Result<Self> {
        let filter = FirFilter::lowpass(cutoff, self.series.sample_rate(), half_len)?;
        self.filter(&filter, mode)
    }

    /// Apply a designed filter and account for the span it spoils.
    pub fn filter(self, filter: &FirFilter, mode: EdgeMode) -> Result<Self> {
        let half = filter.half_len();
        let out = filter.apply(&self.series, mode)?;
        let dt = self.series.delta_t();
        let (corrupted, dropped) = match mode {
            EdgeMode::Zero => (self.corrupted.widen(half), self.dropped),
            EdgeMode::Drop => (
                self.corrupted,
                (
                    self.dropped.0 + half as f64 * dt,
                    self.dropped.1 + half as f64 * dt,
                ),
            ),
        };
        Ok(Self {
            series: out,
            corrupted,
            dropped,
        })
    }

    /// Change the sample interval to `delta_t` by an integer factor in either direction.
    pub fn resample(self, delta_t: f64) -> Result<Self> {
        let current = self.series.delta_t();
        if !(delta_t.is_finite() && delta_t > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "target sample interval must be positive, got {}",
                delta_t
            )));
        }
        if same_delta(current, delta_t) {
            return Ok(self);
        }
        if delta_t > current {
            let factor = integer_ratio(delta_t, current)?;
            self.downsample(factor)
        } else {
            let factor = integer_ratio(current, delta_t)?;
            self.upsample(factor)
        }
    }

    fn downsample(self, factor: usize) -> Result<Self> {
        let fs = self.series.sample_rate();
        let half = RESAMPLE_HALF_LEN_PER_FACTOR * factor;
        let filter = FirFilter::lowpass(fs / 2.0 / factor as f64, fs, half)?;
        let filtered = self.filter(&filter, EdgeMode::Zero)?;

        let n = filtered.series.len();
        let data: Vec<f64> = filtered.series.data().iter().step_by(factor).copied().collect();
        let m = data.len();
        let start = div_ceil(filtered.corrupted.start, factor).min(m);
        let clean_end = n.saturating_sub(filtered.corrupted.end);
        let end = m.saturating_sub(div_ceil(clean_end, factor));

        log::debug!(
            "Downsampled by {}: {} -> {} samples, corrupted ({}, {})",
            factor,
            n,
            m,
            start,
            end
        );

        Ok(Self {
            series: TimeSeries::new(
                data,
                filtered.series.delta_t() * factor as f64,
                filtered.series.start_time(),
            )?,
            corrupted: Corruption::new(start, end),
            dropped: filtered.dropped,
        })
    }

    fn upsample(self, factor: usize) -> Result<Self> {
        let n = self.series.len();
        let mut stuffed = vec![0.0; n * factor];
        for (i, &x) in self.series.data().iter().enumerate() {
            stuffed[i * factor] = x * factor as f64;
        }
        let fs = self.series.sample_rate();
        let stuffed = TimeSeries::new(
            stuffed,
            self.series.delta_t() / factor as f64,
            self.series.start_time(),
        )?;
        let corrupted = Corruption::new(
            self.corrupted.start * factor,
            self.corrupted.end * factor,
        );
        let half = RESAMPLE_HALF_LEN_PER_FACTOR * factor;
        let filter = FirFilter::lowpass(fs / 2.0, fs * factor as f64, half)?;

        log::debug!("Upsampled by {}: {} -> {} samples", factor, n, n * factor);

        Self {
            series: stuffed,
            corrupted,
            dropped: self.dropped,
        }
        .filter(&filter, EdgeMode::Zero)
    }

    /// Remove `left` and `right` seconds; removed samples count against the spoiled span first.
    pub fn crop(self, left: f64, right: f64) -> Result<Self> {
        let dt = self.series.delta_t();
        let cropped = self.series.crop(left, right)?;
        let left_n = (left / dt).round() as usize;
        let right_n = (right / dt).round() as usize;
        Ok(Self {
            series: cropped,
            corrupted: Corruption::new(
                self.corrupted.start.saturating_sub(left_n),
                self.corrupted.end.saturating_sub(right_n),
            ),
            dropped: (
                self.dropped.0 + left_n as f64 * dt,
                self.dropped.1 + right_n as f64 * dt,
            ),
        })
    }

    /// Mark `samples` more at each end as unusable without filtering.
    pub fn pad_corruption(self, samples: usize) -> Self {
        Self {
            corrupted: self.corrupted.widen(samples),
            ..self
        }
    }

    /// Crop every spoiled sample in one step.
    pub fn trim_corrupted(self) -> Result<TimeSeries<f64>> {
        log::debug!(
            "Trimming ({}, {}) corrupted samples from {}",
            self.corrupted.start,
            self.corrupted.end,
            self.series.len()
        );
        self.series
            .crop_samples(self.corrupted.start, self.corrupted.end)
    }

    pub fn into_series(self) -> TimeSeries<f64> {
        self.series
    }
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn integer_ratio(big: f64, small: f64) -> Result<usize> {
    let ratio = big / small;
    let factor = ratio.round();
    if factor < 1.0 || (ratio - factor).abs() > 1e-9 * ratio {
        return Err(GwmfError::Configuration(format!(
            "resampling requires an integer rate ratio, got {}",
            ratio
        )));
    }
    Ok(factor as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: f64, n: usize) -> TimeSeries<f64> {
        let data = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect();
        TimeSeries::new(data, 1.0 / sample_rate, 10.0).unwrap()
    }

    fn interior_rms(series: &TimeSeries<f64>, skip: usize) -> f64 {
        let d = &series.data()[skip..series.len() - skip];
        (d.iter().map(|x| x * x).sum::<f64>() / d.len() as f64).sqrt()
    }

    #[test]
    fn test_highpass_response() {
        let filter = FirFilter::highpass(15.0, 1024.0, 512).unwrap();
        assert_eq!(filter.taps().len(), 1025);
        assert!((filter.response(512.0) - 1.0).abs() < 1e-12);
        assert!(filter.response(0.0).abs() < 0.01);
        assert!((filter.response(100.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_lowpass_unit_dc_gain() {
        let filter = FirFilter::lowpass(50.0, 256.0, 64).unwrap();
        assert!((filter.response(0.0) - 1.0).abs() < 1e-12);
        assert!(filter.response(100.0).abs() < 0.01);
        let taps = filter.taps();
        for i in 0..taps.len() {
            assert!((taps[i] - taps[taps.len() - 1 - i]).abs() < 1e-14);
        }
    }

    #[test]
    fn test_highpass_removes_low_tone() {
        let fs = 1024.0;
        let low = tone(3.0, fs, 8192);
        let high = tone(100.0, fs, 8192);
        let filter = FirFilter::highpass(15.0, fs, 512).unwrap();

        let low_out = filter.apply(&low, EdgeMode::Zero).unwrap();
        let high_out = filter.apply(&high, EdgeMode::Zero).unwrap();
        assert_eq!(low_out.len(), 8192);
        assert!(interior_rms(&low_out, 512) < 0.01 * interior_rms(&low, 512));
        let ratio = interior_rms(&high_out, 512) / interior_rms(&high, 512);
        assert!((ratio - 1.0).abs() < 0.01);

        // Spoiled edges are zeroed
        assert!(low_out.data()[..512].iter().all(|&x| x == 0.0));
        assert!(low_out.data()[8192 - 512..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_drop_mode_shifts_start() {
        let series = tone(10.0, 256.0, 1024);
        let filter = FirFilter::lowpass(40.0, 256.0, 32).unwrap();
        let out = filter.apply(&series, EdgeMode::Drop).unwrap();
        assert_eq!(out.len(), 1024 - 64);
        assert!((out.start_time() - (10.0 + 32.0 / 256.0)).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_designs() {
        assert!(matches!(
            FirFilter::highpass(600.0, 1024.0, 16),
            Err(GwmfError::FrequencyRange { .. })
        ));
        assert!(matches!(
            FirFilter::lowpass(0.0, 1024.0, 16),
            Err(GwmfError::FrequencyRange { .. })
        ));
        assert!(matches!(
            FirFilter::lowpass(10.0, 1024.0, 0),
            Err(GwmfError::Configuration(_))
        ));

        let short = tone(10.0, 256.0, 20);
        let filter = FirFilter::lowpass(40.0, 256.0, 16).unwrap();
        assert!(matches!(
            filter.apply(&short, EdgeMode::Zero),
            Err(GwmfError::InsufficientData { needed: 33, got: 20 })
        ));
    }

    #[test]
    fn test_corruption_accumulates_half_lengths() {
        let series = tone(20.0, 512.0, 4096);
        let tracked = TrackedSeries::new(series)
            .highpass(5.0, 100, EdgeMode::Zero)
            .unwrap()
            .lowpass(100.0, 40, EdgeMode::Drop)
            .unwrap()
            .highpass(8.0, 60, EdgeMode::Zero)
            .unwrap();

        assert_eq!(tracked.corrupted(), Corruption::new(160, 160));
        assert_eq!(tracked.series().len(), 4096 - 80);
        assert_eq!(tracked.total_trimmed(), Corruption::new(200, 200));

        let start = tracked.series().start_time();
        let trimmed = tracked.trim_corrupted().unwrap();
        assert_eq!(trimmed.len(), 4096 - 400);
        assert!((trimmed.start_time() - (start + 160.0 / 512.0)).abs() < 1e-12);
    }

    #[test]
    fn test_crop_consumes_corruption_first() {
        let series = tone(20.0, 100.0, 1000);
        let tracked = TrackedSeries::new(series)
            .lowpass(30.0, 50, EdgeMode::Zero)
            .unwrap()
            .crop(0.2, 1.0)
            .unwrap();
        assert_eq!(tracked.corrupted(), Corruption::new(30, 0));
        assert_eq!(tracked.total_trimmed(), Corruption::new(50, 100));
    }

    #[test]
    fn test_downsample_preserves_tone() {
        let fs = 4096.0;
        let series = tone(50.0, fs, 4096 * 4);
        let tracked = TrackedSeries::new(series).resample(1.0 / 1024.0).unwrap();
        assert_eq!(tracked.series().len(), 4096);
        assert!((tracked.series().sample_rate() - 1024.0).abs() < 1e-9);
        assert_eq!(tracked.corrupted(), Corruption::new(10, 10));

        let clean = tracked.trim_corrupted().unwrap();
        let expected = tone(50.0, 1024.0, 4096 + 10);
        for (i, &x) in clean.data().iter().enumerate() {
            assert!((x - expected.data()[i + 10]).abs() < 0.01, "sample {}", i);
        }
    }

    #[test]
    fn test_upsample_preserves_tone() {
        let series = tone(10.0, 256.0, 2048);
        let tracked = TrackedSeries::new(series).resample(1.0 / 512.0).unwrap();
        assert_eq!(tracked.series().len(), 4096);
        assert_eq!(tracked.corrupted(), Corruption::new(20, 20));

        let up = tracked.series();
        let expected = tone(10.0, 512.0, 4096);
        for i in 100..4000 {
            assert!((up.data()[i] - expected.data()[i]).abs() < 0.01);
        }
    }

    #[test]
    fn test_non_integer_resample_rejected() {
        let series = tone(10.0, 300.0, 3000);
        let result = TrackedSeries::new(series).resample(1.0 / 128.0);
        assert!(matches!(result, Err(GwmfError::Configuration(_))));
    }
}
