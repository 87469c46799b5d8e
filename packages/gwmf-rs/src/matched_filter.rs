//! Frequency-domain matched filtering.
//!
//! The whole data span is correlated against a template with one forward and one
//! inverse transform. For data `s`, template `h` and one-sided PSD `S_n`:
//!
//! ```text
//! q(t)     = IFFT[ conj(h~(f)) s~(f) / S_n(f) ]      over flow <= f < fhigh
//! sigma^2  = 4 df sum |h~(f)|^2 / S_n(f)
//! snr(t)   = 4 df q(t) / sigma
//! ```
//!
//! `snr[i]` is the statistic for the template's reference feature sitting at
//! data sample `i`. The correlation is cyclic, so samples within the longer of
//! the template and the inverse-PSD filter of either end are discarded.

use rustfft::num_complex::Complex64;

use crate::error::{GwmfError, Result};
use crate::fft;
use crate::psd::Psd;
use crate::series::{same_delta, FrequencySeries, TimeSeries};
use crate::waveform::Template;

/// Maximum of `|snr|` over a searched span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Index into the cropped SNR series.
    pub index: usize,
    /// Time of the template's reference feature at the peak.
    pub time: f64,
    pub value: Complex64,
}

impl Peak {
    pub fn snr(&self) -> f64 {
        self.value.norm()
    }

    pub fn phase(&self) -> f64 {
        self.value.arg()
    }
}

/// Complex SNR over the valid span of the data, with the template's sigma.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrSeries {
    snr: TimeSeries<Complex64>,
    sigma: f64,
    edge: usize,
}

impl SnrSeries {
    pub fn series(&self) -> &TimeSeries<Complex64> {
        &self.snr
    }

    pub fn into_series(self) -> TimeSeries<Complex64> {
        self.snr
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Samples discarded from each end of the data.
    pub fn edge(&self) -> usize {
        self.edge
    }

    pub fn magnitude(&self) -> TimeSeries<f64> {
        self.snr.abs()
    }

    /// Largest `|snr|`; the earliest sample wins ties.
    pub fn peak(&self) -> Peak {
        let (index, value) = first_argmax(self.snr.data());
        Peak {
            index,
            time: self.snr.sample_time(index),
            value,
        }
    }

    /// Largest `|snr|` with peak time in `[start, end)`, clamped to the valid span.
    pub fn peak_within(&self, start: f64, end: f64) -> Result<Peak> {
        let window = self.snr.time_slice(start, end).map_err(|_| {
            GwmfError::Configuration(format!(
                "peak window [{}, {}) s does not overlap the valid SNR span [{}, {}) s",
                start,
                end,
                self.snr.start_time(),
                self.snr.end_time()
            ))
        })?;
        let offset = self
            .snr
            .index_at(window.start_time())
            .unwrap_or_default();
        let (index, value) = first_argmax(window.data());
        Ok(Peak {
            index: offset + index,
            time: window.sample_time(index),
            value,
        })
    }
}

fn first_argmax(values: &[Complex64]) -> (usize, Complex64) {
    let mut best = 0;
    let mut best_mag = f64::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        let mag = v.norm_sqr();
        if mag > best_mag {
            best = i;
            best_mag = mag;
        }
    }
    (best, values[best])
}

/// Data transform and PSD weights prepared once, reusable across templates.
#[derive(Debug, Clone)]
pub struct MatchedFilter {
    data_fft: FrequencySeries,
    weights: Vec<f64>,
    kmin: usize,
    kmax: usize,
    delta_t: f64,
    start_time: f64,
    filter_len: usize,
}

impl MatchedFilter {
    /// `psd` must already be on the data's frequency grid. `filter_len` is the
    /// time-domain support (samples) of the inverse-PSD filter it represents.
    pub fn new(
        data: &TimeSeries<f64>,
        psd: &Psd,
        low_frequency_cutoff: f64,
        high_frequency_cutoff: Option<f64>,
        filter_len: usize,
    ) -> Result<Self> {
        let data_fft = data.to_frequency_series();
        let n = data.len();
        let df = data_fft.delta_f();
        psd.check_matches(df, data_fft.len())?;

        let nyquist = 0.5 / data.delta_t();
        if !(0.0..nyquist).contains(&low_frequency_cutoff) {
            return Err(GwmfError::FrequencyRange {
                frequency: low_frequency_cutoff,
                nyquist,
            });
        }
        let top = (n + 1) / 2;
        let kmax = match high_frequency_cutoff {
            Some(f) if f <= low_frequency_cutoff || f > nyquist => {
                return Err(GwmfError::FrequencyRange {
                    frequency: f,
                    nyquist,
                });
            }
            Some(f) => ((f / df).floor() as usize).min(top),
            None => top,
        };
        let kmin = ((low_frequency_cutoff / df).ceil() as usize).max(1);
        if kmin >= kmax {
            return Err(GwmfError::Configuration(format!(
                "empty frequency band: bins [{}, {})",
                kmin, kmax
            )));
        }

        let mut weights = vec![0.0; data_fft.len()];
        let mut unusable = 0usize;
        for (k, w) in weights.iter_mut().enumerate().take(kmax).skip(kmin) {
            *w = psd.inverse(k);
            if *w == 0.0 {
                unusable += 1;
            }
        }
        if unusable > 0 {
            log::warn!(
                "{} PSD bins in [{}, {}) Hz carry no weight",
                unusable,
                kmin as f64 * df,
                kmax as f64 * df
            );
        }

        log::debug!(
            "Matched filter over {} samples, bins [{}, {}), filter length {}",
            n,
            kmin,
            kmax,
            filter_len
        );

        Ok(Self {
            data_fft,
            weights,
            kmin,
            kmax,
            delta_t: data.delta_t(),
            start_time: data.start_time(),
            filter_len,
        })
    }

    pub fn data_len(&self) -> usize {
        self.data_fft.time_len()
    }

    pub fn delta_f(&self) -> f64 {
        self.data_fft.delta_f()
    }

    /// Half-open range of frequency bins that contribute.
    pub fn band(&self) -> (usize, usize) {
        (self.kmin, self.kmax)
    }

    fn check_rate(&self, template: &Template) -> Result<()> {
        if same_delta(self.delta_t, template.delta_t()) {
            Ok(())
        } else {
            Err(GwmfError::SampleRateMismatch {
                expected: self.delta_t,
                got: template.delta_t(),
            })
        }
    }

    fn template_fft(&self, template: &Template) -> Result<FrequencySeries> {
        self.check_rate(template)?;
        Ok(template.prepare(self.data_len())?.to_frequency_series())
    }

    fn sigmasq_of(&self, h: &FrequencySeries) -> f64 {
        let sum: f64 = (self.kmin..self.kmax)
            .map(|k| h.data()[k].norm_sqr() * self.weights[k])
            .sum();
        4.0 * self.delta_f() * sum
    }

    /// PSD-weighted norm of the template over the filter band.
    pub fn sigma(&self, template: &Template) -> Result<f64> {
        let h = self.template_fft(template)?;
        Ok(self.sigmasq_of(&h).sqrt())
    }

    /// Normalised SNR over the full, uncropped data span, and the template sigma.
    pub fn correlate(&self, template: &Template) -> Result<(TimeSeries<Complex64>, f64)> {
        let h = self.template_fft(template)?;
        let sigmasq = self.sigmasq_of(&h);
        if !(sigmasq > 0.0 && sigmasq.is_finite()) {
            return Err(GwmfError::Configuration(
                "template has no weighted power in the filter band".to_string(),
            ));
        }
        let sigma = sigmasq.sqrt();

        let n = self.data_len();
        let mut q = vec![Complex64::new(0.0, 0.0); n];
        let s = self.data_fft.data();
        for k in self.kmin..self.kmax {
            q[k] = h.data()[k].conj() * s[k] * self.weights[k];
        }
        fft::ifft_in_place(&mut q);

        let norm = 4.0 * self.delta_f() / sigma;
        for x in &mut q {
            *x *= norm;
        }
        Ok((TimeSeries::new(q, self.delta_t, self.start_time)?, sigma))
    }

    /// SNR with the cyclically corrupted edges removed.
    pub fn filter(&self, template: &Template) -> Result<SnrSeries> {
        self.check_rate(template)?;
        let n = self.data_len();
        if template.len() > n {
            return Err(GwmfError::InsufficientData {
                needed: template.len(),
                got: n,
            });
        }
        let edge = template.len().max(self.filter_len);
        if 2 * edge >= n {
            return Err(GwmfError::InsufficientData {
                needed: 2 * edge + 1,
                got: n,
            });
        }
        let (snr, sigma) = self.correlate(template)?;
        Ok(SnrSeries {
            snr: snr.crop_samples(edge, edge)?,
            sigma,
            edge,
        })
    }
}

/// One-shot matched filter of `template` against `data`.
pub fn matched_filter(
    template: &Template,
    data: &TimeSeries<f64>,
    psd: &Psd,
    low_frequency_cutoff: f64,
    filter_len: usize,
) -> Result<SnrSeries> {
    MatchedFilter::new(data, psd, low_frequency_cutoff, None, filter_len)?.filter(template)
}
