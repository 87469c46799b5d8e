//! Whitening, template alignment and coherent subtraction.

use rustfft::num_complex::Complex64;

use crate::error::Result;
use crate::matched_filter::Peak;
use crate::psd::Psd;
use crate::series::{same_delta, TimeSeries};
use crate::waveform::Template;

/// Divide the spectrum of `series` by the amplitude spectral density.
///
/// `psd` is interpolated onto the series' frequency grid when it is not
/// already there. Bins with a zero or infinite PSD are zeroed.
pub fn whiten(series: &TimeSeries<f64>, psd: &Psd) -> Result<TimeSeries<f64>> {
    let spectrum = series.to_frequency_series();
    let psd = if same_delta(psd.delta_f(), spectrum.delta_f()) && psd.len() == spectrum.len() {
        psd.clone()
    } else {
        log::debug!(
            "Interpolating PSD from {} Hz to {} Hz spacing for whitening",
            psd.delta_f(),
            spectrum.delta_f()
        );
        psd.interpolate_to(spectrum.delta_f(), spectrum.len())?
    };
    let whitened = spectrum.map_bins(|k, c| c * psd.inverse(k).sqrt());
    Ok(whitened.to_time_series())
}

/// Best-fit reconstruction of `template` in `data` given a matched-filter peak.
///
/// The template is moved so its reference feature lands at `peak.time`, then
/// scaled by `peak.value / sigma`. The result shares the data's length and start.
pub fn align(
    template: &Template,
    peak: &Peak,
    sigma: f64,
    data: &TimeSeries<f64>,
) -> Result<TimeSeries<f64>> {
    let prepared = template.prepare(data.len())?;
    let shift = peak.time - data.start_time();
    let aligned = prepared
        .to_frequency_series()
        .cyclic_time_shift(shift)
        .scale(peak.value / Complex64::new(sigma, 0.0))
        .to_time_series();
    Ok(aligned.with_start_time(data.start_time()))
}

/// `data` minus the template aligned to `peak`.
pub fn subtract(
    data: &TimeSeries<f64>,
    template: &Template,
    peak: &Peak,
    sigma: f64,
) -> Result<TimeSeries<f64>> {
    let aligned = align(template, peak, sigma, data)?;
    data.subtract(&aligned)
}
