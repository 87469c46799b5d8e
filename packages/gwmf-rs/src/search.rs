use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use crate::error::{GwmfError, Result};
use crate::filter::{EdgeMode, TrackedSeries};
use crate::matched_filter::{MatchedFilter, Peak, SnrSeries};
use crate::profile_scope;
use crate::psd::Psd;
use crate::series::TimeSeries;
use crate::source::{EventCatalog, StrainSource};
use crate::types::{Detection, SearchConfig, SearchReport};
use crate::waveform::{ChirpParams, Template, WaveformGenerator};
use crate::whiten;

/// A named template in a search bank
#[derive(Debug, Clone)]
pub struct BankEntry {
    pub name: String,
    pub template: Template,
}

impl BankEntry {
    pub fn new(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    /// Plus-polarization template for the given component masses
    pub fn from_masses(
        generator: &dyn WaveformGenerator,
        mass1: f64,
        mass2: f64,
        f_lower: f64,
        delta_t: f64,
    ) -> Result<Self> {
        let params = ChirpParams::new(mass1, mass2, f_lower, delta_t);
        let template = generator.generate(&params)?.plus_template()?;
        Ok(Self::new(
            format!("{}({}, {})", generator.name(), mass1, mass2),
            template,
        ))
    }

    /// Keep at most the last `duration` seconds of the template
    pub fn trailing(self, duration: f64) -> Result<Self> {
        Ok(Self {
            template: self.template.trailing(duration)?,
            ..self
        })
    }
}

/// Peak search window of `half_width` seconds either side of a catalog event
pub fn event_window(
    catalog: &dyn EventCatalog,
    name: &str,
    half_width: f64,
) -> Result<(f64, f64)> {
    let event = catalog.event(name)?;
    Ok((event.gps_time - half_width, event.gps_time + half_width))
}

/// Conditions strain and filters template banks against it
pub struct SearchRunner {
    config: SearchConfig,
}

impl SearchRunner {
    pub fn new(config: SearchConfig) -> Result<Self> {
        if !(0.0..1.0).contains(&config.psd_overlap) {
            return Err(GwmfError::Configuration(format!(
                "psd_overlap must be in [0, 1), got {}",
                config.psd_overlap
            )));
        }
        for (name, value) in [
            ("psd_segment_duration", config.psd_segment_duration),
            ("psd_filter_duration", config.psd_filter_duration),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GwmfError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(config.edge_padding.is_finite() && config.edge_padding >= 0.0) {
            return Err(GwmfError::Configuration(format!(
                "edge_padding must be non-negative, got {}",
                config.edge_padding
            )));
        }
        if config.psd_filter_duration > config.psd_segment_duration {
            return Err(GwmfError::Configuration(format!(
                "inverse-PSD filter ({} s) longer than the PSD segments ({} s)",
                config.psd_filter_duration, config.psd_segment_duration
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// High-pass, resample, trim every corrupted sample, then estimate and condition the PSD
    pub fn condition(&self, strain: &TimeSeries<f64>) -> Result<ConditionedData> {
        profile_scope!("condition");
        let cfg = &self.config;

        log::info!(
            "Conditioning {} samples at {} Hz starting at {}",
            strain.len(),
            strain.sample_rate(),
            strain.start_time()
        );

        let mut tracked = TrackedSeries::new(strain.clone()).highpass(
            cfg.highpass_frequency,
            cfg.highpass_half_len,
            EdgeMode::Zero,
        )?;
        if let Some(rate) = cfg.sample_rate {
            tracked = tracked.resample(1.0 / rate)?;
        }
        let padding = (cfg.edge_padding * tracked.series().sample_rate()).round() as usize;
        let tracked = tracked.pad_corruption(padding);
        let trimmed = tracked.total_trimmed();
        let data = tracked.trim_corrupted()?;

        log::info!(
            "Conditioned data: {} samples at {} Hz, trimmed ({}, {})",
            data.len(),
            data.sample_rate(),
            trimmed.start,
            trimmed.end
        );

        let psd = {
            profile_scope!("psd");
            Psd::estimate(
                &data,
                cfg.psd_segment_duration,
                cfg.psd_overlap,
                cfg.psd_averaging,
            )?
        };

        let spectrum_len = data.len() / 2 + 1;
        let df = 1.0 / data.duration();
        let filter_len = (cfg.psd_filter_duration * data.sample_rate()).round() as usize;
        let psd = psd.interpolate_to(df, spectrum_len)?.inverse_spectrum_truncation(
            filter_len,
            Some(cfg.low_frequency_cutoff),
            cfg.truncation,
        )?;

        let filter = MatchedFilter::new(
            &data,
            &psd,
            cfg.low_frequency_cutoff,
            cfg.high_frequency_cutoff,
            filter_len,
        )?;

        Ok(ConditionedData {
            data,
            psd,
            filter,
            filter_len,
            config: self.config.clone(),
        })
    }

    /// Fetch `[start, end)` from `source`, condition it, and filter `bank`
    pub fn search(
        &self,
        source: &dyn StrainSource,
        detector: &str,
        start: f64,
        end: f64,
        bank: &[BankEntry],
        window: Option<(f64, f64)>,
    ) -> Result<SearchReport> {
        let strain = source.strain(detector, start, end)?;
        self.condition(&strain)?.run(bank, window)
    }
}

/// Strain and PSD ready for matched filtering
pub struct ConditionedData {
    data: TimeSeries<f64>,
    psd: Psd,
    filter: MatchedFilter,
    filter_len: usize,
    config: SearchConfig,
}

impl ConditionedData {
    pub fn data(&self) -> &TimeSeries<f64> {
        &self.data
    }

    /// Interpolated and truncated PSD on the data's frequency grid
    pub fn psd(&self) -> &Psd {
        &self.psd
    }

    /// Support of the inverse-PSD filter in samples
    pub fn filter_len(&self) -> usize {
        self.filter_len
    }

    pub fn filter(&self, template: &Template) -> Result<SnrSeries> {
        self.filter.filter(template)
    }

    /// Filter every template in parallel; the data and PSD are shared read-only
    pub fn run(&self, bank: &[BankEntry], window: Option<(f64, f64)>) -> Result<SearchReport> {
        profile_scope!("bank");
        if bank.is_empty() {
            return Err(GwmfError::Configuration(
                "template bank is empty".to_string(),
            ));
        }
        log::info!("Filtering {} templates", bank.len());

        let detections = bank
            .par_iter()
            .map(|entry| self.detect(entry, window))
            .collect::<Result<Vec<_>>>()?;

        for d in &detections {
            log::info!("{}: SNR {:.2} at {:.4}", d.template, d.snr, d.time);
        }

        Ok(SearchReport::new(
            self.data.sample_rate(),
            self.data.start_time(),
            self.data.duration(),
            detections,
            self.config.clone(),
        ))
    }

    fn detect(&self, entry: &BankEntry, window: Option<(f64, f64)>) -> Result<Detection> {
        let snr = self.filter.filter(&entry.template)?;
        let peak = match window {
            Some((start, end)) => snr.peak_within(start, end)?,
            None => snr.peak(),
        };
        log::debug!(
            "{}: sigma {:.4e}, peak |snr| {:.3} at index {}",
            entry.name,
            snr.sigma(),
            peak.snr(),
            peak.index
        );
        Ok(Detection {
            template: entry.name.clone(),
            time: peak.time,
            snr: peak.snr(),
            phase: peak.phase(),
            sigma: snr.sigma(),
            index: peak.index + snr.edge(),
        })
    }

    /// Conditioned data with the template aligned to `detection` subtracted
    pub fn residual(&self, entry: &BankEntry, detection: &Detection) -> Result<TimeSeries<f64>> {
        let peak = Peak {
            index: detection.index,
            time: detection.time,
            value: Complex64::from_polar(detection.snr, detection.phase),
        };
        whiten::subtract(&self.data, &entry.template, &peak, detection.sigma)
    }

    pub fn whiten(&self, series: &TimeSeries<f64>) -> Result<TimeSeries<f64>> {
        whiten::whiten(series, &self.psd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CatalogEvent, StaticCatalog};

    #[test]
    fn test_invalid_config_rejected() {
        let config = SearchConfig {
            psd_overlap: 1.0,
            ..Default::default()
        };
        assert!(SearchRunner::new(config).is_err());

        let config = SearchConfig {
            psd_filter_duration: 8.0,
            ..Default::default()
        };
        assert!(matches!(
            SearchRunner::new(config),
            Err(GwmfError::Configuration(_))
        ));
    }

    #[test]
    fn test_event_window() {
        let catalog = StaticCatalog::new(vec![CatalogEvent {
            name: "E1".to_string(),
            gps_time: 100.0,
            mass1: 10.0,
            mass2: 10.0,
        }]);
        assert_eq!(event_window(&catalog, "E1", 0.5).unwrap(), (99.5, 100.5));
        assert!(event_window(&catalog, "E2", 0.5).is_err());
    }

    #[test]
    fn test_condition_trims_exactly_the_corrupted_span() {
        let source = crate::source::SyntheticStrain::new(512.0, 1.0, 9).unwrap();
        let strain = source.strain("H1", 0.0, 64.0).unwrap();
        let config = SearchConfig {
            highpass_half_len: 256,
            sample_rate: Some(256.0),
            edge_padding: 0.5,
            ..Default::default()
        };
        let conditioned = SearchRunner::new(config).unwrap().condition(&strain).unwrap();

        // (256 + 20) at 512 Hz -> 138 at 256 Hz, plus 128 of padding
        let trimmed = (138 + 128) as f64 / 256.0;
        let data = conditioned.data();
        assert!((data.sample_rate() - 256.0).abs() < 1e-9);
        assert!((data.start_time() - trimmed).abs() < 1e-9);
        assert!((data.end_time() - (64.0 - trimmed)).abs() < 1e-9);
        assert_eq!(conditioned.psd().len(), data.len() / 2 + 1);
        assert_eq!(conditioned.filter_len(), 1024);
    }
}
